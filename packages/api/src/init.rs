//! Server initialization for the video processor.

use std::sync::Arc;

use actors::{Tracker, TrackerConfig, start_tracker};
use storage::Storage;

/// Initialize the object store and start the job tracker.
///
/// This should be called once at server startup before handling requests.
pub async fn init_processor()
-> Result<(Tracker, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>> {
    tracing::info!("Initializing video processor...");

    let storage = Storage::from_env().await?;

    let config = TrackerConfig::from_env()?;
    tracing::info!(
        program = %config.worker_program,
        args = ?config.worker_args,
        uploads = ?config.upload_dir,
        outputs = ?config.output_root,
        "Loaded tracker configuration"
    );

    let (tracker, handle) = start_tracker(config, Arc::new(storage)).await?;

    tracing::info!("Video processor initialized");
    Ok((tracker, handle))
}

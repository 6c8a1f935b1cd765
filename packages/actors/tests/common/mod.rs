use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use actors::{ArtifactStore, StoreFuture, Tracker, TrackerConfig, start_tracker};
use processor_core::{Job, JobId};
use storage::{Storage, StorageConfig, StorageError};

/// Argument parsing shared by every fake worker script.
const SCRIPT_PRELUDE: &str = r#"
OUT=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-dir) OUT="$2"; shift 2 ;;
    *) shift ;;
  esac
done
wait_for() {
  while [ ! -f "$OUT/$1" ]; do sleep 0.05; done
  rm -f "$OUT/$1"
}
"#;

/// In-memory store that refuses keys with a given suffix and signs URLs
/// without credentials.
pub struct TestStore {
    pub inner: Storage,
    fail_suffix: Option<String>,
}

impl ArtifactStore for TestStore {
    fn upload<'a>(
        &'a self,
        key: &'a str,
        bytes: Bytes,
        content_type: &'a str,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            if let Some(suffix) = &self.fail_suffix
                && key.ends_with(suffix.as_str())
            {
                return Err(StorageError::InvalidConfig(format!("refusing {}", key)));
            }
            self.inner.put_object(key, bytes, content_type).await
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.inner.delete(key))
    }

    fn presign<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, String> {
        Box::pin(async move { Ok(format!("memory://{}?ttl={}", key, ttl.as_secs())) })
    }
}

pub struct Harness {
    pub tracker: Tracker,
    pub store: Arc<TestStore>,
    pub dir: TempDir,
    /// Completes once the tracker actor stopped.
    pub handle: JoinHandle<()>,
}

impl Harness {
    pub fn upload_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn output_dir(&self, job_id: JobId) -> PathBuf {
        self.dir.path().join("output").join(job_id.to_string())
    }

    /// Create a trigger file the worker script is waiting on.
    pub async fn trigger(&self, job_id: JobId, name: &str) -> std::io::Result<()> {
        tokio::fs::write(self.output_dir(job_id).join(name), b"").await
    }

    /// Poll a job until `done` holds for it.
    pub async fn wait_for<F>(&self, job_id: JobId, done: F) -> Result<Job, Box<dyn Error>>
    where
        F: Fn(&Job) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let job = self.tracker.get_job(job_id).await?;
            if done(&job) {
                return Ok(job);
            }
            if tokio::time::Instant::now() > deadline {
                return Err(format!("timed out waiting on job {} ({})", job_id, job.state).into());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub async fn start(script: &str) -> Result<Harness, Box<dyn Error>> {
    start_with(script, None, |config| config).await
}

/// Start a tracker whose worker runs `script` under `sh`.
pub async fn start_with(
    script: &str,
    fail_suffix: Option<&str>,
    configure: impl FnOnce(TrackerConfig) -> TrackerConfig,
) -> Result<Harness, Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let script_path = dir.path().join("worker.sh");
    tokio::fs::write(&script_path, format!("{}\n{}", SCRIPT_PRELUDE, script)).await?;

    let config = TrackerConfig::default()
        .with_worker("sh", vec![script_path.to_string_lossy().into_owned()])
        .with_scratch(dir.path().join("uploads"), dir.path().join("output"));
    let config = configure(config);

    let store = Arc::new(TestStore {
        inner: Storage::new(StorageConfig::memory()).await?,
        fail_suffix: fail_suffix.map(str::to_string),
    });
    let (tracker, handle) = start_tracker(config, store.clone()).await?;

    Ok(Harness {
        tracker,
        store,
        dir,
        handle,
    })
}

//! Scratch filesystem for worker inputs and outputs.

use std::io;
use std::path::{Path, PathBuf};

use processor_core::JobId;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

const FALLBACK_FILE_NAME: &str = "upload.bin";

/// Local directories shared by the tracker and its workers.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    upload_dir: PathBuf,
    output_root: PathBuf,
}

impl ScratchSpace {
    pub fn new(upload_dir: impl AsRef<Path>, output_root: impl AsRef<Path>) -> Self {
        Self {
            upload_dir: upload_dir.as_ref().to_path_buf(),
            output_root: output_root.as_ref().to_path_buf(),
        }
    }

    /// Ensure the base directories exist.
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.upload_dir).await?;
        fs::create_dir_all(&self.output_root).await?;
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Output directory owned by `job_id`.
    pub fn output_dir(&self, job_id: JobId) -> PathBuf {
        self.output_root.join(job_id.to_string())
    }

    /// Write an uploaded artifact under a unique name and return its path.
    pub async fn save_artifact(&self, original_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.upload_dir).await?;

        let name = format!("{}-{}", Ulid::new(), sanitize_file_name(original_name));
        let path = self.upload_dir.join(&name);

        // Write to temp file first, then rename so workers never see a partial input
        let temp_path = self.upload_dir.join(format!("{}.tmp", name));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &path).await?;

        tracing::debug!("Saved artifact to {:?}", path);
        Ok(path)
    }

    /// Create the output directory for `job_id`.
    pub async fn create_output_dir(&self, job_id: JobId) -> io::Result<PathBuf> {
        let dir = self.output_dir(job_id);
        fs::create_dir_all(&dir).await?;
        tracing::debug!("Created output directory {:?}", dir);
        Ok(dir)
    }
}

/// Delete a file, logging instead of failing.
pub async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Deleted local file {:?}", path),
        Err(e) => tracing::warn!("Failed to delete local file {:?}: {}", path, e),
    }
}

/// Reduce an uploaded file name to a safe basename.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

//! Publishing worker outputs to the object store.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use processor_core::{JobId, ResultMap};
use storage::{Storage, StorageError};

use crate::error::FailureReason;
use crate::scratch::remove_quietly;

/// Future type for async store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Destination for published results.
///
/// Implemented for [`Storage`]; tests wrap it to inject failures.
pub trait ArtifactStore: Send + Sync + 'static {
    /// Store `bytes` under `key` and return the key.
    fn upload<'a>(&'a self, key: &'a str, bytes: Bytes, content_type: &'a str)
    -> StoreFuture<'a, String>;

    /// Delete the object at `key`.
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    /// Temporary GET URL for `key`.
    fn presign<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, String>;
}

impl ArtifactStore for Storage {
    fn upload<'a>(
        &'a self,
        key: &'a str,
        bytes: Bytes,
        content_type: &'a str,
    ) -> StoreFuture<'a, String> {
        Box::pin(self.put_object(key, bytes, content_type))
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.delete(key))
    }

    fn presign<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, String> {
        Box::pin(Storage::presign(self, key, ttl))
    }
}

/// Content type for a logical output name.
pub fn content_type_for(name: &str) -> &'static str {
    match name {
        "csv" => "text/csv",
        "json" => "application/json",
        "video" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Uploads a completed job's outputs as one unit.
pub struct ResultPublisher {
    store: Arc<dyn ArtifactStore>,
    key_prefix: String,
}

impl ResultPublisher {
    pub fn new(store: Arc<dyn ArtifactStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Object key for a local output file: `<prefix>/<job id>/<basename>`.
    pub fn result_key(&self, job_id: JobId, path: &Path) -> Option<String> {
        let basename = path.file_name()?.to_str()?;
        if self.key_prefix.is_empty() {
            Some(format!("{}/{}", job_id, basename))
        } else {
            Some(format!("{}/{}/{}", self.key_prefix, job_id, basename))
        }
    }

    /// Upload every output and return logical name to object key.
    ///
    /// Either all outputs are published or none are: keys already written
    /// are deleted again when a later upload fails. Local files are removed
    /// only after the whole set succeeded.
    pub async fn publish(
        &self,
        job_id: JobId,
        outputs: &BTreeMap<String, PathBuf>,
    ) -> Result<ResultMap, FailureReason> {
        let mut uploaded: Vec<String> = Vec::with_capacity(outputs.len());
        let mut result = ResultMap::new();

        for (name, path) in outputs {
            match self.publish_one(job_id, name, path).await {
                Ok(key) => {
                    uploaded.push(key.clone());
                    result.insert(name.clone(), key);
                }
                Err(reason) => {
                    tracing::warn!(job_id = %job_id, output = %name, "Publishing failed: {}", reason);
                    self.rollback(&uploaded).await;
                    return Err(FailureReason::UploadFailure(reason));
                }
            }
        }

        for path in outputs.values() {
            remove_quietly(path).await;
        }

        tracing::info!(job_id = %job_id, outputs = result.len(), "Published job outputs");
        Ok(result)
    }

    async fn publish_one(&self, job_id: JobId, name: &str, path: &Path) -> Result<String, String> {
        let key = self
            .result_key(job_id, path)
            .ok_or_else(|| format!("output {} has no file name: {:?}", name, path))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("reading {} at {:?}: {}", name, path, e))?;

        self.store
            .upload(&key, Bytes::from(bytes), content_type_for(name))
            .await
            .map_err(|e| format!("uploading {} to {}: {}", name, key, e))
    }

    /// Delete a published result whose job was settled while it uploaded.
    pub async fn discard(&self, job_id: JobId, result: &ResultMap) {
        tracing::info!(job_id = %job_id, outputs = result.len(), "Discarding outputs of settled job");
        let keys: Vec<String> = result.values().cloned().collect();
        self.rollback(&keys).await;
    }

    async fn rollback(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.store.remove(key).await {
                tracing::warn!(key = %key, "Failed to remove partially published object: {}", e);
            }
        }
    }

    /// Temporary download URLs for a published result.
    pub async fn presign(
        &self,
        result: &ResultMap,
        ttl: Duration,
    ) -> Result<BTreeMap<String, String>, StorageError> {
        let mut urls = BTreeMap::new();
        for (name, key) in result {
            urls.insert(name.clone(), self.store.presign(key, ttl).await?);
        }
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::StorageConfig;

    async fn memory_publisher() -> (Arc<Storage>, ResultPublisher) {
        let storage = Arc::new(
            Storage::new(StorageConfig::memory())
                .await
                .expect("memory storage"),
        );
        let publisher = ResultPublisher::new(storage.clone(), "results");
        (storage, publisher)
    }

    #[test]
    fn content_types_follow_logical_names() {
        assert_eq!(content_type_for("csv"), "text/csv");
        assert_eq!(content_type_for("json"), "application/json");
        assert_eq!(content_type_for("video"), "video/mp4");
        assert_eq!(content_type_for("thumbnail"), "application/octet-stream");
    }

    #[tokio::test]
    async fn keys_use_prefix_job_and_basename() {
        let (_, publisher) = memory_publisher().await;
        let job_id = JobId::new();
        assert_eq!(
            publisher.result_key(job_id, Path::new("/tmp/out/abc/data.csv")),
            Some(format!("results/{}/data.csv", job_id))
        );
        assert_eq!(publisher.result_key(job_id, Path::new("/")), None);
    }

    #[tokio::test]
    async fn publishes_outputs_and_removes_local_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv = dir.path().join("data.csv");
        let json = dir.path().join("out.json");
        tokio::fs::write(&csv, "a,b\n1,2\n").await.expect("write csv");
        tokio::fs::write(&json, "{}").await.expect("write json");

        let (storage, publisher) = memory_publisher().await;
        let job_id = JobId::new();
        let outputs = BTreeMap::from([
            ("csv".to_string(), csv.clone()),
            ("json".to_string(), json.clone()),
        ]);

        let result = publisher.publish(job_id, &outputs).await.expect("publish");
        let csv_key = format!("results/{}/data.csv", job_id);
        assert_eq!(result.get("csv"), Some(&csv_key));
        assert_eq!(
            storage.content_type(&csv_key).await.expect("head"),
            Some("text/csv".to_string())
        );
        assert_eq!(
            storage.get_bytes(&csv_key).await.expect("get").as_ref(),
            b"a,b\n1,2\n"
        );
        assert!(!csv.exists());
        assert!(!json.exists());
    }

    #[tokio::test]
    async fn missing_output_rolls_back_and_keeps_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv = dir.path().join("a.csv");
        tokio::fs::write(&csv, "x").await.expect("write csv");

        let (storage, publisher) = memory_publisher().await;
        let job_id = JobId::new();
        // BTreeMap order publishes "csv" before "video".
        let outputs = BTreeMap::from([
            ("csv".to_string(), csv.clone()),
            ("video".to_string(), dir.path().join("missing.mp4")),
        ]);

        let err = publisher.publish(job_id, &outputs).await.unwrap_err();
        assert!(matches!(err, FailureReason::UploadFailure(_)));
        assert!(
            storage
                .get_bytes(&format!("results/{}/a.csv", job_id))
                .await
                .is_err()
        );
        assert!(csv.exists());
    }
}

//! Object storage for published job results.
//!
//! Goal:
//! - S3-compatible storage in production/staging
//! - On-disk storage for local dev
//! - In-memory storage for tests
//!
//! Implementation note:
//! This is a small wrapper around `object_store`, which already provides
//! S3, local filesystem, and in-memory backends. The bucket is part of the
//! backend configuration, so callers only deal in object keys.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("{0} storage cannot sign URLs")]
    SigningUnsupported(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::S3 => "s3",
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub virtual_hosted_style: bool,
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all object keys.
    pub prefix: Option<String>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self {
            backend: StorageBackendConfig::S3(cfg),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// Selection rules:
    /// - If `STORAGE_BACKEND` is set: use it (`s3`, `filesystem`, `memory`)
    /// - Otherwise: S3 when `S3_BUCKET` (or the legacy `AWS_S3_BUCKET`) is
    ///   set, filesystem (`./data/object_store`) when it is not
    ///
    /// S3 env vars (S3-compatible):
    /// - `S3_BUCKET` / `AWS_S3_BUCKET` (required when backend is `s3`)
    /// - `AWS_REGION` (default: `us-east-1`)
    /// - `S3_ENDPOINT` (optional, e.g. `http://localhost:9000`)
    /// - `S3_ALLOW_HTTP` (`true`/`false`, default: auto true if endpoint is http://)
    /// - `S3_VIRTUAL_HOSTED_STYLE` (`true`/`false`, default: false)
    /// - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN` (optional)
    ///
    /// Filesystem env vars:
    /// - `STORAGE_FS_ROOT` (default: `./data/object_store`)
    ///
    /// Common:
    /// - `STORAGE_PREFIX` (optional, e.g. `processor/`)
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = std::env::var("STORAGE_BACKEND").ok().and_then(non_empty);
        let prefix = std::env::var("STORAGE_PREFIX").ok().and_then(non_empty);

        let cfg = match backend.as_deref() {
            Some("s3") => Self::s3(read_s3_config()?),
            Some("filesystem") | Some("fs") => Self::filesystem(fs_root()),
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported STORAGE_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
            None if bucket_from_env().is_some() => Self::s3(read_s3_config()?),
            None => Self::filesystem(fs_root()),
        };

        Ok(Self { prefix, ..cfg })
    }
}

#[derive(Clone)]
pub struct Storage {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    prefix: Option<String>,
}

impl Storage {
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn kind_str(&self) -> &'static str {
        self.kind.as_str()
    }

    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, store, signer): (StorageKind, Arc<dyn ObjectStore>, Option<Arc<dyn Signer>>) =
            match cfg.backend {
                StorageBackendConfig::S3(s3) => {
                    let s3 = Arc::new(build_s3(s3)?);
                    (
                        StorageKind::S3,
                        s3.clone() as Arc<dyn ObjectStore>,
                        Some(s3 as Arc<dyn Signer>),
                    )
                }
                StorageBackendConfig::Filesystem { root } => {
                    ensure_dir(&root)?;
                    let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                    (StorageKind::Filesystem, Arc::new(fs) as _, None)
                }
                StorageBackendConfig::Memory => {
                    let mem = object_store::memory::InMemory::new();
                    (StorageKind::Memory, Arc::new(mem) as _, None)
                }
            };

        tracing::info!(backend = kind.as_str(), "Object storage ready");

        Ok(Self {
            kind,
            store,
            signer,
            prefix: cfg.prefix.and_then(non_empty),
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidConfig(
                "object key must not be empty".to_string(),
            ));
        }

        let joined = match self.prefix.as_deref() {
            Some(prefix) => {
                let prefix = prefix.trim_matches('/');
                if prefix.is_empty() {
                    key.to_string()
                } else {
                    format!("{prefix}/{key}")
                }
            }
            None => key.to_string(),
        };

        Ok(Path::from(joined))
    }

    /// Upload `bytes` under `key`, recording `content_type` where the
    /// backend supports object attributes.
    ///
    /// Returns the key the object can be referenced by.
    pub async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.to_path(key)?;

        // The local filesystem backend has no attribute support.
        let mut attributes = Attributes::new();
        if self.kind != StorageKind::Filesystem {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&path, PutPayload::from(bytes), opts)
            .await?;
        tracing::debug!(key, content_type, "Uploaded object");
        Ok(key.to_string())
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.to_path(key)?;
        let res = self.store.get(&path).await?;
        Ok(res.bytes().await?)
    }

    /// Content type recorded for `key`, if the backend keeps one.
    pub async fn content_type(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.to_path(key)?;
        let res = self.store.get(&path).await?;
        Ok(res.attributes.get(&Attribute::ContentType).map(|v| {
            let value: &str = v;
            value.to_owned()
        }))
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store.delete(&path).await?;
        Ok(())
    }

    /// Temporary GET URL for `key`, valid for `ttl`.
    pub async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(StorageError::SigningUnsupported(self.kind.as_str()))?;
        let path = self.to_path(key)?;
        let url = signer.signed_url(http::Method::GET, &path, ttl).await?;
        Ok(url.to_string())
    }
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

fn fs_root() -> PathBuf {
    std::env::var("STORAGE_FS_ROOT")
        .ok()
        .and_then(non_empty)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data/object_store"))
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn bucket_from_env() -> Option<String> {
    std::env::var("S3_BUCKET")
        .ok()
        .and_then(non_empty)
        .or_else(|| std::env::var("AWS_S3_BUCKET").ok().and_then(non_empty))
}

fn parse_bool_env(var_name: &str) -> Result<Option<bool>, StorageError> {
    let v = match std::env::var(var_name) {
        Ok(v) => v,
        Err(std::env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(StorageError::InvalidConfig(format!(
                "failed reading {var_name}: {e}"
            )));
        }
    };

    let normalized = v.trim().to_ascii_lowercase();
    let parsed = match normalized.as_str() {
        "1" | "true" | "yes" | "y" => true,
        "0" | "false" | "no" | "n" => false,
        _ => {
            return Err(StorageError::InvalidConfig(format!(
                "invalid boolean for {var_name}={v} (expected true/false)"
            )));
        }
    };
    Ok(Some(parsed))
}

fn read_s3_config() -> Result<S3Config, StorageError> {
    let bucket = bucket_from_env().ok_or_else(|| {
        StorageError::InvalidConfig("S3_BUCKET is required for s3 backend".into())
    })?;

    let region = std::env::var("AWS_REGION")
        .ok()
        .and_then(non_empty)
        .unwrap_or_else(|| "us-east-1".to_string());

    let endpoint = std::env::var("S3_ENDPOINT").ok().and_then(non_empty);
    let allow_http = match parse_bool_env("S3_ALLOW_HTTP")? {
        Some(v) => v,
        None => endpoint
            .as_deref()
            .is_some_and(|e| e.trim_start().to_ascii_lowercase().starts_with("http://")),
    };

    let virtual_hosted_style = parse_bool_env("S3_VIRTUAL_HOSTED_STYLE")?.unwrap_or(false);

    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok().and_then(non_empty);
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .ok()
        .and_then(non_empty);
    let session_token = std::env::var("AWS_SESSION_TOKEN").ok().and_then(non_empty);

    Ok(S3Config {
        bucket,
        region,
        endpoint,
        allow_http,
        access_key_id,
        secret_access_key,
        session_token,
        virtual_hosted_style,
    })
}

fn build_s3(cfg: S3Config) -> Result<object_store::aws::AmazonS3, StorageError> {
    let mut builder = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(cfg.bucket)
        .with_region(cfg.region)
        .with_virtual_hosted_style_request(cfg.virtual_hosted_style);

    if let Some(endpoint) = cfg.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if cfg.allow_http {
        builder = builder.with_allow_http(true);
    }
    if let Some(access_key_id) = cfg.access_key_id {
        builder = builder.with_access_key_id(access_key_id);
    }
    if let Some(secret_access_key) = cfg.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key);
    }
    if let Some(session_token) = cfg.session_token {
        builder = builder.with_token(session_token);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[tokio::test]
    async fn in_memory_upload_keeps_content_type() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::memory()).await?;
        let key = storage
            .put_object("results/job/a.csv", Bytes::from("a,b\n1,2\n"), "text/csv")
            .await?;
        assert_eq!(key, "results/job/a.csv");

        assert_eq!(storage.get_bytes(&key).await?, Bytes::from("a,b\n1,2\n"));
        assert_eq!(storage.content_type(&key).await?.as_deref(), Some("text/csv"));
        Ok(())
    }

    #[tokio::test]
    async fn filesystem_upload_and_delete() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let storage =
            Storage::new(StorageConfig::filesystem(dir.path()).with_prefix("processor/")).await?;

        let key = storage
            .put_object("results/job/out.json", Bytes::from("{}"), "application/json")
            .await?;
        assert_eq!(key, "results/job/out.json");
        assert!(dir.path().join("processor/results/job/out.json").exists());

        storage.delete(&key).await?;
        assert!(storage.get_bytes(&key).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn empty_keys_are_rejected() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::memory()).await?;
        let err = storage
            .put_object("/", Bytes::new(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));
        Ok(())
    }

    #[tokio::test]
    async fn only_s3_can_presign() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::memory()).await?;
        let err = storage
            .presign("results/job/a.csv", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SigningUnsupported("memory")));
        Ok(())
    }

    #[tokio::test]
    async fn s3_presigns_without_network() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::s3(S3Config {
            bucket: "processor-results".into(),
            region: "us-east-1".into(),
            endpoint: None,
            allow_http: false,
            access_key_id: Some("AKIDEXAMPLE".into()),
            secret_access_key: Some("secret".into()),
            session_token: None,
            virtual_hosted_style: false,
        }))
        .await?;

        let url = storage
            .presign("results/job/a.csv", Duration::from_secs(3600))
            .await?;
        assert!(url.contains("processor-results"));
        assert!(url.contains("results/job/a.csv"));
        assert!(url.contains("X-Amz-Expires=3600"));
        Ok(())
    }
}

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use actors::{TrackerConfig, start_tracker};
use api::config::ServerConfig;
use api::state::AppState;
use storage::{Storage, StorageConfig};

pub const BOUNDARY: &str = "processor-test-boundary";

/// Fake worker: reports progress, writes one json output and completes.
const WORKER_SCRIPT: &str = r#"
OUT=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-dir) OUT="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo '{"pct": 50}'
printf '{"ok":true}' > "$OUT/out.json"
echo "{\"status\":\"completed\",\"output_files\":{\"json\":\"$OUT/out.json\"}}"
"#;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_upload_bytes: 1024 * 1024,
    }
}

/// Build the full application router backed by an in-memory store and a
/// shell worker. The returned directory must outlive the router.
pub async fn build_test_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("worker.sh");
    std::fs::write(&script, WORKER_SCRIPT).unwrap();

    let config = TrackerConfig::default()
        .with_worker("sh", vec![script.to_string_lossy().into_owned()])
        .with_scratch(dir.path().join("uploads"), dir.path().join("output"));
    let storage = Storage::new(StorageConfig::memory()).await.unwrap();
    let (tracker, _handle) = start_tracker(config, Arc::new(storage)).await.unwrap();

    let state = AppState {
        tracker,
        config: Arc::new(test_config()),
    };
    (api::app(state), dir)
}

/// Encode text fields and one file as `multipart/form-data`.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: video/mp4\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(app: Router, uri: &str, body: Vec<u8>) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri).await
}

pub async fn send(app: Router, method: Method, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

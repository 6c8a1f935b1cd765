//! Integration tests for the processing endpoints.

mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};

use common::{body_json, get, multipart_body, post_multipart, send};
use processor_core::JobId;

const VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42";

async fn submit(app: &axum::Router) -> String {
    let body = multipart_body(
        &[("startTime", "0"), ("endTime", "5.5"), ("processes", "2")],
        Some(("clip.mp4", VIDEO)),
    );
    let response = post_multipart(app.clone(), "/processor/process", body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["message"], "Processing started");
    json["processId"].as_str().unwrap().to_string()
}

async fn wait_for_result(app: &axum::Router, id: &str) -> Value {
    for _ in 0..500 {
        let response = get(app.clone(), &format!("/processor/result/{id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if !json.is_null() {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {id} never finished");
}

// ---------------------------------------------------------------------------
// Test: GET /health returns 200
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok() {
    let (app, _dir) = common::build_test_app().await;
    let response = get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

// ---------------------------------------------------------------------------
// Test: upload, poll progress, then read the published result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn process_then_poll_result() {
    let (app, _dir) = common::build_test_app().await;
    let id = submit(&app).await;
    assert!(JobId::parse(&id).is_ok());

    let response = get(app.clone(), &format!("/processor/progress/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await.is_object());

    let result = wait_for_result(&app, &id).await;
    assert_eq!(result, json!({"json": format!("results/{id}/out.json")}));

    let response = get(app.clone(), &format!("/processor/progress/{id}")).await;
    assert_eq!(body_json(response).await, json!({"status": "completed"}));

    let response = get(app.clone(), &format!("/processor/jobs/{id}")).await;
    let job = body_json(response).await;
    assert_eq!(job["state"], "completed");
    assert_eq!(job["params"]["workerCount"], 2);
    assert_eq!(job["params"]["batchSize"], 1);

    // Finished jobs cannot be cancelled.
    let response = send(app.clone(), Method::POST, &format!("/processor/jobs/{id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The in-memory store cannot sign URLs.
    let response = get(app, &format!("/processor/result/{id}/urls?ttl=60")).await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body_json(response).await["code"], "UNSUPPORTED");
}

// ---------------------------------------------------------------------------
// Test: invalid submissions are rejected with 400
// ---------------------------------------------------------------------------

#[tokio::test]
async fn process_rejects_out_of_range_workers() {
    let (app, _dir) = common::build_test_app().await;
    let body = multipart_body(
        &[("startTime", "0"), ("endTime", "5"), ("processes", "33")],
        Some(("clip.mp4", VIDEO)),
    );
    let response = post_multipart(app, "/processor/process", body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("processes"));
}

#[tokio::test]
async fn process_requires_a_file() {
    let (app, _dir) = common::build_test_app().await;
    let body = multipart_body(&[("startTime", "0"), ("endTime", "5")], None);
    let response = post_multipart(app, "/processor/process", body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn process_rejects_non_numeric_fields() {
    let (app, _dir) = common::build_test_app().await;
    let body = multipart_body(
        &[("startTime", "soon"), ("endTime", "5")],
        Some(("clip.mp4", VIDEO)),
    );
    let response = post_multipart(app, "/processor/process", body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: unknown ids return 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_jobs_return_404() {
    let (app, _dir) = common::build_test_app().await;
    let unknown = JobId::new();

    for uri in [
        format!("/processor/progress/{unknown}"),
        format!("/processor/result/{unknown}"),
        format!("/processor/jobs/{unknown}"),
        "/processor/progress/not-a-job".to_string(),
    ] {
        let response = get(app.clone(), &uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }
}

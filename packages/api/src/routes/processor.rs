use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use actors::DEFAULT_URL_TTL;
use processor_core::{Job, JobId, JobOutcome, ProcessRequest};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response to a successful submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub process_id: JobId,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CancelParams {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrlParams {
    /// URL lifetime in seconds.
    pub ttl: Option<u64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process", post(process))
        .route("/progress/{id}", get(progress))
        .route("/result/{id}", get(result))
        .route("/result/{id}/urls", get(result_urls))
        .route("/jobs/{id}", get(job))
        .route("/jobs/{id}/cancel", post(cancel))
}

/// POST /processor/process
///
/// Accept a multipart upload (`file` plus `startTime`, `endTime`,
/// `processes`, `batchSize`) and start a job for it.
async fn process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<ProcessResponse>> {
    let mut request = ProcessRequest::default();
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload.bin").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            upload = Some((file_name, data));
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        match name.as_str() {
            "startTime" | "startOffset" => request.start_time = parse_number(&name, &text)?,
            "endTime" | "endOffset" => request.end_time = parse_number(&name, &text)?,
            "processes" | "workerCount" => request.processes = parse_number(&name, &text)?,
            "batchSize" => request.batch_size = parse_number(&name, &text)?,
            _ => tracing::debug!(field = %name, "Ignoring unknown form field"),
        }
    }

    let (file_name, data) = upload
        .ok_or_else(|| AppError::BadRequest("No file received in multipart upload".to_string()))?;
    let job_id = state.tracker.submit(data, &file_name, &request).await?;

    Ok(Json(ProcessResponse {
        process_id: job_id,
        message: "Processing started",
    }))
}

/// GET /processor/progress/{id}
async fn progress(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let job_id = parse_job_id(&id)?;
    Ok(Json(state.tracker.get_progress(job_id).await?))
}

/// GET /processor/result/{id}
///
/// `null` while the job runs, the published keys once it completed.
async fn result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<JobOutcome>> {
    let job_id = parse_job_id(&id)?;
    Ok(Json(state.tracker.get_result(job_id).await?))
}

/// GET /processor/result/{id}/urls?ttl=
async fn result_urls(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<UrlParams>,
) -> AppResult<Json<BTreeMap<String, String>>> {
    let job_id = parse_job_id(&id)?;
    let ttl = match params.ttl {
        Some(0) => return Err(AppError::BadRequest("ttl must be greater than zero".to_string())),
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_URL_TTL,
    };
    Ok(Json(state.tracker.result_urls(job_id, ttl).await?))
}

/// GET /processor/jobs/{id}
async fn job(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Job>> {
    let job_id = parse_job_id(&id)?;
    Ok(Json(state.tracker.get_job(job_id).await?))
}

/// POST /processor/jobs/{id}/cancel
async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<CancelParams>,
) -> AppResult<StatusCode> {
    let job_id = parse_job_id(&id)?;
    let reason = params
        .reason
        .unwrap_or_else(|| "cancelled by request".to_string());
    state.tracker.cancel(job_id, reason).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// IDs that do not parse cannot name any job.
fn parse_job_id(id: &str) -> AppResult<JobId> {
    JobId::parse(id).map_err(|_| AppError::UnknownJob(id.to_string()))
}

/// Empty form values count as absent.
fn parse_number<T: FromStr>(field: &str, text: &str) -> AppResult<Option<T>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse()
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("{field} must be a number (got {text:?})")))
}

//! Error types for the tracker.

use processor_core::{JobId, JobState, ValidationError};
use storage::StorageError;

/// Errors returned to callers of the tracker.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {job_id} is {state}, not running")]
    NotRunning { job_id: JobId, state: JobState },

    #[error("job {job_id} has no published results ({state})")]
    NotCompleted { job_id: JobId, state: JobState },

    #[error("duplicate job id: {0}")]
    DuplicateJob(JobId),

    #[error("scratch storage error: {0}")]
    Scratch(#[from] std::io::Error),

    #[error("failed to start worker: {0}")]
    WorkerSpawn(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("tracker unavailable: {0}")]
    Unavailable(String),
}

/// Why a job ended in `failed`.
///
/// These are absorbed into job state and surfaced to pollers, never
/// returned from a submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("upload failed: {0}")]
    UploadFailure(String),

    #[error("{}", describe_exit(.code, .message))]
    WorkerAbnormalExit {
        code: Option<i32>,
        message: Option<String>,
    },

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("worker timed out: no {limit} within {secs}s")]
    TimedOut { limit: &'static str, secs: u64 },

    #[error("failed to start worker: {0}")]
    SpawnFailed(String),
}

fn describe_exit(code: &Option<i32>, message: &Option<String>) -> String {
    let mut text = match code {
        Some(code) => format!("worker exited with code {code} without reporting completion"),
        None => "worker was terminated by a signal without reporting completion".to_string(),
    };
    if let Some(message) = message {
        text.push_str(": ");
        text.push_str(message);
    }
    text
}

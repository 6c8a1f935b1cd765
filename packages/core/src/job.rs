//! Job domain types for submitted processing requests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Value, json};
use ulid::Ulid;

use crate::ProcessParams;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mapping from a logical output name (`csv`, `json`, `video`, ...) to the
/// object store key it was published under.
pub type ResultMap = BTreeMap<String, String>;

/// Current state of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// The worker is running and may still report progress.
    #[default]
    Running,
    /// The worker reported completion and its outputs are being published.
    Finalizing,
    /// All outputs were published.
    Completed,
    /// The worker exited without completing, was cancelled or timed out,
    /// or publishing failed.
    Failed,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Check if the job still accepts progress updates.
    pub fn accepts_progress(&self) -> bool {
        matches!(self, JobState::Running)
    }

    /// Get a simple state string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Finalizing => "finalizing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress payload stored once a job has published its results.
pub fn completed_marker() -> Value {
    json!({ "status": "completed" })
}

/// Payload answered for both progress and result queries on a failed job.
pub fn failed_marker(error: &str) -> Value {
    json!({ "status": "failed", "error": error })
}

/// Answer to a result query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job has not finished yet.
    Pending,
    /// The job completed and every output was published.
    Ready(ResultMap),
    /// The job ended in failure.
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, JobOutcome::Pending)
    }
}

impl Serialize for JobOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JobOutcome::Pending => serializer.serialize_none(),
            JobOutcome::Ready(result) => result.serialize(serializer),
            JobOutcome::Failed { error } => failed_marker(error).serialize(serializer),
        }
    }
}

/// Point-in-time view of a job, as held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Current lifecycle state.
    pub state: JobState,
    /// Validated submission parameters.
    pub params: ProcessParams,
    /// Last progress payload reported by the worker.
    pub progress: Value,
    /// Published outputs, set once on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultMap>,
    /// Failure reason, set once on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new running job with empty progress.
    pub fn new(id: JobId, params: ProcessParams) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Running,
            params,
            progress: Value::Object(Default::default()),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Progress as answered to pollers.
    pub fn progress_view(&self) -> Value {
        match (&self.state, &self.error) {
            (JobState::Failed, Some(error)) => failed_marker(error),
            _ => self.progress.clone(),
        }
    }

    /// Result as answered to pollers.
    pub fn outcome(&self) -> JobOutcome {
        match self.state {
            JobState::Running | JobState::Finalizing => JobOutcome::Pending,
            JobState::Completed => JobOutcome::Ready(self.result.clone().unwrap_or_default()),
            JobState::Failed => JobOutcome::Failed {
                error: self.error.clone().unwrap_or_else(|| "unknown failure".into()),
            },
        }
    }

    /// Milliseconds between submission and the terminal transition.
    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|finished| (finished - self.created_at).num_milliseconds().max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ProcessParams {
        ProcessParams {
            start_offset: 0.0,
            end_offset: 10.0,
            worker_count: 4,
            batch_size: 1,
        }
    }

    #[test]
    fn new_job_starts_running_with_empty_progress() {
        let job = Job::new(JobId::new(), params());
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.progress_view(), json!({}));
        assert_eq!(job.outcome(), JobOutcome::Pending);
    }

    #[test]
    fn failed_job_answers_with_failure_marker() {
        let mut job = Job::new(JobId::new(), params());
        job.state = JobState::Failed;
        job.error = Some("worker exited with code 1".into());

        let expected = json!({ "status": "failed", "error": "worker exited with code 1" });
        assert_eq!(job.progress_view(), expected);
        assert_eq!(serde_json::to_value(job.outcome()).unwrap(), expected);
    }

    #[test]
    fn outcome_serializes_like_the_polling_contract() {
        assert_eq!(serde_json::to_value(JobOutcome::Pending).unwrap(), Value::Null);

        let mut result = ResultMap::new();
        result.insert("json".into(), "results/abc/out.json".into());
        assert_eq!(
            serde_json::to_value(JobOutcome::Ready(result)).unwrap(),
            json!({ "json": "results/abc/out.json" })
        );
    }

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()).unwrap(), id);
        assert!(JobId::parse("not-a-ulid").is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Finalizing.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Finalizing.accepts_progress());
    }
}

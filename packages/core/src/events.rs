//! Event types for observers of the job lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{JobId, ResultMap};

/// Events emitted by the tracker as jobs move through their lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was accepted and its worker started.
    JobSubmitted {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// The worker reported progress.
    JobProgress {
        job_id: JobId,
        progress: Value,
        timestamp: DateTime<Utc>,
    },
    /// The worker reported completion; outputs are being published.
    JobFinalizing {
        job_id: JobId,
        outputs: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    /// All outputs were published.
    JobCompleted {
        job_id: JobId,
        result: ResultMap,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// The job failed.
    JobFailed {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A terminal job was dropped from the registry.
    JobEvicted {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobSubmitted { timestamp, .. } => *timestamp,
            JobEvent::JobProgress { timestamp, .. } => *timestamp,
            JobEvent::JobFinalizing { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::JobEvicted { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobSubmitted { job_id, .. } => *job_id,
            JobEvent::JobProgress { job_id, .. } => *job_id,
            JobEvent::JobFinalizing { job_id, .. } => *job_id,
            JobEvent::JobCompleted { job_id, .. } => *job_id,
            JobEvent::JobFailed { job_id, .. } => *job_id,
            JobEvent::JobEvicted { job_id, .. } => *job_id,
        }
    }

    /// Check if this event ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::JobCompleted { .. } | JobEvent::JobFailed { .. }
        )
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobSubmitted { job_id, .. } => format!("Job {} submitted", job_id),
            JobEvent::JobProgress { job_id, progress, .. } => {
                format!("Job {} progress: {}", job_id, progress)
            }
            JobEvent::JobFinalizing {
                job_id, outputs, ..
            } => format!("Job {} publishing {} output(s)", job_id, outputs.len()),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobFailed { job_id, error, .. } => {
                format!("Job {} failed: {}", job_id, error)
            }
            JobEvent::JobEvicted { job_id, .. } => format!("Job {} evicted", job_id),
        }
    }
}

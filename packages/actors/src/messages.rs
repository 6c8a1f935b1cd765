//! Message types for actor communication.

use processor_core::{Job, JobId, JobOutcome, ResultMap};
use ractor::RpcReplyPort;
use serde_json::Value;

use crate::error::{FailureReason, TrackerError};
use crate::worker::WorkerSpec;

/// Messages for the TrackerActor.
#[derive(Debug)]
pub enum TrackerMessage {
    /// Record a new job and start its worker.
    Register {
        job: Box<Job>,
        worker: Box<WorkerSpec>,
        reply: RpcReplyPort<Result<JobId, TrackerError>>,
    },

    /// Latest progress payload of a job.
    GetProgress {
        job_id: JobId,
        reply: RpcReplyPort<Option<Value>>,
    },

    /// Published result of a job.
    GetResult {
        job_id: JobId,
        reply: RpcReplyPort<Option<JobOutcome>>,
    },

    /// Full record of a job.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// Stop a running job.
    Cancel {
        job_id: JobId,
        reason: String,
        reply: RpcReplyPort<Result<(), TrackerError>>,
    },

    /// A progress record from a worker.
    WorkerProgress { job_id: JobId, progress: Value },

    /// A worker reported completion; its outputs are being published.
    WorkerCompleted { job_id: JobId, outputs: Vec<String> },

    /// Publishing finished.
    Published {
        job_id: JobId,
        outcome: Result<ResultMap, FailureReason>,
    },

    /// A worker process exited.
    WorkerExited {
        job_id: JobId,
        code: Option<i32>,
        failure: Option<FailureReason>,
    },

    /// Shutdown the tracker gracefully.
    Shutdown,

    /// Periodic tick for housekeeping.
    Tick,
}

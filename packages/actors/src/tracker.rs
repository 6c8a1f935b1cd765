//! Handle used by callers to submit and query jobs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use processor_core::{Job, JobEvent, JobId, JobOutcome, ProcessRequest};
use ractor::{Actor, ActorRef, RpcReplyPort};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::messages::TrackerMessage;
use crate::publisher::{ArtifactStore, ResultPublisher};
use crate::scratch::{ScratchSpace, remove_quietly};
use crate::tracker_actor::{TrackerActor, TrackerArgs};
use crate::worker::WorkerSpec;

/// Default lifetime of presigned result URLs.
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(3600);

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Cloneable handle to a running tracker.
#[derive(Clone)]
pub struct Tracker {
    actor: ActorRef<TrackerMessage>,
    scratch: ScratchSpace,
    publisher: Arc<ResultPublisher>,
    event_tx: broadcast::Sender<JobEvent>,
    config: Arc<TrackerConfig>,
}

/// Start the tracker actor.
///
/// Results are published to `store` under the configured key prefix.
pub async fn start_tracker(
    config: TrackerConfig,
    store: Arc<dyn ArtifactStore>,
) -> Result<(Tracker, tokio::task::JoinHandle<()>), TrackerError> {
    let scratch = ScratchSpace::new(&config.upload_dir, &config.output_root);
    scratch.init().await?;

    let publisher = Arc::new(ResultPublisher::new(store, config.result_prefix.clone()));
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let args = TrackerArgs {
        publisher: publisher.clone(),
        event_tx: event_tx.clone(),
        retention: config.retention,
        housekeeping_interval: config.housekeeping_interval,
    };
    let (actor, handle) = Actor::spawn(None, TrackerActor, args)
        .await
        .map_err(|e| TrackerError::Unavailable(format!("failed to spawn tracker: {}", e)))?;

    let tracker = Tracker {
        actor,
        scratch,
        publisher,
        event_tx,
        config: Arc::new(config),
    };
    Ok((tracker, handle))
}

impl Tracker {
    /// Accept an artifact and start processing it.
    ///
    /// Parameters are validated before anything is written. The returned ID
    /// can be polled immediately: its progress is `{}` until the worker
    /// reports.
    pub async fn submit(
        &self,
        artifact: Bytes,
        file_name: &str,
        request: &ProcessRequest,
    ) -> Result<JobId, TrackerError> {
        let params = request.validate()?;
        let job_id = JobId::new();

        let input = self.scratch.save_artifact(file_name, &artifact).await?;
        let output_dir = match self.scratch.create_output_dir(job_id).await {
            Ok(dir) => dir,
            Err(e) => {
                remove_quietly(&input).await;
                return Err(e.into());
            }
        };

        let worker = WorkerSpec {
            job_id,
            program: self.config.worker_program.clone(),
            program_args: self.config.worker_args.clone(),
            input,
            output_dir,
            params: params.clone(),
            idle_timeout: self.config.idle_timeout,
            max_runtime: self.config.max_runtime,
        };
        let job = Job::new(job_id, params);

        tracing::info!(job_id = %job_id, file_name, bytes = artifact.len(), "Submitting job");
        self.call(|reply| TrackerMessage::Register {
            job: Box::new(job),
            worker: Box::new(worker),
            reply,
        })
        .await?
    }

    /// Latest progress of a job.
    pub async fn get_progress(&self, job_id: JobId) -> Result<Value, TrackerError> {
        self.call(|reply| TrackerMessage::GetProgress { job_id, reply })
            .await?
            .ok_or(TrackerError::NotFound(job_id))
    }

    /// Published result of a job, or pending while it runs.
    pub async fn get_result(&self, job_id: JobId) -> Result<JobOutcome, TrackerError> {
        self.call(|reply| TrackerMessage::GetResult { job_id, reply })
            .await?
            .ok_or(TrackerError::NotFound(job_id))
    }

    /// Full record of a job.
    pub async fn get_job(&self, job_id: JobId) -> Result<Job, TrackerError> {
        self.call(|reply| TrackerMessage::GetJob { job_id, reply })
            .await?
            .ok_or(TrackerError::NotFound(job_id))
    }

    /// Stop a running job. The job fails with `reason`.
    pub async fn cancel(&self, job_id: JobId, reason: impl Into<String>) -> Result<(), TrackerError> {
        let reason = reason.into();
        self.call(|reply| TrackerMessage::Cancel {
            job_id,
            reason,
            reply,
        })
        .await?
    }

    /// Temporary download URLs for a completed job's outputs.
    pub async fn result_urls(
        &self,
        job_id: JobId,
        ttl: Duration,
    ) -> Result<BTreeMap<String, String>, TrackerError> {
        let job = self.get_job(job_id).await?;
        let Some(result) = job.result else {
            return Err(TrackerError::NotCompleted {
                job_id,
                state: job.state,
            });
        };
        Ok(self.publisher.presign(&result, ttl).await?)
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Stop the tracker, killing running workers.
    pub fn shutdown(&self) {
        if self.actor.send_message(TrackerMessage::Shutdown).is_err() {
            tracing::debug!("Tracker already stopped");
        }
    }

    async fn call<T, F>(&self, build: F) -> Result<T, TrackerError>
    where
        F: FnOnce(RpcReplyPort<T>) -> TrackerMessage,
    {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(build(tx.into()))
            .map_err(|e| TrackerError::Unavailable(e.to_string()))?;
        rx.await
            .map_err(|_| TrackerError::Unavailable("tracker dropped the request".into()))
    }
}

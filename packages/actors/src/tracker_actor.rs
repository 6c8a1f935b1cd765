//! Tracker actor owning the job registry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use processor_core::{Job, JobEvent, JobId};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;

use crate::error::{FailureReason, TrackerError};
use crate::messages::TrackerMessage;
use crate::publisher::ResultPublisher;
use crate::registry::{Applied, JobRegistry};
use crate::scratch::remove_quietly;
use crate::worker::spawn_worker;

/// Arguments for starting the tracker actor.
pub struct TrackerArgs {
    pub publisher: Arc<ResultPublisher>,
    pub event_tx: broadcast::Sender<JobEvent>,
    /// Evict finished jobs older than this.
    pub retention: Option<Duration>,
    pub housekeeping_interval: Duration,
}

/// State for the tracker actor.
pub struct TrackerState {
    registry: JobRegistry,
    publisher: Arc<ResultPublisher>,
    event_tx: broadcast::Sender<JobEvent>,
    retention: Option<Duration>,
}

impl TrackerState {
    /// Broadcast an event.
    fn broadcast(&self, event: JobEvent) {
        tracing::trace!("{}", event.description());
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }

    /// Fail a job unless it already reached a terminal state.
    fn fail(&mut self, job_id: JobId, reason: &FailureReason) {
        match self.registry.fail(job_id, reason.to_string()) {
            Applied::Updated => {
                tracing::warn!(job_id = %job_id, "Job failed: {}", reason);
                self.broadcast(JobEvent::JobFailed {
                    job_id,
                    error: reason.to_string(),
                    timestamp: Utc::now(),
                });
            }
            Applied::Ignored(current) => {
                tracing::debug!(job_id = %job_id, state = %current, "Ignoring failure of settled job: {}", reason);
            }
            Applied::Unknown => {
                tracing::debug!(job_id = %job_id, "Ignoring failure of unknown job: {}", reason);
            }
        }
    }

    fn evict_expired(&mut self) {
        let Some(retention) = self.retention else {
            return;
        };
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return;
        };

        let evicted = self.registry.evict_finished_before(Utc::now() - retention);
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), remaining = self.registry.len(), "Evicted finished jobs");
        }
        for job_id in evicted {
            self.broadcast(JobEvent::JobEvicted {
                job_id,
                timestamp: Utc::now(),
            });
        }
    }
}

/// Tracker actor that records jobs and the progress of their workers.
pub struct TrackerActor;

impl Actor for TrackerActor {
    type Msg = TrackerMessage;
    type State = TrackerState;
    type Arguments = TrackerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(retention = ?args.retention, "Starting tracker");

        if args.retention.is_some() {
            let myself_clone = myself.clone();
            let period = args.housekeeping_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    if myself_clone.send_message(TrackerMessage::Tick).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(TrackerState {
            registry: JobRegistry::new(),
            publisher: args.publisher,
            event_tx: args.event_tx,
            retention: args.retention,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            TrackerMessage::Register { job, worker, reply } => {
                let job_id = job.id;
                if !state.registry.insert(*job) {
                    let _ = reply.send(Err(TrackerError::DuplicateJob(job_id)));
                    return Ok(());
                }

                // The record exists before the worker can report anything.
                let input = worker.input.clone();
                match spawn_worker(*worker, myself.clone(), state.publisher.clone()) {
                    Ok(handle) => {
                        state.registry.attach_handle(job_id, handle);
                        state.broadcast(JobEvent::JobSubmitted {
                            job_id,
                            timestamp: Utc::now(),
                        });
                        let _ = reply.send(Ok(job_id));
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job_id, "Failed to start worker: {}", e);
                        state.fail(job_id, &FailureReason::SpawnFailed(e.to_string()));
                        remove_quietly(&input).await;
                        let _ = reply.send(Err(TrackerError::WorkerSpawn(e.to_string())));
                    }
                }
            }

            TrackerMessage::GetProgress { job_id, reply } => {
                let _ = reply.send(state.registry.get(job_id).map(Job::progress_view));
            }

            TrackerMessage::GetResult { job_id, reply } => {
                let _ = reply.send(state.registry.get(job_id).map(Job::outcome));
            }

            TrackerMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.registry.get(job_id).cloned());
            }

            TrackerMessage::Cancel {
                job_id,
                reason,
                reply,
            } => match state.registry.take_for_cancel(job_id) {
                Ok(handle) => {
                    if let Some(handle) = handle
                        && !handle.cancel(reason.clone())
                    {
                        tracing::debug!(job_id = %job_id, "Worker already exiting");
                    }
                    state.fail(job_id, &FailureReason::Cancelled(reason));
                    let _ = reply.send(Ok(()));
                }
                Err(Applied::Ignored(current)) => {
                    let _ = reply.send(Err(TrackerError::NotRunning {
                        job_id,
                        state: current,
                    }));
                }
                Err(_) => {
                    let _ = reply.send(Err(TrackerError::NotFound(job_id)));
                }
            },

            TrackerMessage::WorkerProgress { job_id, progress } => {
                match state.registry.record_progress(job_id, progress.clone()) {
                    Applied::Updated => {
                        tracing::debug!(job_id = %job_id, progress = %progress, "Progress");
                        state.broadcast(JobEvent::JobProgress {
                            job_id,
                            progress,
                            timestamp: Utc::now(),
                        });
                    }
                    Applied::Ignored(current) => {
                        tracing::debug!(job_id = %job_id, state = %current, "Dropping late progress");
                    }
                    Applied::Unknown => {
                        tracing::warn!(job_id = %job_id, "Progress for unknown job");
                    }
                }
            }

            TrackerMessage::WorkerCompleted { job_id, outputs } => {
                if state.registry.begin_finalizing(job_id) == Applied::Updated {
                    tracing::info!(job_id = %job_id, outputs = ?outputs, "Worker completed, publishing outputs");
                    state.broadcast(JobEvent::JobFinalizing {
                        job_id,
                        outputs,
                        timestamp: Utc::now(),
                    });
                }
            }

            TrackerMessage::Published { job_id, outcome } => match outcome {
                Ok(result) => match state.registry.complete(job_id, result.clone()) {
                    Applied::Updated => {
                        let duration_ms = state
                            .registry
                            .get(job_id)
                            .and_then(Job::duration_ms)
                            .unwrap_or_default();
                        tracing::info!(job_id = %job_id, duration_ms, "Job completed");
                        state.broadcast(JobEvent::JobCompleted {
                            job_id,
                            result,
                            duration_ms,
                            timestamp: Utc::now(),
                        });
                    }
                    // Cancelled between reading the completion and recording it.
                    _ => {
                        let publisher = state.publisher.clone();
                        tokio::spawn(async move { publisher.discard(job_id, &result).await });
                    }
                },
                Err(reason) => state.fail(job_id, &reason),
            },

            TrackerMessage::WorkerExited {
                job_id,
                code,
                failure,
            } => {
                let pid = state
                    .registry
                    .release_handle(job_id)
                    .and_then(|handle| handle.pid());
                tracing::debug!(job_id = %job_id, pid = ?pid, code = ?code, active = state.registry.active(), "Worker released");
                if let Some(reason) = failure {
                    state.fail(job_id, &reason);
                }
            }

            TrackerMessage::Shutdown => {
                tracing::info!("Shutting down tracker");
                for (job_id, handle) in state.registry.take_handles() {
                    if !handle.cancel("tracker shutting down".into()) {
                        tracing::debug!(job_id = %job_id, "Worker already exiting");
                    }
                }
                myself.stop(None);
                return Ok(());
            }

            TrackerMessage::Tick => {
                state.evict_expired();
            }
        }

        Ok(())
    }
}

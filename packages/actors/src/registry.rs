//! In-memory job registry owned by the tracker actor.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use processor_core::{Job, JobId, JobState, ResultMap};
use serde_json::Value;

use crate::worker::WorkerHandle;

/// Outcome of applying a transition to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The job changed.
    Updated,
    /// The job exists but its state does not allow the transition.
    Ignored(JobState),
    /// No job with that ID.
    Unknown,
}

struct JobEntry {
    job: Job,
    handle: Option<WorkerHandle>,
}

/// Job records and the worker handles attached to them.
///
/// Terminal jobs never change again; every transition out of
/// `completed` or `failed` is ignored.
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<JobId, JobEntry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new job. Returns `false` if the ID is already taken.
    pub fn insert(&mut self, job: Job) -> bool {
        if self.jobs.contains_key(&job.id) {
            return false;
        }
        self.jobs.insert(job.id, JobEntry { job, handle: None });
        true
    }

    /// Attach the running worker to its job.
    pub fn attach_handle(&mut self, job_id: JobId, handle: WorkerHandle) {
        if let Some(entry) = self.jobs.get_mut(&job_id) {
            entry.handle = Some(handle);
        }
    }

    /// Drop the worker handle once the process has exited.
    pub fn release_handle(&mut self, job_id: JobId) -> Option<WorkerHandle> {
        self.jobs.get_mut(&job_id)?.handle.take()
    }

    pub fn get(&self, job_id: JobId) -> Option<&Job> {
        self.jobs.get(&job_id).map(|e| &e.job)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs whose worker has not finished yet.
    pub fn active(&self) -> usize {
        self.jobs
            .values()
            .filter(|e| !e.job.state.is_terminal())
            .count()
    }

    /// Replace the progress payload of a running job.
    pub fn record_progress(&mut self, job_id: JobId, progress: Value) -> Applied {
        self.transition(job_id, JobState::accepts_progress, |job| {
            job.progress = progress;
        })
    }

    /// Mark a running job as publishing its outputs.
    pub fn begin_finalizing(&mut self, job_id: JobId) -> Applied {
        self.transition(job_id, JobState::accepts_progress, |job| {
            job.state = JobState::Finalizing;
        })
    }

    /// Record the published result of a job.
    pub fn complete(&mut self, job_id: JobId, result: ResultMap) -> Applied {
        self.transition(job_id, is_open, |job| {
            job.state = JobState::Completed;
            job.progress = processor_core::completed_marker();
            job.result = Some(result);
            job.finished_at = Some(Utc::now());
        })
    }

    /// Record a failure.
    pub fn fail(&mut self, job_id: JobId, error: String) -> Applied {
        self.transition(job_id, is_open, |job| {
            job.state = JobState::Failed;
            job.error = Some(error);
            job.finished_at = Some(Utc::now());
        })
    }

    /// Take the worker handle of a running job so it can be stopped.
    ///
    /// Finalizing jobs cannot be cancelled: their outputs are already
    /// being published.
    pub fn take_for_cancel(&mut self, job_id: JobId) -> Result<Option<WorkerHandle>, Applied> {
        let entry = self.jobs.get_mut(&job_id).ok_or(Applied::Unknown)?;
        if entry.job.state != JobState::Running {
            return Err(Applied::Ignored(entry.job.state));
        }
        Ok(entry.handle.take())
    }

    /// Take every attached worker handle.
    pub fn take_handles(&mut self) -> Vec<(JobId, WorkerHandle)> {
        self.jobs
            .iter_mut()
            .filter_map(|(id, entry)| entry.handle.take().map(|h| (*id, h)))
            .collect()
    }

    /// Remove terminal jobs that finished before `cutoff`.
    pub fn evict_finished_before(&mut self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        let expired: Vec<JobId> = self
            .jobs
            .values()
            .filter(|e| e.job.state.is_terminal() && e.job.finished_at.is_some_and(|t| t < cutoff))
            .map(|e| e.job.id)
            .collect();

        for id in &expired {
            self.jobs.remove(id);
        }
        expired
    }

    fn transition(
        &mut self,
        job_id: JobId,
        allowed: impl Fn(&JobState) -> bool,
        apply: impl FnOnce(&mut Job),
    ) -> Applied {
        let Some(entry) = self.jobs.get_mut(&job_id) else {
            return Applied::Unknown;
        };
        if !allowed(&entry.job.state) {
            return Applied::Ignored(entry.job.state);
        }
        apply(&mut entry.job);
        entry.job.updated_at = Utc::now();
        Applied::Updated
    }
}

fn is_open(state: &JobState) -> bool {
    !state.is_terminal()
}

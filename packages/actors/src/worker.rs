//! External worker processes.
//!
//! Each job runs one worker process. Its stdout is read line by line and
//! decoded as worker reports; stderr is only logged. The supervising task
//! forwards progress to the tracker, publishes outputs when the worker
//! reports completion, and tells the tracker how the process ended.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use processor_core::{JobId, ProcessParams, WorkerReport, parse_line};
use ractor::ActorRef;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::FailureReason;
use crate::messages::TrackerMessage;
use crate::publisher::ResultPublisher;
use crate::scratch::remove_quietly;

/// Everything needed to launch the worker for one job.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub job_id: JobId,
    pub program: String,
    /// Arguments placed before the per-job flags.
    pub program_args: Vec<String>,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub params: ProcessParams,
    pub idle_timeout: Option<Duration>,
    pub max_runtime: Option<Duration>,
}

impl WorkerSpec {
    /// Full argument list: program args, input, job parameters, output dir.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.program_args.clone();
        args.push("--video".to_string());
        args.push(self.input.to_string_lossy().into_owned());
        args.extend(self.params.worker_args());
        args.push("--output-dir".to_string());
        args.push(self.output_dir.to_string_lossy().into_owned());
        args
    }
}

/// Handle to a running worker, held by the registry.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: Option<u32>,
    cancel: oneshot::Sender<String>,
}

impl WorkerHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the supervising task to kill the process.
    pub fn cancel(self, reason: String) -> bool {
        self.cancel.send(reason).is_ok()
    }
}

/// Start the worker for `spec` and supervise it in a background task.
pub fn spawn_worker(
    spec: WorkerSpec,
    tracker: ActorRef<TrackerMessage>,
    publisher: Arc<ResultPublisher>,
) -> io::Result<WorkerHandle> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(spec.command_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn()?;
    let pid = child.id();
    tracing::info!(job_id = %spec.job_id, pid = ?pid, program = %spec.program, "Started worker");

    let (cancel_tx, cancel_rx) = oneshot::channel();
    tokio::spawn(supervise(child, spec, tracker, publisher, cancel_rx));

    Ok(WorkerHandle {
        pid,
        cancel: cancel_tx,
    })
}

/// Stop conditions watched while the worker runs.
struct Watch {
    cancel_rx: oneshot::Receiver<String>,
    cancel_open: bool,
    deadline: Option<Instant>,
    max_runtime: Option<Duration>,
    idle_timeout: Option<Duration>,
    last_output: Instant,
}

impl Watch {
    /// Idle limit counts from the last stdout line, even after stdout closed.
    fn idle_deadline(&self) -> Option<Instant> {
        self.idle_timeout.map(|limit| self.last_output + limit)
    }

    fn runtime_exceeded(&self) -> FailureReason {
        FailureReason::TimedOut {
            limit: "completion",
            secs: self.max_runtime.unwrap_or_default().as_secs(),
        }
    }

    fn idle_exceeded(&self) -> FailureReason {
        FailureReason::TimedOut {
            limit: "output",
            secs: self.idle_timeout.unwrap_or_default().as_secs(),
        }
    }
}

enum ReadEnd {
    Completed(BTreeMap<String, PathBuf>),
    Stopped(FailureReason),
    Closed,
}

async fn supervise(
    mut child: Child,
    spec: WorkerSpec,
    tracker: ActorRef<TrackerMessage>,
    publisher: Arc<ResultPublisher>,
    cancel_rx: oneshot::Receiver<String>,
) {
    let job_id = spec.job_id;
    let mut watch = Watch {
        cancel_rx,
        cancel_open: true,
        deadline: spec.max_runtime.map(|limit| Instant::now() + limit),
        max_runtime: spec.max_runtime,
        idle_timeout: spec.idle_timeout,
        last_output: Instant::now(),
    };

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(log_stderr(job_id, stderr));
    }

    let mut reported_error: Option<String> = None;
    let mut completed = false;
    let mut stopped: Option<FailureReason> = None;

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        match read_reports(job_id, &mut lines, &mut watch, &tracker, &mut reported_error).await {
            ReadEnd::Completed(output_files) => {
                completed = true;
                // Later lines are ignored but must be drained so the worker never blocks.
                tokio::spawn(drain(lines));
                finalize(job_id, output_files, &tracker, &publisher).await;
            }
            ReadEnd::Stopped(reason) => stopped = Some(reason),
            ReadEnd::Closed => {}
        }
    }

    if stopped.is_none() {
        stopped = wait_or_stop(&mut child, &mut watch, completed).await;
    }

    let code = match stopped {
        Some(ref reason) => {
            tracing::warn!(job_id = %job_id, "Stopping worker: {}", reason);
            if let Err(e) = child.kill().await {
                tracing::warn!(job_id = %job_id, "Failed to kill worker: {}", e);
            }
            None
        }
        None => match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!(job_id = %job_id, "Failed to reap worker: {}", e);
                None
            }
        },
    };

    remove_quietly(&spec.input).await;
    if let Err(e) = tokio::fs::remove_dir(&spec.output_dir).await {
        tracing::debug!(job_id = %job_id, "Output directory left in place: {}", e);
    }

    let failure = match stopped {
        Some(reason) if !completed => Some(reason),
        _ if completed => None,
        _ => Some(FailureReason::WorkerAbnormalExit {
            code,
            message: reported_error,
        }),
    };

    tracing::info!(job_id = %job_id, code = ?code, completed, "Worker exited");
    if tracker
        .send_message(TrackerMessage::WorkerExited {
            job_id,
            code,
            failure,
        })
        .is_err()
    {
        tracing::debug!(job_id = %job_id, "Tracker stopped before worker exit was recorded");
    }
}

/// Read reports until completion, end of output, or a stop condition.
async fn read_reports(
    job_id: JobId,
    lines: &mut Lines<BufReader<ChildStdout>>,
    watch: &mut Watch,
    tracker: &ActorRef<TrackerMessage>,
    reported_error: &mut Option<String>,
) -> ReadEnd {
    loop {
        let far = Instant::now() + Duration::from_secs(86_400);
        let idle_at = watch.idle_deadline().unwrap_or(far);
        tokio::select! {
            reason = &mut watch.cancel_rx, if watch.cancel_open => match reason {
                Ok(reason) => return ReadEnd::Stopped(FailureReason::Cancelled(reason)),
                Err(_) => watch.cancel_open = false,
            },
            _ = tokio::time::sleep_until(watch.deadline.unwrap_or(far)), if watch.deadline.is_some() => {
                return ReadEnd::Stopped(watch.runtime_exceeded());
            }
            _ = tokio::time::sleep_until(idle_at), if watch.idle_timeout.is_some() => {
                return ReadEnd::Stopped(watch.idle_exceeded());
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    watch.last_output = Instant::now();
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_line(&line) {
                        Ok(WorkerReport::Completed { output_files }) => {
                            return ReadEnd::Completed(output_files);
                        }
                        Ok(report @ WorkerReport::Progress(_)) => {
                            if let Some(message) = report.reported_error() {
                                tracing::warn!(job_id = %job_id, "Worker reported error: {}", message);
                                *reported_error = Some(message.to_string());
                            }
                            if let WorkerReport::Progress(progress) = report
                                && tracker
                                    .send_message(TrackerMessage::WorkerProgress { job_id, progress })
                                    .is_err()
                            {
                                tracing::debug!(job_id = %job_id, "Tracker stopped, dropping progress");
                            }
                        }
                        Err(skipped) => {
                            tracing::warn!(job_id = %job_id, line = %line, "{}", skipped);
                        }
                    }
                }
                Ok(None) => return ReadEnd::Closed,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, "Failed to read worker output: {}", e);
                    return ReadEnd::Closed;
                }
            },
        }
    }
}

/// Publish outputs and report the outcome.
async fn finalize(
    job_id: JobId,
    output_files: BTreeMap<String, PathBuf>,
    tracker: &ActorRef<TrackerMessage>,
    publisher: &ResultPublisher,
) {
    let outputs: Vec<String> = output_files.keys().cloned().collect();
    if tracker
        .send_message(TrackerMessage::WorkerCompleted { job_id, outputs })
        .is_err()
    {
        tracing::debug!(job_id = %job_id, "Tracker stopped before completion was recorded");
    }

    let outcome = publisher.publish(job_id, &output_files).await;
    if tracker
        .send_message(TrackerMessage::Published { job_id, outcome })
        .is_err()
    {
        tracing::debug!(job_id = %job_id, "Tracker stopped before publishing was recorded");
    }
}

/// Wait for the process to exit. Returns a reason if it has to be stopped.
async fn wait_or_stop(child: &mut Child, watch: &mut Watch, completed: bool) -> Option<FailureReason> {
    loop {
        let far = Instant::now() + Duration::from_secs(86_400);
        let idle_at = watch.idle_deadline().unwrap_or(far);
        tokio::select! {
            reason = &mut watch.cancel_rx, if watch.cancel_open && !completed => match reason {
                Ok(reason) => return Some(FailureReason::Cancelled(reason)),
                Err(_) => watch.cancel_open = false,
            },
            _ = tokio::time::sleep_until(watch.deadline.unwrap_or(far)), if watch.deadline.is_some() => {
                return Some(watch.runtime_exceeded());
            }
            _ = tokio::time::sleep_until(idle_at), if watch.idle_timeout.is_some() && !completed => {
                return Some(watch.idle_exceeded());
            }
            // Reaped again by the caller; a second wait returns the cached status.
            _ = child.wait() => return None,
        }
    }
}

async fn drain(mut lines: Lines<BufReader<ChildStdout>>) {
    while let Ok(Some(_)) = lines.next_line().await {}
}

async fn log_stderr(job_id: JobId, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(job_id = %job_id, "worker stderr: {}", line);
    }
}

//! Tracker configuration.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for launching workers and keeping job state.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Program the worker is started with.
    pub worker_program: String,
    /// Arguments placed before the per-job flags (typically the script path).
    pub worker_args: Vec<String>,
    /// Directory uploaded artifacts are written to.
    pub upload_dir: PathBuf,
    /// Directory per-job output directories are created under.
    pub output_root: PathBuf,
    /// Object key prefix results are published under.
    pub result_prefix: String,
    /// Kill a worker that prints nothing on stdout for this long.
    pub idle_timeout: Option<Duration>,
    /// Kill a worker that runs longer than this.
    pub max_runtime: Option<Duration>,
    /// Evict finished jobs older than this. `None` keeps every job.
    pub retention: Option<Duration>,
    /// How often retention is enforced.
    pub housekeeping_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            worker_program: "python3".to_string(),
            worker_args: vec!["child_process.py".to_string()],
            upload_dir: PathBuf::from("./uploads"),
            output_root: PathBuf::from("./output"),
            result_prefix: "results".to_string(),
            idle_timeout: None,
            max_runtime: None,
            retention: None,
            housekeeping_interval: Duration::from_secs(30),
        }
    }
}

impl TrackerConfig {
    /// Set the worker program and its leading arguments.
    pub fn with_worker(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.worker_program = program.into();
        self.worker_args = args;
        self
    }

    /// Set the scratch directories.
    pub fn with_scratch(mut self, upload_dir: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        self.upload_dir = upload_dir.into();
        self.output_root = output_root.into();
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_max_runtime(mut self, limit: Duration) -> Self {
        self.max_runtime = Some(limit);
        self
    }

    pub fn with_retention(mut self, retention: Duration, interval: Duration) -> Self {
        self.retention = Some(retention);
        self.housekeeping_interval = interval;
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `WORKER_PROGRAM` (default: `python3`)
    /// - `WORKER_ARGS` (whitespace separated, default: `child_process.py`)
    /// - `SCRATCH_UPLOAD_DIR` (default: `./uploads`)
    /// - `SCRATCH_OUTPUT_DIR` (default: `./output`)
    /// - `RESULT_KEY_PREFIX` (default: `results`)
    /// - `WORKER_IDLE_TIMEOUT_SECS`, `WORKER_MAX_RUNTIME_SECS` (optional)
    /// - `JOB_RETENTION_SECS` (optional), `HOUSEKEEPING_INTERVAL_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let worker_program = env_string("WORKER_PROGRAM").unwrap_or(defaults.worker_program);
        let worker_args = env_string("WORKER_ARGS")
            .map(|args| args.split_whitespace().map(str::to_string).collect())
            .unwrap_or(defaults.worker_args);

        Ok(Self {
            worker_program,
            worker_args,
            upload_dir: env_string("SCRATCH_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            output_root: env_string("SCRATCH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
            result_prefix: env_string("RESULT_KEY_PREFIX").unwrap_or(defaults.result_prefix),
            idle_timeout: env_secs("WORKER_IDLE_TIMEOUT_SECS")?,
            max_runtime: env_secs("WORKER_MAX_RUNTIME_SECS")?,
            retention: env_secs("JOB_RETENTION_SECS")?,
            housekeeping_interval: env_secs("HOUSEKEEPING_INTERVAL_SECS")?
                .unwrap_or(defaults.housekeeping_interval),
        })
    }
}

fn env_string(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_secs(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = env_string(var) else {
        return Ok(None);
    };
    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value,
            reason: "must be greater than zero".into(),
        }),
        Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        Err(e) => Err(ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        }),
    }
}

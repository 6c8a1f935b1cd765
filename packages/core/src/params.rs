//! Submission parameters and their validation.

use serde::{Deserialize, Serialize};

const DEFAULT_WORKER_COUNT: i64 = 4;
const DEFAULT_BATCH_SIZE: i64 = 1;
const WORKER_COUNT_RANGE: (i64, i64) = (1, 32);
const BATCH_SIZE_RANGE: (i64, i64) = (1, 100);

/// Rejected submission parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Raw, unvalidated submission parameters as received from a caller.
///
/// Field names follow the wire contract (`startTime`, `endTime`,
/// `processes`, `batchSize`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(alias = "startOffset")]
    pub start_time: Option<f64>,
    #[serde(alias = "endOffset")]
    pub end_time: Option<f64>,
    #[serde(alias = "workerCount")]
    pub processes: Option<i64>,
    pub batch_size: Option<i64>,
}

impl ProcessRequest {
    pub fn new(start_time: f64, end_time: f64) -> Self {
        Self {
            start_time: Some(start_time),
            end_time: Some(end_time),
            processes: None,
            batch_size: None,
        }
    }

    pub fn with_processes(mut self, processes: i64) -> Self {
        self.processes = Some(processes);
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Validate and apply defaults.
    pub fn validate(&self) -> Result<ProcessParams, ValidationError> {
        let start_offset = offset("startTime", self.start_time)?;
        let end_offset = offset("endTime", self.end_time)?;
        let worker_count = bounded(
            "processes",
            self.processes.unwrap_or(DEFAULT_WORKER_COUNT),
            WORKER_COUNT_RANGE,
        )?;
        let batch_size = bounded(
            "batchSize",
            self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            BATCH_SIZE_RANGE,
        )?;

        Ok(ProcessParams {
            start_offset,
            end_offset,
            worker_count,
            batch_size,
        })
    }
}

fn offset(field: &'static str, value: Option<f64>) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::Missing { field })?;
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field });
    }
    if value < 0.0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(value)
}

fn bounded(field: &'static str, value: i64, (min, max): (i64, i64)) -> Result<u32, ValidationError> {
    if !(min..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    // Bounds are well inside u32.
    Ok(value as u32)
}

/// Validated parameters a worker is started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessParams {
    /// Offset (seconds) into the input to start processing at.
    pub start_offset: f64,
    /// Offset (seconds) into the input to stop processing at.
    pub end_offset: f64,
    /// Number of worker-side processes, in `[1, 32]`.
    pub worker_count: u32,
    /// Frames per worker batch, in `[1, 100]`.
    pub batch_size: u32,
}

impl ProcessParams {
    /// Command line arguments understood by the worker script, excluding
    /// the input and output paths.
    pub fn worker_args(&self) -> Vec<String> {
        vec![
            "--start-time".to_string(),
            self.start_offset.to_string(),
            "--end-time".to_string(),
            self.end_offset.to_string(),
            "--processes".to_string(),
            self.worker_count.to_string(),
            "--batch-size".to_string(),
            self.batch_size.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_defaults() {
        let params = ProcessRequest::new(0.0, 10.0).validate().unwrap();
        assert_eq!(params.worker_count, 4);
        assert_eq!(params.batch_size, 1);
    }

    #[test]
    fn worker_count_bounds() {
        for rejected in [0, 33] {
            let err = ProcessRequest::new(0.0, 10.0)
                .with_processes(rejected)
                .validate()
                .unwrap_err();
            assert!(matches!(
                err,
                ValidationError::OutOfRange { field: "processes", .. }
            ));
        }
        for accepted in [1, 32] {
            let params = ProcessRequest::new(0.0, 10.0)
                .with_processes(accepted)
                .validate()
                .unwrap();
            assert_eq!(params.worker_count, accepted as u32);
        }
    }

    #[test]
    fn batch_size_bounds() {
        assert!(ProcessRequest::new(0.0, 1.0).with_batch_size(0).validate().is_err());
        assert!(ProcessRequest::new(0.0, 1.0).with_batch_size(101).validate().is_err());
        assert!(ProcessRequest::new(0.0, 1.0).with_batch_size(100).validate().is_ok());
    }

    #[test]
    fn rejects_negative_and_missing_offsets() {
        assert_eq!(
            ProcessRequest::new(-1.0, 10.0).validate().unwrap_err(),
            ValidationError::Negative {
                field: "startTime",
                value: -1.0
            }
        );
        assert!(ProcessRequest::new(0.0, f64::NAN).validate().is_err());
        assert_eq!(
            ProcessRequest::default().validate().unwrap_err(),
            ValidationError::Missing { field: "startTime" }
        );
    }

    #[test]
    fn deserializes_wire_names() {
        let request: ProcessRequest =
            serde_json::from_str(r#"{"startTime": 1.5, "endTime": 3, "processes": 2}"#).unwrap();
        let params = request.validate().unwrap();
        assert_eq!(params.start_offset, 1.5);
        assert_eq!(params.end_offset, 3.0);
        assert_eq!(params.worker_count, 2);
    }

    #[test]
    fn worker_args_follow_script_flags() {
        let params = ProcessRequest::new(0.0, 10.0).validate().unwrap();
        assert_eq!(
            params.worker_args(),
            vec![
                "--start-time",
                "0",
                "--end-time",
                "10",
                "--processes",
                "4",
                "--batch-size",
                "1"
            ]
        );
    }
}

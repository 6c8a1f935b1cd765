//! Decoding of the worker's line-oriented stdout protocol.
//!
//! Every stdout line is one JSON record. A record tagged
//! `{"status": "completed", "output_files": {name: path, ...}}` is the
//! terminal report; any other JSON value is a progress payload whose shape is
//! defined by the worker.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

/// A decoded stdout record.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReport {
    /// Terminal report: logical output name to local file path.
    Completed { output_files: BTreeMap<String, PathBuf> },
    /// Anything else the worker printed as JSON.
    Progress(Value),
}

impl WorkerReport {
    /// Error message of a `{"status": "error", "message": ...}` record.
    pub fn reported_error(&self) -> Option<&str> {
        match self {
            WorkerReport::Progress(Value::Object(map))
                if map.get("status").and_then(Value::as_str) == Some("error") =>
            {
                Some(
                    map.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("worker reported an error"),
                )
            }
            _ => None,
        }
    }
}

/// A stdout line that is not a JSON record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("non-JSON worker output: {reason}")]
pub struct DecodeSkipped {
    pub reason: String,
}

/// Decode one stdout line.
///
/// Callers skip blank lines before decoding.
pub fn parse_line(line: &str) -> Result<WorkerReport, DecodeSkipped> {
    let value: Value = serde_json::from_str(line.trim()).map_err(|e| DecodeSkipped {
        reason: e.to_string(),
    })?;

    Ok(match completed_outputs(&value) {
        Some(output_files) => WorkerReport::Completed { output_files },
        None => WorkerReport::Progress(value),
    })
}

fn completed_outputs(value: &Value) -> Option<BTreeMap<String, PathBuf>> {
    let record = value.as_object()?;
    if record.get("status").and_then(Value::as_str) != Some("completed") {
        return None;
    }

    record
        .get("output_files")?
        .as_object()?
        .iter()
        .map(|(name, path)| Some((name.clone(), PathBuf::from(path.as_str()?))))
        .collect()
}

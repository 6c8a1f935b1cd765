//! Core domain types for the video processor job tracker.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobState and submission parameters
//! - Worker report decoding for the line-oriented stdout protocol
//! - Events for observers of job lifecycle changes

mod events;
mod job;
mod params;
pub mod report;

pub use events::JobEvent;
pub use job::{Job, JobId, JobOutcome, JobState, ResultMap, completed_marker, failed_marker};
pub use params::{ProcessParams, ProcessRequest, ValidationError};
pub use report::{DecodeSkipped, WorkerReport, parse_line};

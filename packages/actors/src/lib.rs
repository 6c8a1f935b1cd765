//! Actor system for the video processor job tracker.
//!
//! This crate provides the Ractor-based tracker that owns job state, the
//! worker processes that do the actual processing, and publishing of their
//! outputs to the object store.
//!
//! # Architecture
//!
//! - `TrackerActor` - Owns the job registry and serializes every state change
//! - Worker tasks - One external process per job, supervised in a tokio task
//! - `ResultPublisher` - Uploads a finished job's outputs as one unit
//!
//! # Usage
//!
//! ```ignore
//! use actors::{TrackerConfig, start_tracker};
//!
//! let storage = Arc::new(storage::Storage::from_env().await?);
//! let (tracker, handle) = start_tracker(TrackerConfig::from_env()?, storage).await?;
//!
//! let job_id = tracker.submit(bytes, "clip.mp4", &request).await?;
//! let progress = tracker.get_progress(job_id).await?;
//! ```

mod config;
mod error;
mod messages;
mod publisher;
pub mod registry;
mod scratch;
mod tracker;
mod tracker_actor;
mod worker;

pub use config::{ConfigError, TrackerConfig};
pub use error::{FailureReason, TrackerError};
pub use messages::TrackerMessage;
pub use publisher::{ArtifactStore, ResultPublisher, StoreFuture, content_type_for};
pub use scratch::ScratchSpace;
pub use tracker::{DEFAULT_URL_TTL, Tracker, start_tracker};
pub use tracker_actor::TrackerActor;
pub use worker::{WorkerHandle, WorkerSpec};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};

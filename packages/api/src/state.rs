use std::sync::Arc;

use actors::Tracker;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (the tracker is a handle, the config is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Handle to the job tracker.
    pub tracker: Tracker,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

//! HTTP API for the video processor.
//!
//! - `POST /processor/process` accepts an upload and starts a job
//! - `GET /processor/progress/{id}` and `GET /processor/result/{id}` poll it
//! - `GET /health` reports liveness

pub mod config;
pub mod error;
pub mod init;
pub mod routes;
pub mod state;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use init::init_processor;
use state::AppState;

/// Build the application router with its middleware stack.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .merge(routes::health::router())
        .nest("/processor", routes::processor_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

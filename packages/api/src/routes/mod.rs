pub mod health;
pub mod processor;

use axum::Router;

use crate::state::AppState;

/// Routes of the processing API, mounted under `/processor`.
pub fn processor_routes() -> Router<AppState> {
    processor::router()
}

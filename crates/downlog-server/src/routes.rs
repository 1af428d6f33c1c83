//! Route configuration for the log API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get};
use tower_http::trace::TraceLayer;

use crate::handlers::{fetch_logs, health_check};
use crate::state::AppState;

/// Create the log API router.
///
/// Routes live under `{api_prefix}/api`; `/health` is matched before the
/// category capture.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_base = state.config().api_base();

    let api_routes = Router::new()
        // Health check
        .route("/health", get(health_check))
        // One endpoint per category; the handler enforces POST
        .route("/{category}", any(fetch_logs));

    Router::new()
        .nest(&api_base, api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

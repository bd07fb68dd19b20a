//! HTTP API
//!
//! Thin handlers over the order core. Routers follow the area layout:
//! each area contributes its own `Router` nested under `/api`.

pub mod health;
pub mod kitchen;
pub mod orders;

use axum::Router;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::server::ServerState;

/// Compose the full application router
pub fn build_router(state: ServerState) -> Router {
    let request_timeout = Duration::from_millis(state.config.request_timeout_ms);

    Router::new()
        .merge(health::router())
        .merge(orders::router())
        .merge(kitchen::router())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Order API Module
//!
//! Customer-facing placement, history and cancellation. Status advances by
//! kitchen/delivery systems live under the kitchen API instead.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        // Place (idempotent) and list own orders
        .route("/", post(handler::place).get(handler::list))
        // Order detail (ownership-checked)
        .route("/{id}", get(handler::get_by_id))
        // Customer cancellation
        .route("/{id}/cancel", post(handler::cancel))
}

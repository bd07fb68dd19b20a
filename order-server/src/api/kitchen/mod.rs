//! Kitchen API Module
//!
//! Status advances driven by kitchen and delivery systems. Requires the
//! internal caller token; end customers never reach these routes.

mod handler;

use axum::{Router, routing::post};

use crate::server::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/kitchen", routes())
}

fn routes() -> Router<ServerState> {
    Router::new().route("/orders/{id}/status", post(handler::advance))
}

//! Order placement and status coordination server
//!
//! The core of a multi-service food-ordering platform: accepts an order
//! exactly once despite retries, persists it atomically with its line items,
//! drives the dependent payment step, and serves and advances order state
//! under concurrent queries and updates.
//!
//! Module map:
//! - `orders`: storage, idempotency ledger, placement orchestration, status
//! - `payment`: payment coordinator boundary and record store
//! - `menu`: menu collaborator boundary (validation/repricing source)
//! - `auth`: upstream-verified caller identity and ownership guard
//! - `api`: axum handlers and routers
//! - `server`: configuration, state wiring, HTTP server

pub mod api;
pub mod auth;
pub mod common;
pub mod menu;
pub mod orders;
pub mod payment;
pub mod server;

// Re-exports
pub use server::{Config, Server, ServerState};

//! Shared types for the ordering platform
//!
//! Domain types used across server crates and clients: the order state
//! machine, order and line item records, payment records, and menu items.

pub mod models;
pub mod order;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

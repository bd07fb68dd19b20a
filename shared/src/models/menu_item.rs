use serde::{Deserialize, Serialize};

/// A menu entry as served by the menu collaborator.
///
/// The order core uses it only to validate and reprice draft lines; menu
/// management is out of scope here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItem {
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
    /// Current unit price
    pub price: f64,
    /// Unavailable items can be browsed but not ordered
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_true() -> bool {
    true
}

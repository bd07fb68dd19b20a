//! Menu collaborator boundary
//!
//! The menu service owns item CRUD and pricing; the order core only ever
//! asks "what does this item cost right now, and can it be ordered". The
//! `MenuProvider` trait is that question; `MenuCatalog` is an in-memory
//! cache implementation of it, seeded from a JSON file at startup.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared::models::MenuItem;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Menu lookup errors
#[derive(Debug, Error)]
pub enum MenuError {
    #[error("menu service unreachable: {0}")]
    Unreachable(String),

    #[error("failed to load menu catalog: {0}")]
    Load(String),
}

/// Price/availability lookup by menu item id
#[async_trait]
pub trait MenuProvider: Send + Sync {
    /// Current menu entry for `menu_item_id` within `restaurant_id`, or
    /// `None` when the restaurant has no such item
    async fn get_item(
        &self,
        restaurant_id: &str,
        menu_item_id: &str,
    ) -> Result<Option<MenuItem>, MenuError>;
}

/// In-memory menu catalog keyed by item id
pub struct MenuCatalog {
    items: RwLock<HashMap<String, MenuItem>>,
}

impl MenuCatalog {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Load a catalog from a JSON file containing an array of menu items
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, MenuError> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| MenuError::Load(format!("{}: {}", path.as_ref().display(), e)))?;
        let entries: Vec<MenuItem> =
            serde_json::from_slice(&bytes).map_err(|e| MenuError::Load(e.to_string()))?;

        let catalog = Self::new();
        {
            let mut items = catalog.items.write();
            for entry in entries {
                items.insert(entry.id.clone(), entry);
            }
        }
        tracing::info!(count = catalog.len(), "menu catalog loaded");
        Ok(catalog)
    }

    /// Insert or replace a catalog entry
    pub fn upsert(&self, item: MenuItem) {
        self.items.write().insert(item.id.clone(), item);
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl Default for MenuCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MenuProvider for MenuCatalog {
    async fn get_item(
        &self,
        restaurant_id: &str,
        menu_item_id: &str,
    ) -> Result<Option<MenuItem>, MenuError> {
        let items = self.items.read();
        // An item listed under another restaurant is unknown here; cross-
        // restaurant ids must not resolve.
        Ok(items
            .get(menu_item_id)
            .filter(|item| item.restaurant_id == restaurant_id)
            .cloned())
    }
}

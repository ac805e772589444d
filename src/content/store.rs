//! Content Store interface and a TOML-backed catalog.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::ConfigError;
use crate::content::{Difficulty, Item};
use crate::error::BackendError;

/// Source of playable items tagged with a difficulty.
#[async_trait]
pub trait ContentStore: Send + Sync + std::fmt::Debug {
    /// Fetches up to `limit` items with difficulty in `[min, max]`.
    async fn fetch_items(
        &self,
        min: Difficulty,
        max: Difficulty,
        limit: usize,
    ) -> Result<Vec<Item>, BackendError>;
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<Item>,
}

/// In-memory content store loaded from a TOML catalog.
///
/// ```toml
/// [[items]]
/// id = "cat"
/// prompt = "Purrs and knocks things off tables"
/// display_glyph = "🐱"
/// answer_text = "cat"
/// difficulty = 1
/// ```
#[derive(Debug, Clone)]
pub struct CatalogContentStore {
    items: Vec<Item>,
}

impl CatalogContentStore {
    /// Creates a catalog from already-built items.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if two items share an id.
    #[instrument(skip(items), fields(count = items.len()))]
    pub fn new(items: Vec<Item>) -> Result<Self, ConfigError> {
        let mut ids = HashSet::new();
        for item in &items {
            if !ids.insert(item.id().clone()) {
                return Err(ConfigError::new(format!("Duplicate item id: {}", item.id())));
            }
        }
        info!(count = items.len(), "Content catalog ready");
        Ok(Self { items })
    }

    /// Loads a catalog from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed (including
    /// out-of-range difficulties), or contains duplicate ids.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading content catalog");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read catalog: {}", e)))?;
        let catalog: CatalogFile = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse catalog: {}", e)))?;
        if catalog.items.is_empty() {
            warn!("Catalog contains no items");
        }
        Self::new(catalog.items)
    }

    /// Returns every item in the catalog.
    pub fn items(&self) -> &[Item] {
        &self.items
    }
}

#[async_trait]
impl ContentStore for CatalogContentStore {
    #[instrument(skip(self), fields(min = %min, max = %max))]
    async fn fetch_items(
        &self,
        min: Difficulty,
        max: Difficulty,
        limit: usize,
    ) -> Result<Vec<Item>, BackendError> {
        let items: Vec<Item> = self
            .items
            .iter()
            .filter(|item| min <= *item.difficulty() && *item.difficulty() <= max)
            .take(limit)
            .cloned()
            .collect();
        debug!(count = items.len(), "Catalog items fetched");
        Ok(items)
    }
}

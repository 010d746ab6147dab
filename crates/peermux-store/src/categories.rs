//! Persistence for the unified category set.

use std::path::PathBuf;

use peermux_core::{Category, DEFAULT_CATEGORY};
use serde::{Deserialize, Serialize};

use crate::atomic;
use crate::error::StoreResult;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CategoriesDoc {
    #[serde(default)]
    categories: Vec<Category>,
}

/// File-backed category definitions.
///
/// The store guarantees the `Default` category is always present in the
/// loaded set, regardless of what the document on disk contains.
#[derive(Debug, Clone)]
pub struct CategoryStore {
    path: PathBuf,
}

impl CategoryStore {
    /// Construct a store rooted at the provided file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load all categories; a missing file yields just `Default`.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing document cannot be read or parsed.
    pub fn load(&self) -> StoreResult<Vec<Category>> {
        let doc: CategoriesDoc = atomic::read_json(&self.path)?.unwrap_or_default();
        let mut categories = doc.categories;
        if !categories.iter().any(|c| c.name == DEFAULT_CATEGORY) {
            categories.insert(0, Category::default_category());
        }
        Ok(categories)
    }

    /// Persist the full category set atomically.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be written.
    pub fn save(&self, categories: &[Category]) -> StoreResult<()> {
        let doc = CategoriesDoc {
            categories: categories.to_vec(),
        };
        atomic::write_json(&self.path, &doc)
    }
}

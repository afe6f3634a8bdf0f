use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{Category, CategoryId, CategoryRef};

/// Resolves a category id to the snapshot an RFQ stores.
///
/// Returning `None` means the id is unknown; callers treat that as invalid input.
pub trait CategoryLookup: Send + Sync {
    fn resolve_category(&self, id: &CategoryId) -> Option<CategoryRef>;
}

impl<L> CategoryLookup for Arc<L>
where
    L: CategoryLookup + ?Sized,
{
    fn resolve_category(&self, id: &CategoryId) -> Option<CategoryRef> {
        (**self).resolve_category(id)
    }
}

/// Thread-safe in-memory category catalog.
#[derive(Debug, Default)]
pub struct InMemoryCategoryCatalog {
    inner: RwLock<HashMap<CategoryId, Category>>,
}

impl InMemoryCategoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(categories: impl IntoIterator<Item = Category>) -> Self {
        let catalog = Self::new();
        for category in categories {
            catalog.insert(category);
        }
        catalog
    }

    /// Insert or replace a category.
    pub fn insert(&self, category: Category) {
        // A poisoned lock leaves the map as it was; writes are single inserts.
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(category.id.clone(), category);
    }

    pub fn get(&self, id: &CategoryId) -> Option<Category> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(id).cloned()
    }

    /// All categories, ordered by name.
    pub fn list(&self) -> Vec<Category> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<Category> = map.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CategoryLookup for InMemoryCategoryCatalog {
    fn resolve_category(&self, id: &CategoryId) -> Option<CategoryRef> {
        self.get(id).map(|c| c.to_ref())
    }
}

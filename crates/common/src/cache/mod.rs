//! In-process memoization for catalog lookups
//!
//! The cache is constructed once at startup and injected into the catalog
//! client; it is append-only for the lifetime of the run and caches empty
//! results too, so a permanently-absent key is never re-fetched. A
//! `disabled()` instance substitutes as a no-op in tests.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::metrics::record_cache;
use crate::models::BookRecord;

/// Lookup namespaces sharing the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    BooksByAuthor,
    BookByUuid,
    BooksByTag,
    BooksByCategory,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::BooksByAuthor => "books_by_author",
            CacheKind::BookByUuid => "book_by_uuid",
            CacheKind::BooksByTag => "books_by_tag",
            CacheKind::BooksByCategory => "books_by_category",
        }
    }
}

/// Process-scoped memo cache for catalog lookups
pub struct CatalogCache {
    enabled: bool,
    entries: RwLock<HashMap<(CacheKind, String), Vec<BookRecord>>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self {
            enabled: true,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A cache that never hits; every lookup goes upstream
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a memoized result; `Some(vec![])` is a cached empty result,
    /// `None` is a miss.
    pub async fn get(&self, kind: CacheKind, key: &str) -> Option<Vec<BookRecord>> {
        if !self.enabled {
            return None;
        }
        let entries = self.entries.read().await;
        let value = entries.get(&(kind, key.to_string())).cloned();
        record_cache(value.is_some(), kind.as_str());
        if value.is_some() {
            debug!(cache = kind.as_str(), key, "Cache hit");
        }
        value
    }

    /// Memoize a result; the first writer for a key wins.
    pub async fn insert(&self, kind: CacheKind, key: &str, value: Vec<BookRecord>) {
        if !self.enabled {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.entry((kind, key.to_string())).or_insert(value);
    }
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new()
    }
}

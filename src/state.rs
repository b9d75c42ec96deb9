use crate::cache::BoundedQueryCache;
use crate::config::CACHE_CAPACITY;
use crate::search::compose_query;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// State shared by the request path and the query worker.
///
/// One lock covers the pending query slot and the cache. Every method holds
/// it for a single operation only, never across a network call.
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<Inner>,
    forum_scope: String,
}

#[derive(Debug)]
struct Inner {
    pending_query: Option<String>,
    cache: BoundedQueryCache,
}

impl SharedState {
    pub fn new(forum_scope: impl Into<String>) -> Self {
        Self::with_capacity(forum_scope, CACHE_CAPACITY)
    }

    pub fn with_capacity(forum_scope: impl Into<String>, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending_query: None,
                cache: BoundedQueryCache::new(capacity),
            }),
            forum_scope: forum_scope.into(),
        }
    }

    // Each critical section is one slot or cache operation, so the data is
    // still consistent after a panic elsewhere.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Turn extracted keywords into a forum-scoped query and make it the
    /// pending one, replacing anything not yet picked up.
    pub fn submit_query(&self, keywords: &[String]) -> Option<String> {
        let query = compose_query(keywords, &self.forum_scope)?;
        info!("Queued search query: {}", query);
        self.set_pending_query(query.clone());
        Some(query)
    }

    pub fn set_pending_query(&self, query: String) {
        self.lock().pending_query = Some(query);
    }

    pub fn pending_query(&self) -> Option<String> {
        self.lock().pending_query.clone()
    }

    /// Clear the slot if it still holds `query`. A newer query written in
    /// the meantime stays pending.
    pub fn clear_pending_query(&self, query: &str) -> bool {
        let mut inner = self.lock();
        if inner.pending_query.as_deref() == Some(query) {
            inner.pending_query = None;
            true
        } else {
            debug!("Pending query replaced while searching, keeping it");
            false
        }
    }

    /// Most recently used cached pages, most recent first.
    pub fn recent_context(&self, max_entries: usize) -> Vec<String> {
        self.lock().cache.recent_values(max_entries)
    }

    pub fn cached_urls(&self) -> Vec<String> {
        self.lock().cache.urls()
    }

    /// Promote `url` if cached. Returns whether it was.
    pub fn touch_if_cached(&self, url: &str) -> bool {
        let mut inner = self.lock();
        if inner.cache.has(url) {
            inner.cache.touch(url);
            true
        } else {
            false
        }
    }

    pub fn store(&self, url: String, content: String) {
        self.lock().cache.put(url, content);
    }
}

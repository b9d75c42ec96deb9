use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::debug;

/// Fixed-capacity URL -> extracted text map ordered by recency.
///
/// Not synchronized on its own; [`crate::state::SharedState`] owns it behind
/// the lock shared with the pending query.
#[derive(Debug)]
pub struct BoundedQueryCache {
    entries: LruCache<String, String>,
}

impl BoundedQueryCache {
    /// A capacity of zero is rounded up to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn has(&self, url: &str) -> bool {
        self.entries.contains(url)
    }

    /// Move an existing entry to the most-recent position.
    pub fn touch(&mut self, url: &str) {
        self.entries.promote(url);
    }

    /// Insert at the most-recent position, evicting the least-recently-used
    /// entry when over capacity. Returns the evicted URL.
    pub fn put(&mut self, url: String, content: String) -> Option<String> {
        match self.entries.push(url, content) {
            Some((old_url, _)) if !self.entries.contains(&old_url) => {
                debug!("Evicted {} from query cache", old_url);
                Some(old_url)
            }
            _ => None,
        }
    }

    /// Up to `n` values, most recent first.
    pub fn recent_values(&self, n: usize) -> Vec<String> {
        self.entries.iter().take(n).map(|(_, v)| v.clone()).collect()
    }

    /// Cached URLs, most recent first.
    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

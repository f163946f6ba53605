use crate::document::{Document, DocumentFormat};
use crate::error::Result;
use crate::fetch::{Fetcher, RetryPolicy, request_retry};
use crate::store::DocumentStore;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Write-once document cache in front of a fetcher, with a persistent set of
/// IDs that are known not to resolve.
pub struct FetchCache<F, S> {
    fetcher: F,
    store: S,
    policy: RetryPolicy,
    failures: Mutex<HashSet<String>>,
    dirty: AtomicBool,
    requests: AtomicUsize,
}

impl<F: Fetcher, S: DocumentStore> FetchCache<F, S> {
    /// Open the cache, loading the failure set recorded by earlier sessions.
    pub fn new(fetcher: F, store: S, policy: RetryPolicy) -> Result<Self> {
        let failures = store.load_failures()?;
        if !failures.is_empty() {
            debug!("Loaded {} known failures", failures.len());
        }
        Ok(Self {
            fetcher,
            store,
            policy,
            failures: Mutex::new(failures),
            dirty: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of network round trips issued through this cache, retries
    /// included as one.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn is_failed(&self, id: &str) -> bool {
        self.failures
            .lock()
            .map(|f| f.contains(id))
            .unwrap_or(false)
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().map(|f| f.len()).unwrap_or(0)
    }

    fn mark_failed(&self, id: &str) {
        if let Ok(mut failures) = self.failures.lock()
            && failures.insert(id.to_string())
        {
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    /// Cached document for `id`, building the URL and fetching only on a
    /// miss. `None` when the ID is a known failure, its cached entry no
    /// longer decodes, or the fetch does not yield a usable document.
    pub async fn fetch(
        &self,
        id: &str,
        format: DocumentFormat,
        url: impl FnOnce() -> String,
    ) -> Option<Document> {
        if self.is_failed(id) {
            debug!("{} is a known failure, skipping", id);
            return None;
        }

        match self.store.get(id, format) {
            Ok(Some(raw)) => match Document::parse(&raw) {
                Ok(doc) => {
                    debug!("Cache hit for {}", id);
                    return Some(doc);
                }
                Err(e) => {
                    // the store is write-once, so a refetch could never replace it
                    warn!("Cached {} is unreadable, marking it failed: {}", id, e);
                    self.mark_failed(id);
                    return None;
                }
            },
            Ok(None) => {}
            Err(e) => warn!("Cache lookup for {} failed: {}", id, e),
        }

        let url = url();
        self.requests.fetch_add(1, Ordering::Relaxed);
        let Some(raw) = request_retry(&self.fetcher, &url, self.policy).await else {
            warn!("No response for {}", id);
            self.mark_failed(id);
            return None;
        };

        match Document::parse(&raw) {
            Ok(doc) if doc.format() == format => {
                self.persist(id, &doc);
                Some(doc)
            }
            Ok(doc) => {
                warn!(
                    "{} answered {} where {} was expected",
                    id,
                    doc.format().as_str(),
                    format.as_str()
                );
                self.mark_failed(id);
                None
            }
            Err(e) => {
                warn!("Could not decode response for {}: {}", id, e);
                self.mark_failed(id);
                None
            }
        }
    }

    fn persist(&self, id: &str, doc: &Document) {
        let stored = doc
            .encode()
            .and_then(|bytes| self.store.put(id, doc.format(), &bytes));
        if let Err(e) = stored {
            warn!("Could not cache {}: {}", id, e);
        }
    }

    /// Location lookups are neither cached nor failure-tracked.
    pub async fn fetch_by_location(&self, url: &str) -> Option<Document> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let raw = request_retry(&self.fetcher, url, self.policy).await?;
        match Document::parse(&raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Could not decode location response from {}: {}", url, e);
                None
            }
        }
    }

    /// Write the failure set back to the store if it grew since the last
    /// call.
    pub fn persist_failures(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        let snapshot = match self.failures.lock() {
            Ok(f) => f.clone(),
            Err(_) => return Ok(()),
        };
        if let Err(e) = self.store.save_failures(&snapshot) {
            self.dirty.store(true, Ordering::Relaxed);
            return Err(e);
        }
        debug!("Persisted {} failures", snapshot.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Canned, MemoryFetcher};
    use crate::store::{FsStore, MemoryStore};
    use std::time::Duration;
    use tempfile::TempDir;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            base_timeout: Duration::from_millis(1),
            retries: 2,
        }
    }

    #[tokio::test]
    async fn test_second_fetch_hits_cache() {
        let fetcher = MemoryFetcher::new().with_body("mem://p1", "{\"id\":\"p1\"}");
        let cache = FetchCache::new(fetcher, MemoryStore::new(), quick_policy()).unwrap();

        let first = cache.fetch("p1", DocumentFormat::Json, || "mem://p1".into()).await;
        let second = cache.fetch("p1", DocumentFormat::Json, || "mem://p1".into()).await;

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(cache.fetcher().call_count("mem://p1"), 1);
        assert_eq!(cache.request_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_short_circuits() {
        let cache = FetchCache::new(MemoryFetcher::new(), MemoryStore::new(), quick_policy()).unwrap();

        assert!(cache.fetch("gone", DocumentFormat::Json, || "mem://gone".into()).await.is_none());
        assert!(cache.is_failed("gone"));
        assert!(cache.fetch("gone", DocumentFormat::Json, || "mem://gone".into()).await.is_none());
        assert_eq!(cache.fetcher().call_count("mem://gone"), 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_a_failure() {
        let fetcher = MemoryFetcher::new().with_body("mem://bad", "<html>oops");
        let cache = FetchCache::new(fetcher, MemoryStore::new(), quick_policy()).unwrap();
        assert!(cache.fetch("bad", DocumentFormat::Json, || "mem://bad".into()).await.is_none());
        assert!(cache.is_failed("bad"));
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_recorded() {
        let fetcher = MemoryFetcher::new();
        fetcher.push("mem://flaky", Canned::NetworkError);
        let cache = FetchCache::new(fetcher, MemoryStore::new(), quick_policy()).unwrap();

        assert!(cache.fetch("flaky", DocumentFormat::Json, || "mem://flaky".into()).await.is_none());
        assert_eq!(cache.fetcher().call_count("mem://flaky"), 2);
        assert_eq!(cache.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_failures_persist_across_sessions() {
        let dir = TempDir::new().unwrap();
        {
            let cache = FetchCache::new(
                MemoryFetcher::new(),
                FsStore::new(dir.path()).unwrap(),
                quick_policy(),
            )
            .unwrap();
            assert!(cache.fetch("x", DocumentFormat::Json, || "mem://x".into()).await.is_none());
            cache.persist_failures().unwrap();
        }

        // the id resolves now, but the second session must not ask again
        let fetcher = MemoryFetcher::new().with_body("mem://x", "{}");
        let cache = FetchCache::new(fetcher, FsStore::new(dir.path()).unwrap(), quick_policy()).unwrap();
        assert!(cache.fetch("x", DocumentFormat::Json, || "mem://x".into()).await.is_none());
        assert!(cache.fetcher().calls().is_empty());
    }

    #[tokio::test]
    async fn test_cache_survives_sessions() {
        let dir = TempDir::new().unwrap();
        {
            let fetcher = MemoryFetcher::new().with_body("mem://y", "cb({\"a\":1})");
            let cache = FetchCache::new(fetcher, FsStore::new(dir.path()).unwrap(), quick_policy()).unwrap();
            assert!(cache.fetch("y", DocumentFormat::Json, || "mem://y".into()).await.is_some());
        }
        let stored = std::fs::read_to_string(dir.path().join("y.json")).unwrap();
        assert_eq!(stored, "{\"a\":1}");

        let cache = FetchCache::new(MemoryFetcher::new(), FsStore::new(dir.path()).unwrap(), quick_policy()).unwrap();
        let doc = cache.fetch("y", DocumentFormat::Json, || "mem://y".into()).await.unwrap();
        assert_eq!(doc.as_json().unwrap()["a"], 1);
        assert_eq!(cache.request_count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_is_not_refetched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("p.json"), "garbage").unwrap();
        let fetcher = MemoryFetcher::new().with_body("mem://p", "{\"id\":\"p\"}");
        let cache = FetchCache::new(fetcher, FsStore::new(dir.path()).unwrap(), quick_policy()).unwrap();

        for _ in 0..3 {
            assert!(cache.fetch("p", DocumentFormat::Json, || "mem://p".into()).await.is_none());
        }
        assert!(cache.fetcher().calls().is_empty());
        assert_eq!(cache.request_count(), 0);
        assert!(cache.is_failed("p"));

        cache.persist_failures().unwrap();
        let reopened = FsStore::new(dir.path()).unwrap();
        assert!(reopened.load_failures().unwrap().contains("p"));
    }

    #[tokio::test]
    async fn test_location_lookups_are_not_cached() {
        let fetcher = MemoryFetcher::new().with_body("mem://near", "{\"id\":\"n\"}");
        let cache = FetchCache::new(fetcher, MemoryStore::new(), quick_policy()).unwrap();
        assert!(cache.fetch_by_location("mem://near").await.is_some());
        assert!(cache.fetch_by_location("mem://near").await.is_some());
        assert!(cache.fetch_by_location("mem://far").await.is_none());
        assert_eq!(cache.fetcher().call_count("mem://near"), 2);
        assert_eq!(cache.failure_count(), 0);
        assert!(cache.store().is_empty());
    }
}

//! Fingerprint-keyed artifact cache with single-flight computation.
//!
//! The index maps fingerprints to derived-artifact references and is the one
//! piece of mutable shared state touched by multiple workers in-process. The
//! mutex guards map operations only — it is never held across an await, and
//! in particular never across the compute future or any network call.
//!
//! Single-flight: the first caller for a key becomes the winner and runs the
//! computation; concurrent callers for the same key subscribe to the
//! winner's outcome through a watch channel and observe the same artifact or
//! the same classified error. A failed computation releases the key, so the
//! next request gets a fresh attempt — failure never poisons a fingerprint.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use lru::LruCache;
use pixelmill_core::models::DerivedArtifact;
use pixelmill_core::{FingerprintKey, TransformError};
use tokio::sync::watch;

type ComputeResult = Result<DerivedArtifact, TransformError>;
type ResultReceiver = watch::Receiver<Option<ComputeResult>>;

#[derive(Debug, Clone, Copy)]
pub struct ArtifactCacheConfig {
    pub max_entries: usize,
    pub max_bytes: u64,
}

impl Default for ArtifactCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            max_bytes: 512 * 1024 * 1024,
        }
    }
}

struct CacheInner {
    entries: LruCache<FingerprintKey, DerivedArtifact>,
    total_bytes: u64,
    in_flight: HashMap<FingerprintKey, ResultReceiver>,
}

pub struct ArtifactCache {
    config: ArtifactCacheConfig,
    inner: Mutex<CacheInner>,
}

enum Role {
    Hit(DerivedArtifact),
    Waiter(ResultReceiver),
    Winner(watch::Sender<Option<ComputeResult>>),
}

impl ArtifactCache {
    pub fn new(config: ArtifactCacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Look up a cached artifact reference, promoting it to most recent.
    pub fn lookup(&self, key: &FingerprintKey) -> Option<DerivedArtifact> {
        let mut inner = self.inner.lock().expect("artifact cache mutex poisoned");
        inner.entries.get(key).cloned()
    }

    /// Insert an artifact reference directly, e.g. when re-warming from the
    /// durable artifact store.
    pub fn insert(&self, key: FingerprintKey, artifact: DerivedArtifact) {
        let mut inner = self.inner.lock().expect("artifact cache mutex poisoned");
        Self::insert_locked(&mut inner, &self.config, key, artifact);
    }

    /// Fetch the artifact for `key`, computing it at most once process-wide.
    ///
    /// All concurrent callers for the same key receive the winner's outcome.
    /// On success the entry is cached; `compute` must persist the artifact
    /// bytes through the storage collaborator before returning, so an entry
    /// is never marked ready ahead of its bytes.
    pub async fn get_or_compute<F, Fut>(&self, key: FingerprintKey, compute: F) -> ComputeResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ComputeResult>,
    {
        let mut compute = Some(compute);

        loop {
            let role = {
                let mut inner = self.inner.lock().expect("artifact cache mutex poisoned");
                if let Some(artifact) = inner.entries.get(&key) {
                    Role::Hit(artifact.clone())
                } else if let Some(rx) = inner.in_flight.get(&key) {
                    Role::Waiter(rx.clone())
                } else {
                    let (tx, rx) = watch::channel(None);
                    inner.in_flight.insert(key.clone(), rx);
                    Role::Winner(tx)
                }
            };

            match role {
                Role::Hit(artifact) => {
                    tracing::debug!(fingerprint = %key, "Artifact cache hit");
                    return Ok(artifact);
                }
                Role::Waiter(mut rx) => {
                    tracing::debug!(fingerprint = %key, "Waiting on in-flight computation");
                    if rx.changed().await.is_err() {
                        // The winner vanished without publishing (e.g. its task
                        // was aborted). Clear the stale slot and start over.
                        let mut inner =
                            self.inner.lock().expect("artifact cache mutex poisoned");
                        inner.in_flight.remove(&key);
                        continue;
                    }
                    let outcome = rx.borrow().clone();
                    match outcome {
                        Some(result) => return result,
                        None => continue,
                    }
                }
                Role::Winner(tx) => {
                    let compute = compute
                        .take()
                        .expect("winner role is reached at most once per call");
                    tracing::debug!(fingerprint = %key, "Computing artifact");

                    let result = compute().await;

                    {
                        let mut inner =
                            self.inner.lock().expect("artifact cache mutex poisoned");
                        inner.in_flight.remove(&key);
                        if let Ok(artifact) = &result {
                            Self::insert_locked(
                                &mut inner,
                                &self.config,
                                key.clone(),
                                artifact.clone(),
                            );
                        }
                    }

                    // Publish to waiters after the key is released/ready.
                    let _ = tx.send(Some(result.clone()));
                    return result;
                }
            }
        }
    }

    /// Drop a cached entry (the durable record is unaffected).
    pub fn remove(&self, key: &FingerprintKey) {
        let mut inner = self.inner.lock().expect("artifact cache mutex poisoned");
        if let Some(evicted) = inner.entries.pop(key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(entry_bytes(&evicted));
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("artifact cache mutex poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner
            .lock()
            .expect("artifact cache mutex poisoned")
            .total_bytes
    }

    fn insert_locked(
        inner: &mut CacheInner,
        config: &ArtifactCacheConfig,
        key: FingerprintKey,
        artifact: DerivedArtifact,
    ) {
        let added = entry_bytes(&artifact);
        if let Some(previous) = inner.entries.put(key, artifact) {
            inner.total_bytes = inner.total_bytes.saturating_sub(entry_bytes(&previous));
        }
        inner.total_bytes += added;

        // Evict least-recently-used entries until both bounds hold. Only
        // derived entries live here; sources are never touched, and an
        // evicted artifact is recomputable on demand.
        while inner.entries.len() > config.max_entries || inner.total_bytes > config.max_bytes {
            match inner.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(entry_bytes(&evicted));
                    tracing::debug!(fingerprint = %evicted_key, "Evicted artifact cache entry");
                }
                None => break,
            }
        }
    }
}

fn entry_bytes(artifact: &DerivedArtifact) -> u64 {
    artifact.byte_len.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn key(name: &str) -> FingerprintKey {
        FingerprintKey::from_hex(name.to_string())
    }

    fn artifact(byte_len: i64) -> DerivedArtifact {
        DerivedArtifact {
            id: Uuid::new_v4(),
            fingerprint: "f".repeat(64),
            source_image_id: Uuid::new_v4(),
            storage_key: "derived/test.png".to_string(),
            byte_len,
            width: 400,
            height: 300,
            content_type: "image/png".to_string(),
            created_at: Utc::now(),
        }
    }

    fn cache(max_entries: usize, max_bytes: u64) -> ArtifactCache {
        ArtifactCache::new(ArtifactCacheConfig {
            max_entries,
            max_bytes,
        })
    }

    #[tokio::test]
    async fn test_second_request_never_recomputes() {
        let cache = cache(16, u64::MAX);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let result = cache
                .get_or_compute(key("a"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(artifact(100))
                })
                .await;
            assert!(result.is_ok());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_computation() {
        let cache = Arc::new(cache(16, u64::MAX));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(key("shared"), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(artifact(100))
                    })
                    .await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            ids.push(result.id);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one computation");
        assert!(ids.windows(2).all(|w| w[0] == w[1]), "all callers share the winner's artifact");
    }

    #[tokio::test]
    async fn test_failure_shared_then_key_released() {
        let cache = Arc::new(cache(16, u64::MAX));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(key("failing"), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(TransformError::Storage("put timed out".into()))
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(TransformError::Storage(_))));
        }
        let failures = calls.load(Ordering::SeqCst);
        assert_eq!(failures, 1, "one computation shared by all waiters");

        // The key is not poisoned: the next request computes afresh.
        let calls_after = calls.clone();
        let result = cache
            .get_or_compute(key("failing"), move || async move {
                calls_after.fetch_add(1, Ordering::SeqCst);
                Ok(artifact(100))
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_eviction_by_entry_count() {
        let cache = cache(2, u64::MAX);
        for name in ["a", "b", "c"] {
            cache.insert(key(name), artifact(10));
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&key("a")).is_none(), "oldest entry evicted");
        assert!(cache.lookup(&key("b")).is_some());
        assert!(cache.lookup(&key("c")).is_some());
    }

    #[tokio::test]
    async fn test_eviction_by_total_bytes() {
        let cache = cache(100, 250);
        cache.insert(key("a"), artifact(100));
        cache.insert(key("b"), artifact(100));
        cache.insert(key("c"), artifact(100));

        assert!(cache.total_bytes() <= 250);
        assert!(cache.lookup(&key("a")).is_none());
    }

    #[tokio::test]
    async fn test_lookup_promotes_recency() {
        let cache = cache(2, u64::MAX);
        cache.insert(key("a"), artifact(10));
        cache.insert(key("b"), artifact(10));

        // Touch "a" so "b" becomes least recently used.
        assert!(cache.lookup(&key("a")).is_some());
        cache.insert(key("c"), artifact(10));

        assert!(cache.lookup(&key("a")).is_some());
        assert!(cache.lookup(&key("b")).is_none());
    }

    #[tokio::test]
    async fn test_remove_releases_bytes() {
        let cache = cache(16, u64::MAX);
        cache.insert(key("a"), artifact(128));
        assert_eq!(cache.total_bytes(), 128);

        cache.remove(&key("a"));
        assert_eq!(cache.total_bytes(), 0);
        assert!(cache.lookup(&key("a")).is_none());
    }
}

//! TTL cache for probe results
//!
//! Entries past their TTL behave as absent. Expiry is lazy on read and
//! eager in `sweep`, which the background sweeper calls.

use crate::extractor::models::ProbeResult;
use crate::store::{EntryStore, MemoryStore};
use crate::utils::config::CacheSettings;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CachedProbe {
    pub result: ProbeResult,
    pub inserted_at: Instant,
    pub expires_at: Instant,
}

impl CachedProbe {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache key for a URL: trimmed, lower-cased, without trailing slashes
pub fn normalize_key(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

pub struct ProbeCache {
    store: Arc<dyn EntryStore<CachedProbe>>,
    ttl: Duration,
    max_entries: usize,
}

impl ProbeCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), settings.ttl, settings.max_entries)
    }

    pub fn with_store(
        store: Arc<dyn EntryStore<CachedProbe>>,
        ttl: Duration,
        max_entries: usize,
    ) -> Self {
        Self {
            store,
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, url: &str) -> Option<ProbeResult> {
        let key = normalize_key(url);
        let entry = self.store.get(&key).await?;
        let now = Instant::now();

        if entry.is_expired(now) {
            debug!("Cache entry expired: {}", key);
            // A fresh result stored since the read must survive
            self.store
                .remove_if(&key, &move |e: &CachedProbe| e.is_expired(now))
                .await;
            return None;
        }

        Some(entry.result)
    }

    pub async fn put(&self, url: &str, result: ProbeResult) {
        let key = normalize_key(url);
        let now = Instant::now();

        self.store
            .put(
                &key,
                CachedProbe {
                    result,
                    inserted_at: now,
                    expires_at: now + self.ttl,
                },
            )
            .await;

        self.evict_overflow().await;
    }

    /// Drop the oldest entries once the cache is over capacity
    async fn evict_overflow(&self) {
        let len = self.store.len().await;
        if len <= self.max_entries {
            return;
        }

        let mut entries = self.store.entries().await;
        entries.sort_by_key(|(_, e)| e.inserted_at);
        for (key, _) in entries.into_iter().take(len - self.max_entries) {
            debug!("Evicting cache entry: {}", key);
            self.store.remove(&key).await;
        }
    }

    pub async fn invalidate(&self, url: &str) {
        self.store.remove(&normalize_key(url)).await;
    }

    /// Remove expired entries; returns how many were dropped
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        self.store.sweep(&move |e: &CachedProbe| e.is_expired(now)).await.len()
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }
}

//! Keyed storage behind the cache, registry and rate limiter
//!
//! Callers only see `EntryStore`; `MemoryStore` is the single-process
//! implementation. A shared external store can implement the same trait.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Atomic read-modify-write step; receives the current value, returns the new one
pub type Updater<V> = Box<dyn FnOnce(Option<V>) -> V + Send>;

/// Entry test used by `remove_if` and `sweep`
pub type Predicate<'p, V> = &'p (dyn for<'a> Fn(&'a V) -> bool + Sync);

#[async_trait]
pub trait EntryStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace; returns the previous value
    async fn put(&self, key: &str, value: V) -> Option<V>;

    async fn remove(&self, key: &str) -> Option<V>;

    /// Remove the entry under `key` only if it matches `predicate`, checked
    /// under the same lock as the removal
    async fn remove_if(&self, key: &str, predicate: Predicate<'_, V>) -> Option<V>;

    /// Apply `updater` atomically and return the stored result
    async fn update(&self, key: &str, updater: Updater<V>) -> V;

    /// Remove every entry matching `expired`; returns what was removed
    async fn sweep(&self, expired: Predicate<'_, V>) -> Vec<(String, V)>;

    async fn entries(&self) -> Vec<(String, V)>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Mutex-guarded in-process map
pub struct MemoryStore<V> {
    inner: Mutex<HashMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> EntryStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().await.get(key).cloned()
    }

    async fn put(&self, key: &str, value: V) -> Option<V> {
        self.inner.lock().await.insert(key.to_string(), value)
    }

    async fn remove(&self, key: &str) -> Option<V> {
        self.inner.lock().await.remove(key)
    }

    async fn remove_if(&self, key: &str, predicate: Predicate<'_, V>) -> Option<V> {
        let mut map = self.inner.lock().await;
        if map.get(key).is_some_and(|v| predicate(v)) {
            return map.remove(key);
        }
        None
    }

    async fn update(&self, key: &str, updater: Updater<V>) -> V {
        let mut map = self.inner.lock().await;
        let next = updater(map.remove(key));
        map.insert(key.to_string(), next.clone());
        next
    }

    async fn sweep(&self, expired: Predicate<'_, V>) -> Vec<(String, V)> {
        let mut map = self.inner.lock().await;
        let doomed: Vec<String> = map
            .iter()
            .filter(|(_, v)| expired(*v))
            .map(|(k, _)| k.clone())
            .collect();

        doomed
            .into_iter()
            .filter_map(|k| map.remove(&k).map(|v| (k, v)))
            .collect()
    }

    async fn entries(&self) -> Vec<(String, V)> {
        self.inner
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_get_remove() {
        let store: MemoryStore<u32> = MemoryStore::new();
        assert!(store.is_empty().await);

        assert_eq!(store.put("a", 1).await, None);
        assert_eq!(store.put("a", 2).await, Some(1));
        assert_eq!(store.get("a").await, Some(2));
        assert_eq!(store.remove("a").await, Some(2));
        assert_eq!(store.get("a").await, None);
    }

    #[tokio::test]
    async fn test_sweep_returns_removed_entries() {
        let store: MemoryStore<u32> = MemoryStore::new();
        for (k, v) in [("a", 1), ("b", 5), ("c", 9)] {
            store.put(k, v).await;
        }

        let mut removed = store.sweep(&|v: &u32| *v > 4).await;
        removed.sort();

        assert_eq!(removed, vec![("b".to_string(), 5), ("c".to_string(), 9)]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_if_leaves_non_matching_entry() {
        let store: MemoryStore<u32> = MemoryStore::new();
        store.put("a", 3).await;

        assert_eq!(store.remove_if("a", &|v: &u32| *v > 4).await, None);
        assert_eq!(store.get("a").await, Some(3));

        assert_eq!(store.remove_if("a", &|v: &u32| *v == 3).await, Some(3));
        assert_eq!(store.get("a").await, None);
        assert_eq!(store.remove_if("missing", &|_: &u32| true).await, None);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let store: Arc<MemoryStore<u32>> = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update("counter", Box::new(|v: Option<u32>| v.unwrap_or(0) + 1))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("counter").await, Some(50));
    }
}

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Generic per-key async deduplicator.
///
/// Generalizes the double-checked-locking pattern a single-account OAuth
/// provider would use (one `Arc<RwLock<Credentials>>`, fast-path read then
/// slow-path write) to an arbitrary key space: each key gets its own lock,
/// so refreshing account A never blocks a concurrent refresh of account B.
pub struct SingleFlight<K> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> SingleFlight<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for `key`, creating it if this is the first caller to
    /// ever see this key. Holding the returned guard serializes callers for
    /// the same key; callers should re-check whatever freshness condition
    /// they're guarding once they hold it, since another caller may have
    /// already done the work while this one waited.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for SingleFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_for_same_key_serialize() {
        let sf: Arc<SingleFlight<String>> = Arc::new(SingleFlight::new());
        let counter = Arc::new(AtomicU32::new(0));
        let overlap = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sf = sf.clone();
            let counter = counter.clone();
            let overlap = overlap.clone();
            handles.push(tokio::spawn(async move {
                let _guard = sf.acquire("acct-1".to_string()).await;
                let before = counter.fetch_add(1, Ordering::SeqCst);
                if before > 0 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let sf: SingleFlight<String> = SingleFlight::new();
        let g1 = sf.acquire("a".to_string()).await;
        let acquired = tokio::time::timeout(Duration::from_millis(50), sf.acquire("b".to_string()))
            .await;
        assert!(acquired.is_ok());
        drop(g1);
    }
}

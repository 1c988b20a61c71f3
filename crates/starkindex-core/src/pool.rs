//! Pool cache — pending transactions already dispatched while unconfirmed.
//!
//! Entries are added after a pending transaction is dispatched and removed
//! when the same hash shows up in a confirmed block or is no longer pending,
//! so a transaction that leaves and re-enters the pool is dispatched again.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct PoolCache {
    processed: Mutex<HashSet<String>>,
}

impl PoolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, tx_hash: &str) -> bool {
        self.lock().contains(tx_hash)
    }

    /// Record a dispatched pending transaction.
    pub fn mark_processed(&self, tx_hash: impl Into<String>) {
        self.lock().insert(tx_hash.into());
    }

    /// Forget every hash in `confirmed`. Returns how many entries were removed.
    pub fn clear_confirmed<'a>(&self, confirmed: impl IntoIterator<Item = &'a str>) -> usize {
        let mut processed = self.lock();
        confirmed
            .into_iter()
            .filter(|hash| processed.remove(*hash))
            .count()
    }

    /// Forget every hash that is no longer in the node's pending pool
    /// (dropped, rejected, or confirmed while being dispatched). Returns how
    /// many entries were evicted.
    pub fn retain_pending(&self, pending: &HashSet<&str>) -> usize {
        let mut processed = self.lock();
        let before = processed.len();
        processed.retain(|hash| pending.contains(hash.as_str()));
        before - processed.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.processed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_clear() {
        let cache = PoolCache::new();
        cache.mark_processed("0x1");
        cache.mark_processed("0x2");
        assert!(cache.contains("0x1"));

        let removed = cache.clear_confirmed(["0x1", "0x9"]);
        assert_eq!(removed, 1);
        assert!(!cache.contains("0x1"));
        assert!(cache.contains("0x2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_leaving_the_pool_are_evicted() {
        let cache = PoolCache::new();
        for i in 0..1000 {
            cache.mark_processed(format!("0x{i:x}"));
        }

        let still_pending = HashSet::from(["0x1", "0x2", "0xfff"]);
        assert_eq!(cache.retain_pending(&still_pending), 998);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("0x1") && cache.contains("0x2"));

        assert_eq!(cache.retain_pending(&HashSet::new()), 2);
        assert!(cache.is_empty());
    }
}

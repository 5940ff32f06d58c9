//! Duplicate detection for webhook deliveries.
//!
//! Providers retry deliveries they believe failed, so the same event id can
//! arrive more than once. The cache remembers recently seen ids per
//! integration, bounded both by count and by age.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Store of recently processed webhook event ids.
pub trait DedupCache: Send + Sync {
    /// Atomically record `key`. Returns `true` when it was already present.
    fn check_and_insert(&self, key: &str) -> bool;

    /// Drop `key`, so a redelivery is processed again.
    fn forget(&self, key: &str);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct DedupState {
    /// Key -> insertion sequence number.
    seen: HashMap<String, u64>,
    /// Insertion order; may hold stale entries for forgotten keys.
    order: VecDeque<(String, u64, Instant)>,
    next_seq: u64,
}

impl DedupState {
    fn evict_front(&mut self) {
        if let Some((key, seq, _)) = self.order.pop_front() {
            if self.seen.get(&key) == Some(&seq) {
                self.seen.remove(&key);
            }
        }
    }

    fn prune_expired(&mut self, now: Instant, ttl: Duration) {
        while let Some((_, _, inserted)) = self.order.front() {
            if now.duration_since(*inserted) < ttl {
                break;
            }
            self.evict_front();
        }
    }
}

/// Process-local `DedupCache` with FIFO eviction and a time-to-live.
#[derive(Debug)]
pub struct InMemoryDedupCache {
    capacity: usize,
    ttl: Duration,
    state: Mutex<DedupState>,
}

impl InMemoryDedupCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            state: Mutex::new(DedupState::default()),
        }
    }
}

impl DedupCache for InMemoryDedupCache {
    fn check_and_insert(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune_expired(now, self.ttl);

        if state.seen.contains_key(key) {
            return true;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.seen.insert(key.to_string(), seq);
        state.order.push_back((key.to_string(), seq, now));
        while state.seen.len() > self.capacity || state.order.len() > self.capacity * 2 {
            state.evict_front();
        }
        false
    }

    fn forget(&self, key: &str) {
        self.state.lock().seen.remove(key);
    }

    fn len(&self) -> usize {
        self.state.lock().seen.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_second_insert_is_duplicate() {
        let cache = InMemoryDedupCache::new(10, Duration::from_secs(60));
        assert!(!cache.check_and_insert("shop:evt_1"));
        assert!(cache.check_and_insert("shop:evt_1"));
        assert!(!cache.check_and_insert("pay:evt_1"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_forget_allows_redelivery() {
        let cache = InMemoryDedupCache::new(10, Duration::from_secs(60));
        assert!(!cache.check_and_insert("evt"));
        cache.forget("evt");
        assert!(!cache.check_and_insert("evt"));
        assert!(cache.check_and_insert("evt"));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = InMemoryDedupCache::new(2, Duration::from_secs(60));
        cache.check_and_insert("a");
        cache.check_and_insert("b");
        cache.check_and_insert("c");
        assert_eq!(cache.len(), 2);
        assert!(!cache.check_and_insert("a"));
        assert!(cache.check_and_insert("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = InMemoryDedupCache::new(10, Duration::from_secs(30));
        cache.check_and_insert("evt");
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.check_and_insert("evt"));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.check_and_insert("evt"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_admit_one() {
        let cache = Arc::new(InMemoryDedupCache::new(100, Duration::from_secs(60)));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.check_and_insert("evt_race") })
            })
            .collect();

        let mut fresh = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
    }
}

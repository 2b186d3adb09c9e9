//! Memoized shuffled ordering of the active catalog.
//!
//! The home feed pages through one random permutation of every active
//! address. The permutation is built in full, then published by replacing a
//! single `Arc`, so readers see either the old or the new list and never a
//! partial one. Folder configuration changes clear it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;

use super::address::VideoAddress;

/// Process-scoped shuffle cache
#[derive(Debug, Default)]
pub struct ShuffleCache {
    current: RwLock<Option<Arc<Vec<VideoAddress>>>>,

    /// Bumped on every invalidation
    generation: AtomicU64,
}

impl ShuffleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current permutation, if one is published
    pub fn get(&self) -> Option<Arc<Vec<VideoAddress>>> {
        self.current.read().clone()
    }

    /// Generation to pass to [`publish`](Self::publish) for a build
    /// starting now
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Drop the current permutation
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.current.write() = None;
    }

    /// Shuffle `addresses` and publish the result.
    ///
    /// If the cache was invalidated since `built_at` the permutation is
    /// returned to the caller but not cached, since it may contain folders
    /// that are no longer active.
    pub fn publish(&self, built_at: u64, mut addresses: Vec<VideoAddress>) -> Arc<Vec<VideoAddress>> {
        fisher_yates(&mut addresses, &mut rand::thread_rng());
        let order = Arc::new(addresses);

        let mut slot = self.current.write();
        if self.generation.load(Ordering::SeqCst) == built_at {
            *slot = Some(order.clone());
        }
        order
    }
}

/// In-place Fisher–Yates shuffle
pub fn fisher_yates<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FolderId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn addresses(n: usize) -> Vec<VideoAddress> {
        (0..n)
            .map(|i| VideoAddress::new(FolderId::from_seq(0), format!("{:03}.mp4", i)))
            .collect()
    }

    #[test]
    fn test_fisher_yates_is_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut items: Vec<u32> = (0..100).collect();
        fisher_yates(&mut items, &mut rng);

        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
        assert_ne!(items, sorted);
    }

    #[test]
    fn test_fisher_yates_small_inputs() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut empty: Vec<u8> = vec![];
        fisher_yates(&mut empty, &mut rng);
        let mut one = vec![9];
        fisher_yates(&mut one, &mut rng);
        assert_eq!(one, vec![9]);
    }

    #[test]
    fn test_publish_then_get_is_stable() {
        let cache = ShuffleCache::new();
        assert!(cache.get().is_none());

        let published = cache.publish(cache.generation(), addresses(20));
        let first = cache.get().unwrap();
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&published, &first));
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_invalidate_clears() {
        let cache = ShuffleCache::new();
        cache.publish(cache.generation(), addresses(5));
        cache.invalidate();
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_stale_build_is_not_published() {
        let cache = ShuffleCache::new();
        let started = cache.generation();
        cache.invalidate();

        let order = cache.publish(started, addresses(5));
        assert_eq!(order.len(), 5);
        assert!(cache.get().is_none());
    }
}

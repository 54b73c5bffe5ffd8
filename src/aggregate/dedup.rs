use lru::LruCache;
use std::num::NonZeroUsize;

/// Hashes of lines already aggregated. Unbounded by default; with a window
/// only the most recently seen hashes are remembered.
pub struct SeenSet {
    cache: LruCache<u64, ()>,
}

impl SeenSet {
    pub fn new(window: Option<NonZeroUsize>) -> Self {
        let cache = match window {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self { cache }
    }

    /// Restore from hashes ordered least recently used first.
    pub fn from_hashes(window: Option<NonZeroUsize>, hashes: impl IntoIterator<Item = u64>) -> Self {
        let mut set = Self::new(window);
        for hash in hashes {
            set.cache.put(hash, ());
        }
        set
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.cache.contains(&hash)
    }

    /// Record `hash`; false if it was already present (it is then marked recent).
    pub fn insert(&mut self, hash: u64) -> bool {
        if self.cache.contains(&hash) {
            self.cache.promote(&hash);
            return false;
        }
        self.cache.put(hash, ());
        true
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Hashes ordered least recently used first, the order `from_hashes` expects.
    pub fn hashes_lru_first(&self) -> Vec<u64> {
        self.cache.iter().rev().map(|(hash, _)| *hash).collect()
    }
}

//! Block cache interface.
//!
//! The engine treats the cache as an opaque map from
//! `(table_id, block_offset, version_id)` to block bytes; its internal
//! organisation (sharding, eviction) is deliberately uninteresting here
//! and can be swapped out behind the [`BlockCache`] trait.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Cache key: table file number, block offset, and the reader's cache
/// generation (distinguishes reloads of the same table file).
pub type CacheKey = (u64, u64, u64);

/// Opaque shared map of cached block bytes.
pub trait BlockCache: Send + Sync {
    /// Looks up a block.
    fn get(&self, key: &CacheKey) -> Option<Arc<Vec<u8>>>;

    /// Inserts a block, possibly evicting older entries.
    fn insert(&self, key: CacheKey, block: Arc<Vec<u8>>);
}

/// Sharded FIFO cache with a byte budget per shard.
pub struct ShardedBlockCache {
    shards: Vec<Mutex<Shard>>,
    per_shard_capacity: usize,
}

struct Shard {
    map: HashMap<CacheKey, Arc<Vec<u8>>>,
    order: VecDeque<CacheKey>,
    bytes: usize,
}

const SHARD_COUNT: usize = 16;

impl ShardedBlockCache {
    /// A cache bounded at roughly `capacity_bytes` in total.
    pub fn new(capacity_bytes: usize) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| {
                Mutex::new(Shard {
                    map: HashMap::new(),
                    order: VecDeque::new(),
                    bytes: 0,
                })
            })
            .collect();
        Self {
            shards,
            per_shard_capacity: (capacity_bytes / SHARD_COUNT).max(1),
        }
    }

    fn shard(&self, key: &CacheKey) -> &Mutex<Shard> {
        let mix = key
            .0
            .wrapping_mul(0x9e37_79b9_7f4a_7c15)
            .wrapping_add(key.1)
            .wrapping_add(key.2);
        &self.shards[(mix as usize) % SHARD_COUNT]
    }
}

impl BlockCache for ShardedBlockCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<Vec<u8>>> {
        let shard = self.shard(key).lock().unwrap_or_else(|e| e.into_inner());
        shard.map.get(key).cloned()
    }

    fn insert(&self, key: CacheKey, block: Arc<Vec<u8>>) {
        let mut shard = self.shard(&key).lock().unwrap_or_else(|e| e.into_inner());
        if shard.map.contains_key(&key) {
            return;
        }
        shard.bytes += block.len();
        shard.map.insert(key, block);
        shard.order.push_back(key);
        while shard.bytes > self.per_shard_capacity && shard.order.len() > 1 {
            if let Some(oldest) = shard.order.pop_front() {
                if let Some(evicted) = shard.map.remove(&oldest) {
                    shard.bytes -= evicted.len();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_insert() {
        let cache = ShardedBlockCache::new(1 << 20);
        let key = (1, 0, 0);
        assert!(cache.get(&key).is_none());
        cache.insert(key, Arc::new(vec![1, 2, 3]));
        assert_eq!(cache.get(&key).as_deref(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn distinct_generations_do_not_collide() {
        let cache = ShardedBlockCache::new(1 << 20);
        cache.insert((1, 0, 1), Arc::new(vec![1]));
        cache.insert((1, 0, 2), Arc::new(vec![2]));
        assert_eq!(cache.get(&(1, 0, 1)).as_deref(), Some(&vec![1]));
        assert_eq!(cache.get(&(1, 0, 2)).as_deref(), Some(&vec![2]));
    }

    #[test]
    fn eviction_keeps_budget_bounded() {
        let cache = ShardedBlockCache::new(16 * 1024);
        for i in 0..1024u64 {
            cache.insert((i, 0, 0), Arc::new(vec![0u8; 1024]));
        }
        let resident = (0..1024u64).filter(|i| cache.get(&(*i, 0, 0)).is_some()).count();
        assert!(resident < 1024, "nothing was evicted");
        // The newest entry must survive.
        assert!(cache.get(&(1023, 0, 0)).is_some());
    }
}

use crate::cache::CacheBackend;
use crate::error::BrowseResult;
use lru::LruCache;
use parking_lot::Mutex;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

const CACHE_SHARDS: usize = 16;

struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Shard = Mutex<LruCache<String, Entry>>;

/// In-process cache backend: sharded LRU with per-entry expiry.
pub struct MemoryCache {
    shards: [Shard; CACHE_SHARDS],
}

impl MemoryCache {
    /// `capacity` is the total entry budget, split evenly across shards.
    pub fn new(capacity: usize) -> Self {
        let per_shard =
            NonZeroUsize::new(capacity.div_ceil(CACHE_SHARDS)).unwrap_or(NonZeroUsize::MIN);
        Self {
            shards: std::array::from_fn(|_| Mutex::new(LruCache::new(per_shard))),
        }
    }

    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % CACHE_SHARDS]
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> BrowseResult<Option<Vec<u8>>> {
        let mut shard = self.shard(key).lock();
        let expired = match shard.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(Instant::now()) => true,
            Some(entry) => return Ok(Some(entry.bytes.clone())),
        };
        if expired {
            shard.pop(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> BrowseResult<()> {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.shard(key).lock().put(
            key.to_string(),
            Entry {
                bytes: value,
                expires_at,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> BrowseResult<()> {
        self.shard(key).lock().pop(key);
        Ok(())
    }
}

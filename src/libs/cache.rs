//! Shared cache of decoded blocks.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::libs::config::StoreConfig;
use crate::libs::custom::RegionPair;
use crate::libs::matrix::Block;
use crate::libs::norm::NormalizationType;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    /// Dataset, chromosome pair and zoom of the owning store
    pub store: Arc<str>,
    pub block: i64,
    pub norm: NormalizationType,
    /// Region mapping of a stitched block
    pub region: Option<RegionPair>,
}

impl BlockKey {
    pub fn new(store: Arc<str>, block: i64, norm: NormalizationType) -> Self {
        BlockKey {
            store,
            block,
            norm,
            region: None,
        }
    }

    pub fn with_region(mut self, region: RegionPair) -> Self {
        self.region = Some(region);
        self
    }
}

pub trait BlockCache: Send + Sync {
    fn get(&self, key: &BlockKey) -> Option<Arc<Block>>;
    fn put(&self, key: BlockKey, block: Arc<Block>);
    fn len(&self) -> usize;
    fn clear(&self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Entry-count bounded LRU
pub struct LruBlockCache {
    inner: Mutex<LruCache<BlockKey, Arc<Block>>>,
}

impl LruBlockCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        LruBlockCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<BlockKey, Arc<Block>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockCache for LruBlockCache {
    fn get(&self, key: &BlockKey) -> Option<Arc<Block>> {
        self.lock().get(key).cloned()
    }

    fn put(&self, key: BlockKey, block: Arc<Block>) {
        self.lock().put(key, block);
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

/// Never stores anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl BlockCache for NoCache {
    fn get(&self, _key: &BlockKey) -> Option<Arc<Block>> {
        None
    }

    fn put(&self, _key: BlockKey, _block: Arc<Block>) {}

    fn len(&self) -> usize {
        0
    }

    fn clear(&self) {}
}

/// Cache matching `config`
pub fn shared_cache(config: &StoreConfig) -> Arc<dyn BlockCache> {
    if config.use_cache {
        Arc::new(LruBlockCache::new(config.cache_capacity))
    } else {
        Arc::new(NoCache)
    }
}

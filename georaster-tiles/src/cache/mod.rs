//! Rendered tile cache.
//!
//! Painted tiles are kept in a `moka::sync::Cache` keyed by tile address
//! and resolution, weighted by their pixel bytes so the capacity bounds
//! memory rather than entry count. Lookups are synchronous so a hit can be
//! answered before any tile work is scheduled.
//!
//! # Generations
//!
//! Clearing the cache bumps a generation counter. A tile records the
//! generation it was started in, and [`TileRenderCache::put`] refuses tiles
//! from an older generation: a tile that began colouring before a flush
//! would otherwise repopulate the cache with stale colours.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache as MokaCache;
use tracing::{debug, warn};

use crate::coord::TileCoord;
use crate::render::RenderedTile;

/// Cache key: a tile at one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub coord: TileCoord,
    pub resolution: u32,
}

impl TileCacheKey {
    pub fn new(coord: TileCoord, resolution: u32) -> Self {
        Self { coord, resolution }
    }
}

impl fmt::Display for TileCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.coord, self.resolution)
    }
}

/// In-memory cache of painted tiles.
pub struct TileRenderCache {
    cache: MokaCache<TileCacheKey, Arc<RenderedTile>>,
    generation: AtomicU64,
    max_size_bytes: u64,
}

impl TileRenderCache {
    /// Create a cache holding up to `max_size_bytes` of pixel data.
    pub fn new(max_size_bytes: u64) -> Self {
        let cache = MokaCache::builder()
            .weigher(|_key: &TileCacheKey, tile: &Arc<RenderedTile>| -> u32 {
                tile.size_bytes().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size_bytes)
            .build();

        Self {
            cache,
            generation: AtomicU64::new(0),
            max_size_bytes,
        }
    }

    /// Current generation. New tiles should be stamped with it.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &TileCacheKey) -> Option<Arc<RenderedTile>> {
        self.cache.get(key)
    }

    /// Store a tile under its own address and resolution.
    ///
    /// Returns false, storing nothing, when the tile is from an older
    /// generation.
    pub fn put(&self, tile: Arc<RenderedTile>) -> bool {
        let key = TileCacheKey::new(tile.coord, tile.resolution);
        let stamped = tile.generation;
        if stamped < self.generation() {
            warn!(tile = %key, generation = stamped, "Refusing stale tile");
            return false;
        }

        self.cache.insert(key, tile);

        // A flush may have landed during the insert.
        if stamped < self.generation() {
            self.cache.invalidate(&key);
            warn!(tile = %key, generation = stamped, "Refusing stale tile");
            return false;
        }
        true
    }

    /// Drop every entry and start a new generation.
    ///
    /// Returns the new generation.
    pub fn clear(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.cache.invalidate_all();
        debug!(generation, "Cleared tile render cache");
        generation
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn size_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Apply pending evictions and invalidations.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}

impl fmt::Debug for TileRenderCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileRenderCache")
            .field("generation", &self.generation())
            .field("entries", &self.entry_count())
            .field("max_size_bytes", &self.max_size_bytes)
            .finish()
    }
}

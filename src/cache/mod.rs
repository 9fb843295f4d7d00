pub mod disk;
pub mod key;

pub use disk::DiskTileCache;
pub use key::{material_tile_key, normal_depth_tile_key, override_key, CacheKey, CacheKind};

/// Per-kind hit/miss/store counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KindCounters {
    pub material_tile: u64,
    pub normal_depth_tile: u64,
    pub material_override: u64,
    pub normal_depth_override: u64,
}

impl KindCounters {
    pub fn bump(&mut self, kind: CacheKind) {
        match kind {
            CacheKind::MaterialTile => self.material_tile += 1,
            CacheKind::NormalDepthTile => self.normal_depth_tile += 1,
            CacheKind::MaterialOverride => self.material_override += 1,
            CacheKind::NormalDepthOverride => self.normal_depth_override += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.material_tile + self.normal_depth_tile + self.material_override
            + self.normal_depth_override
    }
}

/// Value snapshot of cache health, safe to read from any thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub evicted: u64,
    pub io_errors: u64,
    pub hits: KindCounters,
    pub misses: KindCounters,
    pub stores: KindCounters,
}

/// Content-addressable payload store shared by every build session.
///
/// Implementations are internally synchronized; workers call them
/// concurrently. I/O failures degrade to a miss or a skipped store — they
/// never fail a build.
pub trait TileCache: Send + Sync {
    fn try_load(&self, key: &CacheKey) -> Option<Vec<u8>>;

    fn store(&self, key: &CacheKey, width: u32, height: u32, payload: &[u8]);

    fn stats(&self) -> CacheStats;
}

/// Installed when caching is disabled: always a miss, stores are discarded.
/// Callers never special-case it.
#[derive(Debug, Default)]
pub struct NoopTileCache;

impl TileCache for NoopTileCache {
    fn try_load(&self, _key: &CacheKey) -> Option<Vec<u8>> {
        None
    }

    fn store(&self, _key: &CacheKey, _width: u32, _height: u32, _payload: &[u8]) {}

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CacheKey, CacheStats, TileCache};
use crate::error::Result;

#[derive(Deserialize, Serialize, Clone, Copy)]
struct ManifestEntry {
    key: CacheKey,
    width: u32,
    height: u32,
    size_bytes: u64,
    last_access: u64,
}

#[derive(Deserialize, Serialize, Default)]
struct Manifest {
    access_clock: u64,
    entries: Vec<ManifestEntry>,
}

struct EntryMeta {
    width: u32,
    height: u32,
    size_bytes: u64,
    last_access: u64,
}

struct CacheState {
    entries: HashMap<CacheKey, EntryMeta>,
    total_bytes: u64,
    /// Logical clock bumped on every access; survives restarts through the
    /// manifest so eviction order stays meaningful across runs.
    access_clock: u64,
    stats: CacheStats,
}

/// Disk-backed tile cache: one payload file per key plus a JSON manifest
/// tracking sizes and access order. Evicts oldest-access-first once the byte
/// budget is exceeded; ties break on key bytes so the order is total.
pub struct DiskTileCache {
    root: PathBuf,
    byte_budget: u64,
    state: Mutex<CacheState>,
}

impl DiskTileCache {
    /// Open (or create) a cache directory. A missing or corrupt manifest
    /// starts the cache empty rather than failing.
    pub fn open(root: impl Into<PathBuf>, byte_budget: u64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut state = CacheState {
            entries: HashMap::new(),
            total_bytes: 0,
            access_clock: 0,
            stats: CacheStats::default(),
        };

        let manifest_path = root.join("manifest.json");
        if manifest_path.exists() {
            match Self::read_manifest(&manifest_path) {
                Ok(manifest) => {
                    state.access_clock = manifest.access_clock;
                    for entry in manifest.entries {
                        // Drop manifest rows whose payload file vanished.
                        if !root.join(entry.key.file_name()).exists() {
                            debug!("cache entry {} missing on disk", entry.key.file_name());
                            continue;
                        }
                        state.total_bytes += entry.size_bytes;
                        state.entries.insert(
                            entry.key,
                            EntryMeta {
                                width: entry.width,
                                height: entry.height,
                                size_bytes: entry.size_bytes,
                                last_access: entry.last_access,
                            },
                        );
                    }
                    info!(
                        "Opened tile cache {} ({} entries, {} bytes)",
                        root.display(),
                        state.entries.len(),
                        state.total_bytes
                    );
                }
                Err(err) => {
                    warn!(
                        "tile cache manifest {} unreadable ({}), starting empty",
                        manifest_path.display(),
                        err
                    );
                }
            }
        }

        Ok(Self {
            root,
            byte_budget,
            state: Mutex::new(state),
        })
    }

    fn read_manifest(path: &Path) -> Result<Manifest> {
        let json_data = fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&json_data)?;
        Ok(manifest)
    }

    fn write_manifest(&self, state: &CacheState) {
        let manifest = Manifest {
            access_clock: state.access_clock,
            entries: state
                .entries
                .iter()
                .map(|(key, meta)| ManifestEntry {
                    key: *key,
                    width: meta.width,
                    height: meta.height,
                    size_bytes: meta.size_bytes,
                    last_access: meta.last_access,
                })
                .collect(),
        };
        let path = self.root.join("manifest.json");
        let json_data = match serde_json::to_string(&manifest) {
            Ok(data) => data,
            Err(err) => {
                warn!("failed to serialize cache manifest: {}", err);
                return;
            }
        };
        if let Err(err) = fs::write(&path, json_data) {
            warn!("failed to write cache manifest {}: {}", path.display(), err);
        }
    }

    /// Evict oldest-access-first until the byte budget holds. A zero budget
    /// disables the bound.
    fn evict_over_budget(&self, state: &mut CacheState) {
        if self.byte_budget == 0 {
            return;
        }
        while state.total_bytes > self.byte_budget {
            let Some(victim) = state
                .entries
                .iter()
                .min_by_key(|(key, meta)| (meta.last_access, key.file_name()))
                .map(|(key, _)| *key)
            else {
                break;
            };
            let Some(meta) = state.entries.remove(&victim) else {
                break;
            };
            state.total_bytes -= meta.size_bytes;
            state.stats.evicted += 1;
            let path = self.root.join(victim.file_name());
            if let Err(err) = fs::remove_file(&path) {
                warn!("failed to remove evicted entry {}: {}", path.display(), err);
                state.stats.io_errors += 1;
            }
            debug!("evicted cache entry {}", victim.file_name());
        }
    }

    /// Persist the manifest now instead of waiting for the next store.
    pub fn flush(&self) {
        let state = self.state.lock().unwrap();
        self.write_manifest(&state);
    }
}

impl TileCache for DiskTileCache {
    fn try_load(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        if !state.entries.contains_key(key) {
            state.stats.misses.bump(key.kind);
            return None;
        }
        let path = self.root.join(key.file_name());
        match fs::read(&path) {
            Ok(bytes) => {
                state.access_clock += 1;
                let clock = state.access_clock;
                if let Some(meta) = state.entries.get_mut(key) {
                    meta.last_access = clock;
                }
                state.stats.hits.bump(key.kind);
                Some(bytes)
            }
            Err(err) => {
                // Treat a vanished or unreadable payload as a miss and drop
                // the stale manifest row.
                warn!("cache read {} failed: {}", path.display(), err);
                if let Some(meta) = state.entries.remove(key) {
                    state.total_bytes -= meta.size_bytes;
                }
                state.stats.io_errors += 1;
                state.stats.misses.bump(key.kind);
                None
            }
        }
    }

    fn store(&self, key: &CacheKey, width: u32, height: u32, payload: &[u8]) {
        let mut state = self.state.lock().unwrap();

        // Same key, same size: the payload is already present, skip the
        // write entirely.
        if let Some(meta) = state.entries.get(key) {
            if meta.size_bytes == payload.len() as u64 {
                return;
            }
        }

        let path = self.root.join(key.file_name());
        if let Err(err) = fs::write(&path, payload) {
            warn!("cache write {} failed: {}", path.display(), err);
            state.stats.io_errors += 1;
            return;
        }

        if let Some(old) = state.entries.remove(key) {
            state.total_bytes -= old.size_bytes;
        }
        state.access_clock += 1;
        let clock = state.access_clock;
        state.entries.insert(
            *key,
            EntryMeta {
                width,
                height,
                size_bytes: payload.len() as u64,
                last_access: clock,
            },
        );
        state.total_bytes += payload.len() as u64;
        state.stats.stores.bump(key.kind);

        self.evict_over_budget(&mut state);
        state.stats.entries = state.entries.len();
        state.stats.total_bytes = state.total_bytes;
        self.write_manifest(&state);
    }

    fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        let mut stats = state.stats;
        stats.entries = state.entries.len();
        stats.total_bytes = state.total_bytes;
        stats
    }
}

impl Drop for DiskTileCache {
    fn drop(&mut self) {
        if let Ok(state) = self.state.lock() {
            self.write_manifest(&state);
        }
    }
}

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Options recognized by the build orchestrator. Loaded from JSON alongside
/// the other registry files, or constructed directly by the embedding
/// application.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct BakeOptions {
    /// Worker threads for CPU-side tile compute.
    pub max_concurrency: i32,
    /// Concurrent cache reads/writes allowed, independent of compute.
    pub disk_io_concurrency: i32,
    /// Concurrent GPU-adjacent preparation slots.
    pub gpu_prep_concurrency: i32,
    /// Disk cache byte budget. Zero disables the bound.
    pub cache_byte_budget: u64,
    pub cache_enabled: bool,
    /// When false, jobs run inline on the calling thread instead of the
    /// worker pool.
    pub async_build_enabled: bool,
    /// Maximum completed results applied per drain call.
    pub per_frame_apply_budget: usize,
    /// Optional wall-clock bound for one drain call, in milliseconds.
    pub per_frame_apply_millis: Option<u64>,
    /// Bumped whenever the cached payload format changes; invalidates every
    /// previously cached entry.
    pub cache_format_epoch: u32,
}

impl Default for BakeOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            disk_io_concurrency: 2,
            gpu_prep_concurrency: 1,
            cache_byte_budget: 256 * 1024 * 1024,
            cache_enabled: true,
            async_build_enabled: true,
            per_frame_apply_budget: 16,
            per_frame_apply_millis: None,
            cache_format_epoch: 1,
        }
    }
}

impl BakeOptions {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json_data = fs::read_to_string(path.as_ref())?;
        let options: BakeOptions = serde_json::from_str(&json_data)?;
        Ok(options.normalized())
    }

    /// Clamp misconfigured values instead of failing; a bad config file
    /// should degrade to something usable.
    pub fn normalized(mut self) -> Self {
        if self.max_concurrency < 1 {
            warn!(
                "max_concurrency {} is invalid, using 1",
                self.max_concurrency
            );
            self.max_concurrency = 1;
        }
        if self.disk_io_concurrency < 0 {
            warn!(
                "disk_io_concurrency {} is invalid, using 0",
                self.disk_io_concurrency
            );
            self.disk_io_concurrency = 0;
        }
        if self.gpu_prep_concurrency < 0 {
            warn!(
                "gpu_prep_concurrency {} is invalid, using 0",
                self.gpu_prep_concurrency
            );
            self.gpu_prep_concurrency = 0;
        }
        self
    }

    pub fn worker_threads(&self) -> usize {
        self.max_concurrency.max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_sane() {
        let options = BakeOptions::default();
        assert!(options.max_concurrency >= 1);
        assert!(options.cache_enabled);
        assert!(options.per_frame_apply_budget > 0);
    }

    #[test]
    fn normalization_clamps_concurrency() {
        let options = BakeOptions {
            max_concurrency: 0,
            disk_io_concurrency: -3,
            ..Default::default()
        }
        .normalized();
        assert_eq!(options.max_concurrency, 1);
        assert_eq!(options.disk_io_concurrency, 0);
    }

    #[test]
    fn loads_partial_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bake.json");
        fs::write(&path, "{\"max_concurrency\": 2, \"cache_enabled\": false}").unwrap();
        let options = BakeOptions::from_file(&path).unwrap();
        assert_eq!(options.max_concurrency, 2);
        assert!(!options.cache_enabled);
        // untouched fields keep their defaults
        assert_eq!(
            options.per_frame_apply_budget,
            BakeOptions::default().per_frame_apply_budget
        );
    }
}

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::atlas::{AtlasRect, PageId};
use crate::texel::TilePayload;

/// Destination for baked texel data. Owned by the render thread; the
/// scheduler only calls into it from the per-frame drain.
pub trait TextureStore {
    /// Upload `payload` into the page's backing image for the payload's
    /// layer, at `rect`. The payload byte length matches
    /// `rect.width * rect.height * channels * 4`. A failed upload is
    /// reported, not propagated past the drain loop.
    fn upload_region(
        &mut self,
        page_id: PageId,
        rect: AtlasRect,
        payload: &TilePayload,
    ) -> crate::error::Result<()>;

    /// Reset a whole page to its default content.
    fn clear_page(&mut self, page_id: PageId);
}

/// Read access to source assets (override images, luminance sources).
/// Consumed only by tile computers, never by the orchestration core itself.
pub trait SourceAssetStore: Send + Sync {
    fn load(&self, texture_id: &str) -> Option<Vec<u8>>;

    /// Identity proxy for cache keys: byte length of the asset, if present.
    /// Cheap compared to hashing content and good enough to invalidate on
    /// replacement.
    fn content_len(&self, texture_id: &str) -> Option<u64> {
        self.load(texture_id).map(|b| b.len() as u64)
    }

    fn list_under(&self, prefix: &str) -> Vec<String>;
}

/// Filesystem-backed asset store rooted at a base directory. Texture ids are
/// paths relative to the base, the same convention the registry files use.
pub struct FsAssetStore {
    base_path: PathBuf,
}

impl FsAssetStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn resolve(&self, texture_id: &str) -> PathBuf {
        self.base_path.join(texture_id)
    }
}

impl SourceAssetStore for FsAssetStore {
    fn load(&self, texture_id: &str) -> Option<Vec<u8>> {
        let path = self.resolve(texture_id);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                debug!("asset {} not readable: {}", path.display(), err);
                None
            }
        }
    }

    fn content_len(&self, texture_id: &str) -> Option<u64> {
        fs::metadata(self.resolve(texture_id)).ok().map(|m| m.len())
    }

    fn list_under(&self, prefix: &str) -> Vec<String> {
        let root = self.base_path.join(prefix);
        let mut found = Vec::new();
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.base_path) {
                    found.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        found.sort();
        found
    }
}

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use glam::Vec2;
use image::{ImageBuffer, Rgba};

use relief::atlas::{AtlasQuery, AtlasRect, AtlasSnapshot, PageId, PageInfo, TilePlacement};
use relief::error::{ComputeError, Error, Result};
use relief::pipeline::NormalDepthSolver;
use relief::scheduler::BakeScheduler;
use relief::store::{SourceAssetStore, TextureStore};
use relief::texel::{LayerKind, NormalDepthTexel, TilePayload};

/// Position lookup backed by a plain map.
pub struct MapLookup {
    positions: HashMap<String, TilePlacement>,
}

impl MapLookup {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
        }
    }

    pub fn with(mut self, texture_id: &str, placement: TilePlacement) -> Self {
        self.positions.insert(texture_id.to_string(), placement);
        self
    }
}

impl AtlasQuery for MapLookup {
    fn resolve_position(&self, texture_id: &str) -> Option<TilePlacement> {
        self.positions.get(texture_id).copied()
    }
}

/// In-memory asset store; encode helpers produce real PNG bytes so the
/// override path exercises actual decoding.
#[derive(Default)]
pub struct MemAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MemAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_png(&mut self, path: &str, width: u32, height: u32, pixel: [u8; 4]) {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgba(pixel));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageOutputFormat::Png,
        )
        .unwrap();
        self.files.insert(path.to_string(), bytes);
    }
}

impl SourceAssetStore for MemAssets {
    fn load(&self, texture_id: &str) -> Option<Vec<u8>> {
        self.files.get(texture_id).cloned()
    }

    fn list_under(&self, prefix: &str) -> Vec<String> {
        let mut found: Vec<String> = self
            .files
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        found.sort();
        found
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UploadCall {
    pub page_id: PageId,
    pub rect: AtlasRect,
    pub layer: LayerKind,
    pub bytes: Vec<u8>,
}

/// Texture store double that records every upload in order. Can be told to
/// fail the nth upload to exercise the drain loop's error absorption.
#[derive(Default)]
pub struct RecordingTextureStore {
    pub uploads: Vec<UploadCall>,
    pub cleared_pages: Vec<PageId>,
    pub fail_on_call: Option<usize>,
    calls: usize,
}

impl RecordingTextureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads_for(&self, page_id: PageId, rect: AtlasRect) -> Vec<&UploadCall> {
        self.uploads
            .iter()
            .filter(|u| u.page_id == page_id && u.rect == rect)
            .collect()
    }
}

impl TextureStore for RecordingTextureStore {
    fn upload_region(
        &mut self,
        page_id: PageId,
        rect: AtlasRect,
        payload: &TilePayload,
    ) -> Result<()> {
        let call_index = self.calls;
        self.calls += 1;
        if self.fail_on_call == Some(call_index) {
            return Err(Error::Compute(ComputeError {
                texture: format!("page {page_id}"),
                reason: "injected upload failure".to_string(),
            }));
        }
        self.uploads.push(UploadCall {
            page_id,
            rect,
            layer: payload.layer,
            bytes: payload.bytes.clone(),
        });
        Ok(())
    }

    fn clear_page(&mut self, page_id: PageId) {
        self.cleared_pages.push(page_id);
    }
}

/// Solver double: depth equals luminance, normals point up.
pub struct FlatSolver;

impl NormalDepthSolver for FlatSolver {
    fn solve(
        &self,
        luminance: &[f32],
        _width: u32,
        _height: u32,
        _cancel: &relief::pipeline::CancelToken,
    ) -> Result<Vec<NormalDepthTexel>> {
        Ok(luminance
            .iter()
            .map(|l| NormalDepthTexel {
                nx: 0.0,
                ny: 0.0,
                nz: 1.0,
                depth: *l,
            })
            .collect())
    }
}

pub fn one_page_snapshot() -> AtlasSnapshot {
    AtlasSnapshot::new(
        vec![PageInfo {
            page_id: 0,
            width: 256,
            height: 256,
        }],
        Vec::new(),
        0,
    )
}

pub fn placement(x0: f32, y0: f32, x1: f32, y1: f32) -> TilePlacement {
    TilePlacement {
        page_id: 0,
        uv_min: Vec2::new(x0, y0),
        uv_max: Vec2::new(x1, y1),
    }
}

/// Pump the drain loop until the active session completes or the timeout
/// elapses. Returns total uploads applied.
pub fn drain_until_complete(
    scheduler: &mut BakeScheduler,
    store: &mut RecordingTextureStore,
    timeout: Duration,
) -> usize {
    let deadline = Instant::now() + timeout;
    let mut applied = 0;
    loop {
        applied += scheduler.drain_completed(store);
        match scheduler.progress() {
            Some(progress) if progress.is_complete || progress.is_cancelled => break,
            None => break,
            _ => {}
        }
        if Instant::now() >= deadline {
            panic!("build session did not complete within {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    applied
}

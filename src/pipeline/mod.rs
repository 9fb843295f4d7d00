pub mod material;
pub mod normal_depth;
pub mod override_image;

pub use material::MaterialParamsComputer;
pub use normal_depth::{NormalDepthComputer, NormalDepthSolver};
pub use override_image::OverrideComputer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;

use crate::error::{DecodeError, Error, Result};
use crate::plan::TileJob;
use crate::store::SourceAssetStore;
use crate::texel::TilePayload;

/// Cooperative cancellation signal shared by one build session. Long compute
/// loops poll it at safe points (row granularity); nothing is ever torn down
/// forcibly.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything a computer may touch: the job description, read-only source
/// assets and the session cancellation token. Never the texture store.
pub struct ComputeContext<'a> {
    pub job: &'a TileJob,
    pub assets: &'a dyn SourceAssetStore,
    pub cancel: &'a CancelToken,
}

/// Result of the CPU stage of the pipeline.
#[derive(Clone, Debug)]
pub struct ComputeOutcome {
    pub is_noop: bool,
    pub output: Option<TilePayload>,
    pub requires_apply: bool,
}

impl ComputeOutcome {
    pub fn noop() -> Self {
        Self {
            is_noop: true,
            output: None,
            requires_apply: false,
        }
    }

    pub fn ready(payload: TilePayload) -> Self {
        Self {
            is_noop: false,
            output: Some(payload),
            requires_apply: true,
        }
    }
}

/// CPU stage of the artifact pipeline. Runs on worker threads; the output
/// stage (cache store) and the applier (texture upload) are driven by the
/// scheduler around it.
pub trait TileComputer: Send + Sync {
    fn compute(&self, ctx: &ComputeContext) -> Result<ComputeOutcome>;
}

pub(crate) fn decode_rgba(bytes: &[u8], path: &str) -> Result<RgbaImage> {
    let img = image::load_from_memory(bytes).map_err(|err| {
        Error::Decode(DecodeError {
            path: path.to_string(),
            reason: err.to_string(),
        })
    })?;
    Ok(img.to_rgba8())
}

/// Nearest-neighbor sample of `img` at normalized tile coordinates, used to
/// fit arbitrary source dimensions onto the target rect.
pub(crate) fn sample_nearest(img: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> [u8; 4] {
    let sx = ((x as u64 * img.width() as u64) / width.max(1) as u64) as u32;
    let sy = ((y as u64 * img.height() as u64) / height.max(1) as u64) as u32;
    let sx = sx.min(img.width().saturating_sub(1));
    let sy = sy.min(img.height().saturating_sub(1));
    img.get_pixel(sx, sy).0
}

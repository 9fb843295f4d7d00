use std::sync::Arc;

use super::{decode_rgba, sample_nearest, ComputeContext, ComputeOutcome, TileComputer};
use crate::error::Result;
use crate::plan::JobPayload;
use crate::texel::{NormalDepthTexel, TilePayload};

/// The multi-pass numerical solver that turns a luminance field into a
/// normal/height field. Injected by the embedding application; this crate
/// only orchestrates it. Implementations poll `cancel` between passes.
pub trait NormalDepthSolver: Send + Sync {
    fn solve(
        &self,
        luminance: &[f32],
        width: u32,
        height: u32,
        cancel: &super::CancelToken,
    ) -> Result<Vec<NormalDepthTexel>>;
}

/// Pipeline stage wrapping the injected solver: loads the tile's source
/// image, reduces it to luminance at the target rect size, solves, then
/// applies the post-generation depth scale.
pub struct NormalDepthComputer {
    solver: Arc<dyn NormalDepthSolver>,
}

impl NormalDepthComputer {
    pub fn new(solver: Arc<dyn NormalDepthSolver>) -> Self {
        Self { solver }
    }
}

impl TileComputer for NormalDepthComputer {
    fn compute(&self, ctx: &ComputeContext) -> Result<ComputeOutcome> {
        let JobPayload::NormalDepthTile { scale } = ctx.job.payload else {
            return Ok(ComputeOutcome::noop());
        };

        // A bake seeded from a raw placement has no source identity; there
        // is nothing to solve against.
        if ctx.job.texture_id.is_empty() {
            return Ok(ComputeOutcome::noop());
        }
        let Some(bytes) = ctx.assets.load(&ctx.job.texture_id) else {
            return Ok(ComputeOutcome::noop());
        };
        let img = decode_rgba(&bytes, &ctx.job.texture_id)?;

        let rect = ctx.job.rect;
        let mut luminance = Vec::with_capacity(rect.texel_count());
        for y in 0..rect.height {
            if ctx.cancel.is_cancelled() {
                return Ok(ComputeOutcome::noop());
            }
            for x in 0..rect.width {
                let p = sample_nearest(&img, x, y, rect.width, rect.height);
                luminance.push(
                    (0.2126 * p[0] as f32 + 0.7152 * p[1] as f32 + 0.0722 * p[2] as f32) / 255.0,
                );
            }
        }

        let mut texels = self
            .solver
            .solve(&luminance, rect.width, rect.height, ctx.cancel)?;
        if ctx.cancel.is_cancelled() {
            return Ok(ComputeOutcome::noop());
        }
        if scale != 1.0 {
            for texel in &mut texels {
                texel.depth *= scale;
            }
        }

        Ok(ComputeOutcome::ready(TilePayload::from_normal_depth_texels(
            rect.width,
            rect.height,
            &texels,
        )))
    }
}

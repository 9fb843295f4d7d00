use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{ComputeContext, ComputeOutcome, TileComputer};
use crate::error::Result;
use crate::plan::JobPayload;
use crate::registry::MaterialDef;
use crate::texel::{MaterialTexel, TilePayload};

/// Procedural generator for the material-parameter layer. Cheap: a flat fill
/// from the definition, optionally perturbed by lattice value noise seeded
/// from the atlas position so cached bytes are a pure function of the cache
/// key inputs.
#[derive(Debug, Default)]
pub struct MaterialParamsComputer;

impl MaterialParamsComputer {
    pub fn new() -> Self {
        Self
    }
}

impl TileComputer for MaterialParamsComputer {
    fn compute(&self, ctx: &ComputeContext) -> Result<ComputeOutcome> {
        let JobPayload::MaterialTile { material } = &ctx.job.payload else {
            return Ok(ComputeOutcome::noop());
        };

        let rect = ctx.job.rect;
        let mut texels = Vec::with_capacity(rect.texel_count());
        for y in 0..rect.height {
            if ctx.cancel.is_cancelled() {
                return Ok(ComputeOutcome::noop());
            }
            for x in 0..rect.width {
                texels.push(generate_texel(material, rect.x + x, rect.y + y));
            }
        }

        Ok(ComputeOutcome::ready(TilePayload::from_material_texels(
            rect.width,
            rect.height,
            &texels,
        )))
    }
}

fn generate_texel(material: &MaterialDef, gx: u32, gy: u32) -> MaterialTexel {
    let mut roughness = material.roughness;
    if let Some(noise) = &material.noise {
        roughness += noise.amplitude * (lattice_noise(gx, gy, noise.frequency, noise.seed) - 0.5);
    }
    // Scale multiplies after generation; it is never folded into the noise.
    let scale = material.scale;
    MaterialTexel {
        roughness: (roughness * scale).clamp(0.0, 1.0),
        metallic: (material.metallic * scale).clamp(0.0, 1.0),
        emissive: (material.emissive * scale).clamp(0.0, 1.0),
        occlusion: 1.0,
    }
}

/// Deterministic hash noise on a lattice of `frequency`-texel cells, in
/// [0, 1).
fn lattice_noise(gx: u32, gy: u32, frequency: f32, seed: u32) -> f32 {
    let cell = frequency.max(1.0) as u32;
    let mut hasher = DefaultHasher::new();
    (gx / cell).hash(&mut hasher);
    (gy / cell).hash(&mut hasher);
    seed.hash(&mut hasher);
    (hasher.finish() & 0xFFFF) as f32 / 65536.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::AtlasRect;
    use crate::pipeline::CancelToken;
    use crate::plan::TileJob;
    use crate::registry::NoiseParams;
    use crate::store::SourceAssetStore;

    struct NoAssets;

    impl SourceAssetStore for NoAssets {
        fn load(&self, _texture_id: &str) -> Option<Vec<u8>> {
            None
        }

        fn list_under(&self, _prefix: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn job(material: MaterialDef) -> TileJob {
        TileJob {
            texture_id: "tiles/rock.png".to_string(),
            page_id: 0,
            rect: AtlasRect {
                x: 0,
                y: 0,
                width: 8,
                height: 8,
            },
            priority: 0,
            payload: JobPayload::MaterialTile { material },
        }
    }

    #[test]
    fn flat_material_fills_every_texel() {
        let job = job(MaterialDef::flat("rock", 0.5));
        let cancel = CancelToken::new();
        let ctx = ComputeContext {
            job: &job,
            assets: &NoAssets,
            cancel: &cancel,
        };
        let outcome = MaterialParamsComputer::new().compute(&ctx).unwrap();
        let payload = outcome.output.unwrap();
        assert!(payload
            .material_texels()
            .iter()
            .all(|t| t.roughness == 0.5 && t.occlusion == 1.0));
    }

    #[test]
    fn scale_multiplies_after_generation() {
        let mut material = MaterialDef::flat("rock", 0.4);
        material.scale = 2.0;
        let job = job(material);
        let cancel = CancelToken::new();
        let ctx = ComputeContext {
            job: &job,
            assets: &NoAssets,
            cancel: &cancel,
        };
        let outcome = MaterialParamsComputer::new().compute(&ctx).unwrap();
        let payload = outcome.output.unwrap();
        assert!(payload.material_texels().iter().all(|t| t.roughness == 0.8));
    }

    #[test]
    fn noise_is_deterministic_for_fixed_seed() {
        let mut material = MaterialDef::flat("rock", 0.5);
        material.noise = Some(NoiseParams {
            amplitude: 0.2,
            frequency: 2.0,
            seed: 11,
        });
        let job = job(material);
        let cancel = CancelToken::new();
        let ctx = ComputeContext {
            job: &job,
            assets: &NoAssets,
            cancel: &cancel,
        };
        let computer = MaterialParamsComputer::new();
        let a = computer.compute(&ctx).unwrap().output.unwrap();
        let b = computer.compute(&ctx).unwrap().output.unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn cancelled_compute_returns_noop() {
        let job = job(MaterialDef::flat("rock", 0.5));
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = ComputeContext {
            job: &job,
            assets: &NoAssets,
            cancel: &cancel,
        };
        let outcome = MaterialParamsComputer::new().compute(&ctx).unwrap();
        assert!(outcome.is_noop);
        assert!(outcome.output.is_none());
    }

    #[test]
    fn non_material_job_is_a_noop() {
        let mut job = job(MaterialDef::flat("rock", 0.5));
        job.payload = JobPayload::NormalDepthTile { scale: 1.0 };
        let cancel = CancelToken::new();
        let ctx = ComputeContext {
            job: &job,
            assets: &NoAssets,
            cancel: &cancel,
        };
        let outcome = MaterialParamsComputer::new().compute(&ctx).unwrap();
        assert!(outcome.is_noop);
    }
}

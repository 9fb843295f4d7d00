use tracing::debug;

use super::{decode_rgba, sample_nearest, ComputeContext, ComputeOutcome, TileComputer};
use crate::error::{Error, LoadingError, Result};
use crate::plan::JobPayload;
use crate::texel::{MaterialTexel, NormalDepthTexel, TilePayload};

/// Turns an explicit replacement image into a payload for either derived
/// layer. The image is fit to the target rect with nearest sampling; authors
/// are expected to supply matching dimensions, so a mismatch is only logged.
#[derive(Debug, Default)]
pub struct OverrideComputer;

impl OverrideComputer {
    pub fn new() -> Self {
        Self
    }
}

impl TileComputer for OverrideComputer {
    fn compute(&self, ctx: &ComputeContext) -> Result<ComputeOutcome> {
        let source_path = match &ctx.job.payload {
            JobPayload::MaterialOverride { source_path } => source_path,
            JobPayload::NormalDepthOverride { source_path } => source_path,
            _ => return Ok(ComputeOutcome::noop()),
        };

        let Some(bytes) = ctx.assets.load(source_path) else {
            return Err(Error::Loading(LoadingError {
                entry: ctx.job.texture_id.clone(),
                path: source_path.clone(),
            }));
        };
        let img = decode_rgba(&bytes, source_path)?;

        let rect = ctx.job.rect;
        if img.width() != rect.width || img.height() != rect.height {
            debug!(
                "override {} is {}x{}, resampling to {}x{}",
                source_path,
                img.width(),
                img.height(),
                rect.width,
                rect.height
            );
        }

        let payload = match &ctx.job.payload {
            JobPayload::MaterialOverride { .. } => {
                let mut texels = Vec::with_capacity(rect.texel_count());
                for y in 0..rect.height {
                    if ctx.cancel.is_cancelled() {
                        return Ok(ComputeOutcome::noop());
                    }
                    for x in 0..rect.width {
                        let p = sample_nearest(&img, x, y, rect.width, rect.height);
                        texels.push(MaterialTexel {
                            roughness: p[0] as f32 / 255.0,
                            metallic: p[1] as f32 / 255.0,
                            emissive: p[2] as f32 / 255.0,
                            occlusion: p[3] as f32 / 255.0,
                        });
                    }
                }
                TilePayload::from_material_texels(rect.width, rect.height, &texels)
            }
            _ => {
                let mut texels = Vec::with_capacity(rect.texel_count());
                for y in 0..rect.height {
                    if ctx.cancel.is_cancelled() {
                        return Ok(ComputeOutcome::noop());
                    }
                    for x in 0..rect.width {
                        let p = sample_nearest(&img, x, y, rect.width, rect.height);
                        // Standard normal-map encoding: RGB is the unit
                        // normal remapped to [0, 255], alpha is depth.
                        texels.push(NormalDepthTexel {
                            nx: p[0] as f32 / 255.0 * 2.0 - 1.0,
                            ny: p[1] as f32 / 255.0 * 2.0 - 1.0,
                            nz: p[2] as f32 / 255.0 * 2.0 - 1.0,
                            depth: p[3] as f32 / 255.0,
                        });
                    }
                }
                TilePayload::from_normal_depth_texels(rect.width, rect.height, &texels)
            }
        };

        Ok(ComputeOutcome::ready(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::AtlasRect;
    use crate::pipeline::CancelToken;
    use crate::plan::TileJob;
    use crate::store::SourceAssetStore;
    use crate::texel::LayerKind;
    use image::{ImageBuffer, Rgba};
    use std::collections::HashMap;

    struct MemAssets {
        files: HashMap<String, Vec<u8>>,
    }

    impl MemAssets {
        fn with_png(path: &str, width: u32, height: u32, pixel: [u8; 4]) -> Self {
            let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
                ImageBuffer::from_pixel(width, height, Rgba(pixel));
            let mut bytes = Vec::new();
            img.write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageOutputFormat::Png,
            )
            .unwrap();
            let mut files = HashMap::new();
            files.insert(path.to_string(), bytes);
            Self { files }
        }
    }

    impl SourceAssetStore for MemAssets {
        fn load(&self, texture_id: &str) -> Option<Vec<u8>> {
            self.files.get(texture_id).cloned()
        }

        fn list_under(&self, _prefix: &str) -> Vec<String> {
            self.files.keys().cloned().collect()
        }
    }

    fn override_job(payload: JobPayload) -> TileJob {
        TileJob {
            texture_id: "tiles/rock.png".to_string(),
            page_id: 0,
            rect: AtlasRect {
                x: 0,
                y: 0,
                width: 4,
                height: 4,
            },
            priority: 0,
            payload,
        }
    }

    #[test]
    fn material_override_decodes_to_unit_range() {
        let assets = MemAssets::with_png("overrides/rock.png", 4, 4, [255, 0, 128, 255]);
        let job = override_job(JobPayload::MaterialOverride {
            source_path: "overrides/rock.png".to_string(),
        });
        let cancel = CancelToken::new();
        let ctx = ComputeContext {
            job: &job,
            assets: &assets,
            cancel: &cancel,
        };
        let payload = OverrideComputer::new()
            .compute(&ctx)
            .unwrap()
            .output
            .unwrap();
        assert_eq!(payload.layer, LayerKind::MaterialParams);
        let texel = payload.material_texels()[0];
        assert_eq!(texel.roughness, 1.0);
        assert_eq!(texel.metallic, 0.0);
        assert_eq!(texel.occlusion, 1.0);
    }

    #[test]
    fn normal_depth_override_remaps_normals() {
        let assets = MemAssets::with_png("overrides/rock_n.png", 4, 4, [128, 128, 255, 0]);
        let job = override_job(JobPayload::NormalDepthOverride {
            source_path: "overrides/rock_n.png".to_string(),
        });
        let cancel = CancelToken::new();
        let ctx = ComputeContext {
            job: &job,
            assets: &assets,
            cancel: &cancel,
        };
        let payload = OverrideComputer::new()
            .compute(&ctx)
            .unwrap()
            .output
            .unwrap();
        assert_eq!(payload.layer, LayerKind::NormalDepth);
        let texel = payload.normal_depth_texels()[0];
        assert!(texel.nz > 0.99);
        assert_eq!(texel.depth, 0.0);
    }

    #[test]
    fn mismatched_dimensions_are_resampled() {
        let assets = MemAssets::with_png("overrides/rock.png", 8, 8, [64, 0, 0, 255]);
        let job = override_job(JobPayload::MaterialOverride {
            source_path: "overrides/rock.png".to_string(),
        });
        let cancel = CancelToken::new();
        let ctx = ComputeContext {
            job: &job,
            assets: &assets,
            cancel: &cancel,
        };
        let payload = OverrideComputer::new()
            .compute(&ctx)
            .unwrap()
            .output
            .unwrap();
        assert_eq!(payload.width, 4);
        assert_eq!(payload.height, 4);
    }

    #[test]
    fn missing_override_image_is_an_error() {
        let assets = MemAssets {
            files: HashMap::new(),
        };
        let job = override_job(JobPayload::MaterialOverride {
            source_path: "overrides/none.png".to_string(),
        });
        let cancel = CancelToken::new();
        let ctx = ComputeContext {
            job: &job,
            assets: &assets,
            cancel: &cancel,
        };
        assert!(OverrideComputer::new().compute(&ctx).is_err());
    }
}

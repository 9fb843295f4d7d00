use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::atlas::AtlasRect;
use crate::registry::MaterialDef;

/// Namespace for one job kind. Kinds share the digest space but never
/// collide with each other because the kind rides alongside the digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum CacheKind {
    MaterialTile,
    NormalDepthTile,
    MaterialOverride,
    NormalDepthOverride,
}

impl CacheKind {
    pub fn tag(&self) -> &'static str {
        match self {
            CacheKind::MaterialTile => "mat",
            CacheKind::NormalDepthTile => "nd",
            CacheKind::MaterialOverride => "mato",
            CacheKind::NormalDepthOverride => "ndo",
        }
    }
}

/// Deterministic fingerprint of every input that affects a job's output
/// bytes. Equal inputs produce equal keys across process runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub digest: u64,
}

impl CacheKey {
    pub fn file_name(&self) -> String {
        format!("{}-{:016x}.bin", self.kind.tag(), self.digest)
    }
}

fn hash_rect(rect: &AtlasRect, hasher: &mut DefaultHasher) {
    rect.x.hash(hasher);
    rect.y.hash(hasher);
    rect.width.hash(hasher);
    rect.height.hash(hasher);
}

/// Key for a procedural material-parameter tile.
pub fn material_tile_key(rect: &AtlasRect, material: &MaterialDef, format_epoch: u32) -> CacheKey {
    let mut hasher = DefaultHasher::new();
    format_epoch.hash(&mut hasher);
    hash_rect(rect, &mut hasher);
    material.roughness.to_bits().hash(&mut hasher);
    material.metallic.to_bits().hash(&mut hasher);
    material.emissive.to_bits().hash(&mut hasher);
    material.scale.to_bits().hash(&mut hasher);
    match &material.noise {
        Some(noise) => {
            true.hash(&mut hasher);
            noise.amplitude.to_bits().hash(&mut hasher);
            noise.frequency.to_bits().hash(&mut hasher);
            noise.seed.hash(&mut hasher);
        }
        None => false.hash(&mut hasher),
    }
    CacheKey {
        kind: CacheKind::MaterialTile,
        digest: hasher.finish(),
    }
}

/// Key for a normal/depth bake. Source identity is the asset path plus its
/// byte length, a cheap proxy for content.
pub fn normal_depth_tile_key(
    rect: &AtlasRect,
    source_path: &str,
    source_len: u64,
    scale: f32,
    format_epoch: u32,
) -> CacheKey {
    let mut hasher = DefaultHasher::new();
    format_epoch.hash(&mut hasher);
    hash_rect(rect, &mut hasher);
    source_path.hash(&mut hasher);
    source_len.hash(&mut hasher);
    scale.to_bits().hash(&mut hasher);
    CacheKey {
        kind: CacheKind::NormalDepthTile,
        digest: hasher.finish(),
    }
}

/// Key for an override tile on either layer.
pub fn override_key(
    kind: CacheKind,
    rect: &AtlasRect,
    rule_texture: &str,
    source_path: &str,
    source_len: u64,
    format_epoch: u32,
) -> CacheKey {
    let mut hasher = DefaultHasher::new();
    format_epoch.hash(&mut hasher);
    hash_rect(rect, &mut hasher);
    rule_texture.hash(&mut hasher);
    source_path.hash(&mut hasher);
    source_len.hash(&mut hasher);
    CacheKey {
        kind,
        digest: hasher.finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> AtlasRect {
        AtlasRect {
            x: 0,
            y: 0,
            width: 32,
            height: 32,
        }
    }

    fn material() -> MaterialDef {
        MaterialDef::flat("rock", 0.5)
    }

    #[test]
    fn identical_inputs_produce_identical_keys() {
        let a = material_tile_key(&rect(), &material(), 1);
        let b = material_tile_key(&rect(), &material(), 1);
        assert_eq!(a, b);
    }

    #[test]
    fn each_material_field_changes_the_key() {
        let base = material_tile_key(&rect(), &material(), 1);

        let mut changed = material();
        changed.roughness = 0.6;
        assert_ne!(base, material_tile_key(&rect(), &changed, 1));

        let mut changed = material();
        changed.scale = 2.0;
        assert_ne!(base, material_tile_key(&rect(), &changed, 1));

        let mut changed = material();
        changed.noise = Some(crate::registry::NoiseParams {
            amplitude: 0.1,
            frequency: 4.0,
            seed: 7,
        });
        assert_ne!(base, material_tile_key(&rect(), &changed, 1));
    }

    #[test]
    fn rect_and_epoch_change_the_key() {
        let base = material_tile_key(&rect(), &material(), 1);
        let moved = AtlasRect {
            x: 32,
            ..rect()
        };
        assert_ne!(base, material_tile_key(&moved, &material(), 1));
        assert_ne!(base, material_tile_key(&rect(), &material(), 2));
    }

    #[test]
    fn source_identity_changes_normal_depth_key() {
        let base = normal_depth_tile_key(&rect(), "tiles/rock.png", 100, 1.0, 1);
        assert_ne!(
            base,
            normal_depth_tile_key(&rect(), "tiles/moss.png", 100, 1.0, 1)
        );
        assert_ne!(
            base,
            normal_depth_tile_key(&rect(), "tiles/rock.png", 101, 1.0, 1)
        );
        assert_ne!(
            base,
            normal_depth_tile_key(&rect(), "tiles/rock.png", 100, 2.0, 1)
        );
    }

    #[test]
    fn kinds_namespace_the_key_space() {
        let a = override_key(CacheKind::MaterialOverride, &rect(), "t", "o.png", 10, 1);
        let b = override_key(CacheKind::NormalDepthOverride, &rect(), "t", "o.png", 10, 1);
        assert_eq!(a.digest, b.digest);
        assert_ne!(a, b);
        assert_ne!(a.file_name(), b.file_name());
    }
}

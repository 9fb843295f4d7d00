pub mod json;

use std::collections::HashMap;
use std::fs;

use tracing::{debug, info, warn};

use crate::error::{Error, LoadingError, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseParams {
    pub amplitude: f32,
    pub frequency: f32,
    pub seed: u32,
}

/// Procedural material description. `scale` multiplies the generated values
/// after generation; it is not baked into the noise parameters so a scale
/// change alone does not change the noise field.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDef {
    pub name: String,
    pub roughness: f32,
    pub metallic: f32,
    pub emissive: f32,
    pub noise: Option<NoiseParams>,
    pub scale: f32,
}

impl MaterialDef {
    pub fn flat(name: &str, roughness: f32) -> Self {
        Self {
            name: name.to_string(),
            roughness,
            metallic: 0.0,
            emissive: 0.0,
            noise: None,
            scale: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverrideLayer {
    MaterialParams,
    NormalDepth,
}

/// Explicit replacement image for one texture's derived tile.
#[derive(Clone, Debug, PartialEq)]
pub struct OverrideRule {
    pub texture_id: String,
    pub source_path: String,
    pub layer: OverrideLayer,
}

impl From<json::NoiseEntry> for NoiseParams {
    fn from(value: json::NoiseEntry) -> Self {
        Self {
            amplitude: value.amplitude,
            frequency: value.frequency,
            seed: value.seed,
        }
    }
}

impl From<json::MaterialEntry> for MaterialDef {
    fn from(value: json::MaterialEntry) -> Self {
        Self {
            name: value.name,
            roughness: value.roughness,
            metallic: value.metallic,
            emissive: value.emissive,
            noise: value.noise.map(NoiseParams::from),
            scale: value.scale.unwrap_or(1.0),
        }
    }
}

/// Everything planning needs to know about materials: definitions, the
/// texture-to-material mapping, per-texture scale overrides and explicit
/// override images.
#[derive(Clone, Debug, Default)]
pub struct MaterialRegistry {
    materials: HashMap<String, MaterialDef>,
    mappings: HashMap<String, String>,
    scale_overrides: HashMap<String, f32>,
    overrides: Vec<OverrideRule>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the registry rooted at `base_path/registry.json`. Each section
    /// lives in its own file named by the root, any of which may be absent.
    pub fn from_file(base_path: &str) -> Result<Self> {
        let root_path = format!("{}/registry.json", base_path);
        info!("Loading material registry {}", root_path);
        let json_data = fs::read_to_string(&root_path)?;
        let info: json::Registry = serde_json::from_str(&json_data)?;

        let mut registry = MaterialRegistry::new();

        if let Some(file) = info.materials {
            let path = format!("{}/{}", base_path, file);
            debug!("Found materials file {}", path);
            let cfg: json::Materials = serde_json::from_str(&read_section(&file, &path)?)?;
            for entry in cfg.materials {
                info!("Registered material: {}", entry.name);
                registry.add_material(MaterialDef::from(entry));
            }
        }

        if let Some(file) = info.mappings {
            let path = format!("{}/{}", base_path, file);
            let cfg: json::Mappings = serde_json::from_str(&read_section(&file, &path)?)?;
            for entry in cfg.mappings {
                if !registry.materials.contains_key(&entry.material) {
                    warn!(
                        "mapping for texture {} names unknown material {}",
                        entry.texture, entry.material
                    );
                }
                registry.map_texture(&entry.texture, &entry.material);
            }
        }

        if let Some(file) = info.scales {
            let path = format!("{}/{}", base_path, file);
            let cfg: json::Scales = serde_json::from_str(&read_section(&file, &path)?)?;
            for entry in cfg.scales {
                registry.set_scale(&entry.texture, entry.scale);
            }
        }

        if let Some(file) = info.overrides {
            let path = format!("{}/{}", base_path, file);
            let cfg: json::Overrides = serde_json::from_str(&read_section(&file, &path)?)?;
            for entry in cfg.overrides {
                let layer = match entry.layer.as_str() {
                    "material" => OverrideLayer::MaterialParams,
                    "normal_depth" => OverrideLayer::NormalDepth,
                    other => {
                        warn!(
                            "override for texture {} has unknown layer '{}', skipping",
                            entry.texture, other
                        );
                        continue;
                    }
                };
                info!("Registered override: {} ({})", entry.texture, entry.layer);
                registry.add_override(OverrideRule {
                    texture_id: entry.texture,
                    source_path: entry.path,
                    layer,
                });
            }
        }

        Ok(registry)
    }

    pub fn add_material(&mut self, def: MaterialDef) {
        self.materials.insert(def.name.clone(), def);
    }

    pub fn map_texture(&mut self, texture_id: &str, material_name: &str) {
        self.mappings
            .insert(texture_id.to_string(), material_name.to_string());
    }

    pub fn set_scale(&mut self, texture_id: &str, scale: f32) {
        self.scale_overrides.insert(texture_id.to_string(), scale);
    }

    pub fn add_override(&mut self, rule: OverrideRule) {
        self.overrides.push(rule);
    }

    /// Resolve the material mapped to a texture, with the per-texture scale
    /// override already merged in.
    pub fn material_for(&self, texture_id: &str) -> Option<MaterialDef> {
        let name = self.mappings.get(texture_id)?;
        let mut def = self.materials.get(name)?.clone();
        if let Some(scale) = self.scale_overrides.get(texture_id) {
            def.scale = *scale;
        }
        Some(def)
    }

    pub fn scale_for(&self, texture_id: &str) -> Option<f32> {
        self.scale_overrides.get(texture_id).copied()
    }

    pub fn mapped_textures(&self) -> impl Iterator<Item = &String> {
        self.mappings.keys()
    }

    pub fn scale_overrides(&self) -> impl Iterator<Item = (&String, f32)> {
        self.scale_overrides.iter().map(|(k, v)| (k, *v))
    }

    pub fn overrides(&self) -> &[OverrideRule] {
        &self.overrides
    }
}

fn read_section(entry: &str, path: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|_| {
        Error::Loading(LoadingError {
            entry: entry.to_string(),
            path: path.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn scale_override_merges_into_material() {
        let mut registry = MaterialRegistry::new();
        registry.add_material(MaterialDef::flat("rock", 0.8));
        registry.map_texture("tiles/rock.png", "rock");
        registry.set_scale("tiles/rock.png", 2.0);

        let def = registry.material_for("tiles/rock.png").unwrap();
        assert_eq!(def.roughness, 0.8);
        assert_eq!(def.scale, 2.0);
    }

    #[test]
    fn unmapped_texture_resolves_to_none() {
        let registry = MaterialRegistry::new();
        assert!(registry.material_for("tiles/unknown.png").is_none());
    }

    #[test]
    fn from_file_loads_all_sections() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_str().unwrap();
        fs::write(
            dir.path().join("materials.json"),
            "{\"materials\":[{\"name\":\"rock\",\"roughness\":0.5,\"metallic\":0.0,\"emissive\":0.0}]}",
        )
        .unwrap();
        fs::write(
            dir.path().join("mappings.json"),
            "{\"mappings\":[{\"texture\":\"tiles/rock.png\",\"material\":\"rock\"}]}",
        )
        .unwrap();
        fs::write(
            dir.path().join("overrides.json"),
            "{\"overrides\":[{\"texture\":\"tiles/rock.png\",\"path\":\"overrides/rock.png\",\"layer\":\"normal_depth\"}]}",
        )
        .unwrap();
        fs::write(
            dir.path().join("registry.json"),
            "{\"materials\":\"materials.json\",\"mappings\":\"mappings.json\",\"overrides\":\"overrides.json\"}",
        )
        .unwrap();

        let registry = MaterialRegistry::from_file(base).unwrap();
        assert!(registry.material_for("tiles/rock.png").is_some());
        assert_eq!(registry.overrides().len(), 1);
        assert_eq!(registry.overrides()[0].layer, OverrideLayer::NormalDepth);
    }

    #[test]
    fn from_file_skips_unknown_override_layer() {
        let dir = tempdir().unwrap();
        let base = dir.path().to_str().unwrap();
        fs::write(
            dir.path().join("overrides.json"),
            "{\"overrides\":[{\"texture\":\"t.png\",\"path\":\"o.png\",\"layer\":\"specular\"}]}",
        )
        .unwrap();
        fs::write(
            dir.path().join("registry.json"),
            "{\"overrides\":\"overrides.json\"}",
        )
        .unwrap();

        let registry = MaterialRegistry::from_file(base).unwrap();
        assert!(registry.overrides().is_empty());
    }
}

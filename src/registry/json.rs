use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Copy, Default)]
pub struct NoiseEntry {
    pub amplitude: f32,
    pub frequency: f32,
    pub seed: u32,
}

#[derive(Deserialize, Serialize, Clone, Default)]
pub struct MaterialEntry {
    pub name: String,
    pub roughness: f32,
    pub metallic: f32,
    pub emissive: f32,
    pub noise: Option<NoiseEntry>,
    pub scale: Option<f32>,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct Materials {
    pub materials: Vec<MaterialEntry>,
}

#[derive(Deserialize, Serialize, Clone, Default)]
pub struct MappingEntry {
    pub texture: String,
    pub material: String,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct Mappings {
    pub mappings: Vec<MappingEntry>,
}

#[derive(Deserialize, Serialize, Clone, Default)]
pub struct ScaleEntry {
    pub texture: String,
    pub scale: f32,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct Scales {
    pub scales: Vec<ScaleEntry>,
}

#[derive(Deserialize, Serialize, Clone, Default)]
pub struct OverrideEntry {
    pub texture: String,
    pub path: String,
    /// "material" or "normal_depth".
    pub layer: String,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct Overrides {
    pub overrides: Vec<OverrideEntry>,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct Registry {
    pub materials: Option<String>,
    pub mappings: Option<String>,
    pub scales: Option<String>,
    pub overrides: Option<String>,
}

use bytemuck::{Pod, Zeroable};

/// Which derived layer a payload belongs to. Every page owns one GPU image
/// per layer; the store routes an upload by this tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    MaterialParams,
    NormalDepth,
}

pub const MATERIAL_CHANNELS: usize = 4;
pub const NORMAL_DEPTH_CHANNELS: usize = 4;

/// One texel of the compact material-parameter layer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialTexel {
    pub roughness: f32,
    pub metallic: f32,
    pub emissive: f32,
    pub occlusion: f32,
}

/// One texel of the normal/height layer: tangent-space normal plus depth.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct NormalDepthTexel {
    pub nx: f32,
    pub ny: f32,
    pub nz: f32,
    pub depth: f32,
}

/// Pixel data produced by one job, handed off by value from the worker that
/// computed it. Never mutated after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct TilePayload {
    pub layer: LayerKind,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl TilePayload {
    pub fn from_material_texels(width: u32, height: u32, texels: &[MaterialTexel]) -> Self {
        debug_assert_eq!(texels.len(), (width * height) as usize);
        Self {
            layer: LayerKind::MaterialParams,
            width,
            height,
            bytes: bytemuck::cast_slice(texels).to_vec(),
        }
    }

    pub fn from_normal_depth_texels(width: u32, height: u32, texels: &[NormalDepthTexel]) -> Self {
        debug_assert_eq!(texels.len(), (width * height) as usize);
        Self {
            layer: LayerKind::NormalDepth,
            width,
            height,
            bytes: bytemuck::cast_slice(texels).to_vec(),
        }
    }

    pub fn from_cached_bytes(layer: LayerKind, width: u32, height: u32, bytes: Vec<u8>) -> Self {
        Self {
            layer,
            width,
            height,
            bytes,
        }
    }

    /// Copies out of the byte buffer; the buffer itself carries no
    /// alignment guarantee.
    pub fn material_texels(&self) -> Vec<MaterialTexel> {
        bytemuck::pod_collect_to_vec(&self.bytes)
    }

    pub fn normal_depth_texels(&self) -> Vec<NormalDepthTexel> {
        bytemuck::pod_collect_to_vec(&self.bytes)
    }

    /// Expected byte length for a payload of `width * height` texels.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * MATERIAL_CHANNELS * std::mem::size_of::<f32>()
    }
}

use std::collections::HashMap;

use tracing::debug;

use crate::atlas::{AtlasQuery, AtlasRect, AtlasSnapshot, PageId, PageInfo};
use crate::registry::{MaterialDef, MaterialRegistry, OverrideLayer};

/// What a single job computes.
#[derive(Clone, Debug, PartialEq)]
pub enum JobPayload {
    /// Procedural material-parameter tile.
    MaterialTile { material: MaterialDef },
    /// Normal/height bake from the tile's source image.
    NormalDepthTile { scale: f32 },
    /// Replacement image for the material-parameter layer.
    MaterialOverride { source_path: String },
    /// Replacement image for the normal/height layer.
    NormalDepthOverride { source_path: String },
}

impl JobPayload {
    /// Derived layer this job's payload lands in.
    pub fn layer(&self) -> crate::texel::LayerKind {
        if self.is_normal_depth() {
            crate::texel::LayerKind::NormalDepth
        } else {
            crate::texel::LayerKind::MaterialParams
        }
    }

    pub fn is_normal_depth(&self) -> bool {
        matches!(
            self,
            JobPayload::NormalDepthTile { .. } | JobPayload::NormalDepthOverride { .. }
        )
    }

    pub fn is_override(&self) -> bool {
        matches!(
            self,
            JobPayload::MaterialOverride { .. } | JobPayload::NormalDepthOverride { .. }
        )
    }
}

/// One planned unit of compute targeting a single rect of a single page.
#[derive(Clone, Debug, PartialEq)]
pub struct TileJob {
    pub texture_id: String,
    pub page_id: PageId,
    pub rect: AtlasRect,
    pub priority: i32,
    pub payload: JobPayload,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub tile_jobs: usize,
    pub override_jobs: usize,
    pub missing_atlas_positions: usize,
    pub empty_rects: usize,
    /// Normal/depth bakes dropped because an explicit override replaces them.
    pub replaced_bakes: usize,
}

/// Immutable result of one planning pass. Job lists are totally ordered so
/// the same snapshot and registry always produce the same plan.
#[derive(Clone, Debug)]
pub struct BuildPlan {
    pub pages: Vec<PageInfo>,
    pub tile_jobs: Vec<TileJob>,
    pub override_jobs: Vec<TileJob>,
    pub stats: PlanStats,
}

impl BuildPlan {
    pub fn is_empty(&self) -> bool {
        self.tile_jobs.is_empty() && self.override_jobs.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PlanOptions {
    /// Cheap layer first: material tiles drain ahead of bakes on the same
    /// page when priorities differ.
    pub material_priority: i32,
    pub normal_depth_priority: i32,
    pub bake_normal_depth: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            material_priority: 10,
            normal_depth_priority: 0,
            bake_normal_depth: true,
        }
    }
}

struct NormalDepthSeed {
    texture_id: String,
    scale: f32,
}

/// Plan every tile and override job for one snapshot of the atlas.
///
/// Pure: it reads the snapshot, the position lookup and the registry, and
/// touches nothing else. Unresolvable textures and collapsed rects are
/// counted in [`PlanStats`], never raised.
pub fn create_plan(
    snapshot: &AtlasSnapshot,
    lookup: &dyn AtlasQuery,
    registry: &MaterialRegistry,
    source_assets: &[String],
    options: &PlanOptions,
) -> BuildPlan {
    let mut stats = PlanStats::default();
    let mut tile_jobs = Vec::new();

    // Material-parameter tiles: one per registered texture-to-material
    // mapping that resolves to a live, non-empty placement.
    for texture_id in registry.mapped_textures() {
        let Some((page_id, rect)) = resolve_rect(snapshot, lookup, texture_id, &mut stats) else {
            continue;
        };
        let Some(material) = registry.material_for(texture_id) else {
            debug!("texture {} maps to an undefined material, skipping", texture_id);
            continue;
        };
        tile_jobs.push(TileJob {
            texture_id: texture_id.clone(),
            page_id,
            rect,
            priority: options.material_priority,
            payload: JobPayload::MaterialTile { material },
        });
    }

    // Override jobs are independent of procedural materials: presence of a
    // rule alone schedules the job. Keyed by (page, rect, layer); a later
    // rule for the same key replaces the earlier one.
    let mut override_map: HashMap<(PageId, AtlasRect, OverrideLayer), TileJob> = HashMap::new();
    for rule in registry.overrides() {
        let Some((page_id, rect)) = resolve_rect(snapshot, lookup, &rule.texture_id, &mut stats)
        else {
            continue;
        };
        let payload = match rule.layer {
            OverrideLayer::MaterialParams => JobPayload::MaterialOverride {
                source_path: rule.source_path.clone(),
            },
            OverrideLayer::NormalDepth => JobPayload::NormalDepthOverride {
                source_path: rule.source_path.clone(),
            },
        };
        override_map.insert(
            (page_id, rect, rule.layer),
            TileJob {
                texture_id: rule.texture_id.clone(),
                page_id,
                rect,
                priority: options.material_priority,
                payload,
            },
        );
    }

    // Normal/depth bakes merge three sources of increasing specificity; a
    // later source overwrites the scale recorded by an earlier one for the
    // same (page, rect).
    if options.bake_normal_depth {
        let mut seeds: HashMap<(PageId, AtlasRect), NormalDepthSeed> = HashMap::new();

        // 1. Raw placements: identity scale, no source identity beyond the
        //    slot itself.
        for placement in snapshot.positions.iter().flatten() {
            let Some(page) = snapshot.page(placement.page_id) else {
                stats.missing_atlas_positions += 1;
                continue;
            };
            let Some(rect) = placement.resolve(page) else {
                stats.empty_rects += 1;
                continue;
            };
            seeds.insert(
                (placement.page_id, rect),
                NormalDepthSeed {
                    texture_id: String::new(),
                    scale: 1.0,
                },
            );
        }

        // 2. Scale map keyed by texture.
        for (texture_id, scale) in registry.scale_overrides() {
            let Some((page_id, rect)) = resolve_rect(snapshot, lookup, texture_id, &mut stats)
            else {
                continue;
            };
            seeds.insert(
                (page_id, rect),
                NormalDepthSeed {
                    texture_id: texture_id.clone(),
                    scale,
                },
            );
        }

        // 3. Full asset scan: establishes source identity; scale comes from
        //    the registry when it has one.
        for texture_id in source_assets {
            let Some((page_id, rect)) = resolve_rect(snapshot, lookup, texture_id, &mut stats)
            else {
                continue;
            };
            let scale = registry.scale_for(texture_id).unwrap_or(1.0);
            seeds.insert(
                (page_id, rect),
                NormalDepthSeed {
                    texture_id: texture_id.clone(),
                    scale,
                },
            );
        }

        for ((page_id, rect), seed) in seeds {
            // An explicit override replaces the bake outright.
            if override_map.contains_key(&(page_id, rect, OverrideLayer::NormalDepth)) {
                stats.replaced_bakes += 1;
                continue;
            }
            tile_jobs.push(TileJob {
                texture_id: seed.texture_id,
                page_id,
                rect,
                priority: options.normal_depth_priority,
                payload: JobPayload::NormalDepthTile { scale: seed.scale },
            });
        }
    }

    let mut override_jobs: Vec<TileJob> = override_map.into_values().collect();
    sort_jobs(&mut tile_jobs);
    sort_jobs(&mut override_jobs);

    stats.tile_jobs = tile_jobs.len();
    stats.override_jobs = override_jobs.len();
    debug!(
        "planned {} tile jobs, {} override jobs ({} missing, {} empty, {} replaced)",
        stats.tile_jobs,
        stats.override_jobs,
        stats.missing_atlas_positions,
        stats.empty_rects,
        stats.replaced_bakes
    );

    BuildPlan {
        pages: snapshot.pages.clone(),
        tile_jobs,
        override_jobs,
        stats,
    }
}

fn resolve_rect(
    snapshot: &AtlasSnapshot,
    lookup: &dyn AtlasQuery,
    texture_id: &str,
    stats: &mut PlanStats,
) -> Option<(PageId, AtlasRect)> {
    let Some(placement) = lookup.resolve_position(texture_id) else {
        stats.missing_atlas_positions += 1;
        return None;
    };
    let Some(page) = snapshot.page(placement.page_id) else {
        stats.missing_atlas_positions += 1;
        return None;
    };
    let Some(rect) = placement.resolve(page) else {
        stats.empty_rects += 1;
        return None;
    };
    Some((placement.page_id, rect))
}

/// Total order shared by every job list: page, priority (high first), then
/// rect position/extent, then source identity. Makes plans reproducible for
/// identical inputs.
fn sort_jobs(jobs: &mut [TileJob]) {
    jobs.sort_by(|a, b| {
        a.page_id
            .cmp(&b.page_id)
            .then(b.priority.cmp(&a.priority))
            .then(a.rect.y.cmp(&b.rect.y))
            .then(a.rect.x.cmp(&b.rect.x))
            .then(a.rect.width.cmp(&b.rect.width))
            .then(a.rect.height.cmp(&b.rect.height))
            .then(a.texture_id.cmp(&b.texture_id))
    });
}

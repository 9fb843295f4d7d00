use glam::Vec2;

/// Index of one atlas page. Pages are dense and small in number, so a plain
/// integer id is enough; the texture store resolves it to its own image
/// object.
pub type PageId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageInfo {
    pub page_id: PageId,
    pub width: u32,
    pub height: u32,
}

/// Integer-pixel rectangle inside one page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Placement of one source image inside the atlas, in normalized UV space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TilePlacement {
    pub page_id: PageId,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

impl TilePlacement {
    /// Resolve the normalized placement to integer pixels against the page
    /// dimensions. Min edges floor, max edges ceil, so a placement never
    /// loses covered texels to rounding. Returns `None` when the rect
    /// collapses to zero area.
    pub fn resolve(&self, page: &PageInfo) -> Option<AtlasRect> {
        let x0 = (self.uv_min.x * page.width as f32).floor().max(0.0) as u32;
        let y0 = (self.uv_min.y * page.height as f32).floor().max(0.0) as u32;
        let x1 = (self.uv_max.x * page.width as f32).ceil().max(0.0) as u32;
        let y1 = (self.uv_max.y * page.height as f32).ceil().max(0.0) as u32;
        let x1 = x1.min(page.width);
        let y1 = y1.min(page.height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(AtlasRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Immutable capture of the atlas layout at one instant.
///
/// Snapshots are taken whenever the orchestrator needs a consistent view and
/// are simply dropped once superseded. `positions` is sparse and addressed by
/// the same slot index the atlas itself uses.
#[derive(Clone, Debug)]
pub struct AtlasSnapshot {
    pub pages: Vec<PageInfo>,
    pub positions: Vec<Option<TilePlacement>>,
    pub reload_epoch: u64,
    pub live_tile_count: usize,
}

impl AtlasSnapshot {
    pub fn new(
        pages: Vec<PageInfo>,
        positions: Vec<Option<TilePlacement>>,
        reload_epoch: u64,
    ) -> Self {
        let live_tile_count = positions.iter().filter(|p| p.is_some()).count();
        Self {
            pages,
            positions,
            reload_epoch,
            live_tile_count,
        }
    }

    pub fn page(&self, page_id: PageId) -> Option<&PageInfo> {
        self.pages.iter().find(|p| p.page_id == page_id)
    }
}

/// Read side of the atlas consumed by planning. Must be side-effect-free;
/// the planner calls it many times per plan.
pub trait AtlasQuery {
    fn resolve_position(&self, texture_id: &str) -> Option<TilePlacement>;
}

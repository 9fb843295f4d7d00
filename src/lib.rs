//! Derived-texel build orchestration for a texture atlas.
//!
//! Two derived layers are produced per atlas page: a compact
//! material-parameter layer (procedural, cheap) and a normal/height layer
//! (an injected multi-pass solver, expensive). The crate plans per-tile
//! work deterministically, runs it on a bounded worker pool with a
//! content-addressable disk cache in front of the compute, and applies
//! finished tiles to GPU-resident storage from the render thread under a
//! per-frame budget. Superseded work is cancelled cooperatively and stale
//! results are discarded by generation id.

pub mod atlas;
pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod registry;
pub mod reserve;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod texel;

pub use atlas::{AtlasQuery, AtlasRect, AtlasSnapshot, PageId, PageInfo, TilePlacement};
pub use config::BakeOptions;
pub use error::{Error, Result};
pub use plan::{create_plan, BuildPlan, JobPayload, PlanOptions, TileJob};
pub use registry::{MaterialDef, MaterialRegistry, OverrideLayer, OverrideRule};
pub use scheduler::{BakeScheduler, CompletedJob};
pub use session::{BuildProgress, BuildSession, SessionState};
pub use store::{FsAssetStore, SourceAssetStore, TextureStore};
pub use texel::{LayerKind, MaterialTexel, NormalDepthTexel, TilePayload};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a default fmt subscriber for standalone tools and tests. A host
/// application that already configured tracing keeps its own subscriber.
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

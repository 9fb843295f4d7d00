use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use tracing::{debug, info, warn};

use crate::atlas::{AtlasQuery, AtlasRect, AtlasSnapshot, PageId};
use crate::cache::{
    material_tile_key, normal_depth_tile_key, override_key, CacheKey, CacheKind, CacheStats,
    NoopTileCache, TileCache,
};
use crate::config::BakeOptions;
use crate::pipeline::{
    ComputeContext, MaterialParamsComputer, NormalDepthComputer, NormalDepthSolver,
    OverrideComputer, TileComputer,
};
use crate::plan::{create_plan, BuildPlan, JobPayload, PlanOptions, TileJob};
use crate::registry::MaterialRegistry;
use crate::reserve::ReservationPool;
use crate::session::{BuildProgress, BuildSession, SessionState, SessionShared};
use crate::store::{SourceAssetStore, TextureStore};
use crate::texel::{LayerKind, TilePayload};

/// One computed result on its way from a worker to the render thread.
/// Handed off by value; nothing is mutated after it is queued.
pub struct CompletedJob {
    pub generation_id: u64,
    pub job: TileJob,
    pub payload: TilePayload,
}

/// Everything a worker task needs, bundled once per session so spawned
/// closures stay small.
struct WorkerCtx {
    generation_id: u64,
    shared: Arc<SessionShared>,
    cache: Arc<dyn TileCache>,
    assets: Arc<dyn SourceAssetStore>,
    material: Arc<dyn TileComputer>,
    overrides: Arc<dyn TileComputer>,
    normal_depth: Option<Arc<dyn TileComputer>>,
    disk_gate: ReservationPool,
    gpu_gate: ReservationPool,
    completed: Arc<SegQueue<CompletedJob>>,
    format_epoch: u32,
}

/// Orchestrates one atlas's derived-data builds: plans are turned into
/// sessions, sessions run on a private worker pool, and completed results
/// are applied to the texture store from the render thread one budgeted
/// batch per frame.
///
/// Owned by whoever owns the atlas and its texture store; there is no
/// global instance.
pub struct BakeScheduler {
    options: BakeOptions,
    cache: Arc<dyn TileCache>,
    assets: Arc<dyn SourceAssetStore>,
    material: Arc<dyn TileComputer>,
    overrides: Arc<dyn TileComputer>,
    normal_depth: Option<Arc<dyn TileComputer>>,
    pool: rayon::ThreadPool,
    disk_gate: ReservationPool,
    gpu_gate: ReservationPool,
    completed: Arc<SegQueue<CompletedJob>>,
    active: Option<BuildSession>,
    /// Override results waiting for their base tile to land first.
    holdback: Vec<CompletedJob>,
    /// Base (page, rect, layer) triples in the active plan, and the subset
    /// already uploaded. Gives overrides their apply-after-base ordering.
    base_targets: HashSet<(PageId, AtlasRect, LayerKind)>,
    applied_bases: HashSet<(PageId, AtlasRect, LayerKind)>,
}

impl BakeScheduler {
    pub fn new(
        options: BakeOptions,
        cache: Arc<dyn TileCache>,
        assets: Arc<dyn SourceAssetStore>,
    ) -> Self {
        let options = options.normalized();
        let cache: Arc<dyn TileCache> = if options.cache_enabled {
            cache
        } else {
            info!("tile cache disabled, using no-op store");
            Arc::new(NoopTileCache)
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.worker_threads())
            .thread_name(|i| format!("tile-bake-{i}"))
            .build()
            .expect("failed to build tile bake thread pool");
        let disk_gate = ReservationPool::new(options.disk_io_concurrency.max(0) as usize);
        let gpu_gate = ReservationPool::new(options.gpu_prep_concurrency.max(0) as usize);
        Self {
            options,
            cache,
            assets,
            material: Arc::new(MaterialParamsComputer::new()),
            overrides: Arc::new(OverrideComputer::new()),
            normal_depth: None,
            pool,
            disk_gate,
            gpu_gate,
            completed: Arc::new(SegQueue::new()),
            active: None,
            holdback: Vec::new(),
            base_targets: HashSet::new(),
            applied_bases: HashSet::new(),
        }
    }

    /// Install the external normal/height solver. Without one, normal/depth
    /// bake jobs are planned but complete as no-ops.
    pub fn set_normal_depth_solver(&mut self, solver: Arc<dyn NormalDepthSolver>) {
        self.normal_depth = Some(Arc::new(NormalDepthComputer::new(solver)));
    }

    pub fn options(&self) -> &BakeOptions {
        &self.options
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Plan against a fresh snapshot and start the resulting session,
    /// superseding whatever was running.
    pub fn rebuild(
        &mut self,
        snapshot: &AtlasSnapshot,
        lookup: &dyn AtlasQuery,
        registry: &MaterialRegistry,
        source_assets: &[String],
        plan_options: &PlanOptions,
    ) -> u64 {
        let plan = create_plan(snapshot, lookup, registry, source_assets, plan_options);
        self.start_session(&plan)
    }

    /// Atomically replace the active session. The previous session is
    /// cancelled and its unconsumed results dropped; work it already applied
    /// stays in the texture store until the new generation overwrites it.
    pub fn start_session(&mut self, plan: &BuildPlan) -> u64 {
        self.cancel_active();
        while self.completed.pop().is_some() {}
        self.holdback.clear();
        self.applied_bases.clear();

        let session = BuildSession::new(plan);
        let generation_id = session.generation_id();
        info!(
            "starting build session generation {} ({} tile jobs, {} override jobs)",
            generation_id,
            plan.tile_jobs.len(),
            plan.override_jobs.len()
        );

        self.base_targets = plan
            .tile_jobs
            .iter()
            .map(|job| (job.page_id, job.rect, job.payload.layer()))
            .collect();

        session.mark_started();
        let ctx = Arc::new(WorkerCtx {
            generation_id,
            shared: session.shared.clone(),
            cache: self.cache.clone(),
            assets: self.assets.clone(),
            material: self.material.clone(),
            overrides: self.overrides.clone(),
            normal_depth: self.normal_depth.clone(),
            disk_gate: self.disk_gate.clone(),
            gpu_gate: self.gpu_gate.clone(),
            completed: self.completed.clone(),
            format_epoch: self.options.cache_format_epoch,
        });

        let cpu_jobs = session.cpu_jobs();
        let override_jobs = session.override_jobs();
        if self.options.async_build_enabled {
            for jobs in [cpu_jobs, override_jobs] {
                for idx in 0..jobs.len() {
                    let ctx = ctx.clone();
                    let jobs = jobs.clone();
                    self.pool.spawn(move || run_job(&ctx, &jobs[idx]));
                }
            }
        } else {
            for jobs in [cpu_jobs, override_jobs] {
                for job in jobs.iter() {
                    run_job(&ctx, job);
                }
            }
        }

        self.active = Some(session);
        generation_id
    }

    /// Cooperatively cancel the active session, if any. Workers notice at
    /// their next safe point; queued results stop being applied immediately.
    pub fn cancel_active(&mut self) {
        if let Some(session) = &self.active {
            if session.state() == SessionState::Running {
                info!(
                    "cancelling build session generation {}",
                    session.generation_id()
                );
            }
            session.cancel();
        }
    }

    pub fn progress(&self) -> Option<BuildProgress> {
        self.active.as_ref().map(BuildSession::progress)
    }

    pub fn is_idle(&self) -> bool {
        match &self.active {
            None => true,
            Some(session) => !matches!(session.state(), SessionState::Running),
        }
    }

    /// Render-thread step: apply up to the configured budget of completed
    /// results to the texture store, then return. Never blocks on compute.
    /// Returns the number of uploads performed.
    pub fn drain_completed(&mut self, store: &mut dyn TextureStore) -> usize {
        let Some(session) = &self.active else {
            // No session; drop whatever leaked into the queue.
            while self.completed.pop().is_some() {}
            return 0;
        };
        let generation_id = session.generation_id();

        if session.is_cancelled() {
            // A cancelled generation applies nothing more.
            let mut dropped = 0;
            while self.completed.pop().is_some() {
                dropped += 1;
            }
            dropped += self.holdback.len();
            self.holdback.clear();
            if dropped > 0 {
                debug!(
                    "dropped {} unapplied results for cancelled generation {}",
                    dropped, generation_id
                );
            }
            return 0;
        }

        let deadline = self
            .options
            .per_frame_apply_millis
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let budget = self.options.per_frame_apply_budget.max(1);
        let mut applied = 0;
        let shared = session.shared.clone();

        // Results held from earlier frames first, then fresh completions.
        let mut pending: Vec<CompletedJob> = Vec::new();
        std::mem::swap(&mut pending, &mut self.holdback);
        let mut pending: std::collections::VecDeque<CompletedJob> = pending.into();

        loop {
            if applied >= budget {
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }

            let item = match pending.pop_front() {
                Some(item) => item,
                None => match self.completed.pop() {
                    Some(item) => item,
                    None => break,
                },
            };

            // Stale-result guard: results from a superseded generation are
            // discarded unapplied.
            if item.generation_id != generation_id {
                debug!(
                    "discarding stale result for generation {} (active {})",
                    item.generation_id, generation_id
                );
                continue;
            }

            let target = (item.job.page_id, item.job.rect, item.job.payload.layer());
            if item.job.payload.is_override()
                && self.base_targets.contains(&target)
                && !self.applied_bases.contains(&target)
            {
                // The base tile for this rect has not landed yet. Hold the
                // override so it still applies second, unless compute is
                // done and the queue is dry, in which case the base tile
                // failed and is never coming.
                let base_may_still_arrive =
                    !(session.compute_done() && self.completed.is_empty() && pending.is_empty());
                if base_may_still_arrive {
                    self.holdback.push(item);
                    continue;
                }
            }

            match store.upload_region(item.job.page_id, item.job.rect, &item.payload) {
                Ok(()) => {
                    if !item.job.payload.is_override() {
                        self.applied_bases.insert(target);
                        // An override for this rect may have been held back;
                        // let it through in this same drain.
                        let mut released = Vec::new();
                        let mut kept = Vec::new();
                        for held in self.holdback.drain(..) {
                            let held_target =
                                (held.job.page_id, held.job.rect, held.job.payload.layer());
                            if held_target == target {
                                released.push(held);
                            } else {
                                kept.push(held);
                            }
                        }
                        self.holdback = kept;
                        for held in released {
                            pending.push_back(held);
                        }
                    }
                    applied += 1;
                }
                Err(err) => {
                    // One failed upload must not starve the rest of the
                    // frame's drain.
                    warn!(
                        "upload for page {} rect {:?} failed: {}",
                        item.job.page_id, item.job.rect, err
                    );
                    shared
                        .errors
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
            }
        }

        // Anything still pending goes back to the holdback list for the
        // next frame.
        self.holdback.extend(pending);

        if session.compute_done()
            && self.completed.is_empty()
            && self.holdback.is_empty()
            && !session.is_cancelled()
            && session.state() != SessionState::Completed
        {
            session.mark_complete();
            info!(
                "build session generation {} complete",
                session.generation_id()
            );
        }

        applied
    }
}

fn cache_key_for(ctx: &WorkerCtx, job: &TileJob) -> Option<CacheKey> {
    match &job.payload {
        JobPayload::MaterialTile { material } => {
            Some(material_tile_key(&job.rect, material, ctx.format_epoch))
        }
        JobPayload::NormalDepthTile { scale } => {
            if job.texture_id.is_empty() {
                return None;
            }
            let source_len = ctx.assets.content_len(&job.texture_id).unwrap_or(0);
            Some(normal_depth_tile_key(
                &job.rect,
                &job.texture_id,
                source_len,
                *scale,
                ctx.format_epoch,
            ))
        }
        JobPayload::MaterialOverride { source_path } => {
            let source_len = ctx.assets.content_len(source_path).unwrap_or(0);
            Some(override_key(
                CacheKind::MaterialOverride,
                &job.rect,
                &job.texture_id,
                source_path,
                source_len,
                ctx.format_epoch,
            ))
        }
        JobPayload::NormalDepthOverride { source_path } => {
            let source_len = ctx.assets.content_len(source_path).unwrap_or(0);
            Some(override_key(
                CacheKind::NormalDepthOverride,
                &job.rect,
                &job.texture_id,
                source_path,
                source_len,
                ctx.format_epoch,
            ))
        }
    }
}

fn computer_for<'a>(ctx: &'a WorkerCtx, job: &TileJob) -> Option<&'a Arc<dyn TileComputer>> {
    match &job.payload {
        JobPayload::MaterialTile { .. } => Some(&ctx.material),
        JobPayload::NormalDepthTile { .. } => ctx.normal_depth.as_ref(),
        JobPayload::MaterialOverride { .. } | JobPayload::NormalDepthOverride { .. } => {
            Some(&ctx.overrides)
        }
    }
}

/// One worker task: consult the cache, compute on miss, store, hand off.
/// Every exit records the job as completed so session progress converges.
fn run_job(ctx: &WorkerCtx, job: &TileJob) {
    if ctx.shared.cancel.is_cancelled() {
        ctx.shared.record_completed(job);
        return;
    }

    let key = cache_key_for(ctx, job);

    if let Some(key) = &key {
        let cached = {
            let _slot = ctx.disk_gate.acquire();
            ctx.cache.try_load(key)
        };
        if let Some(bytes) = cached {
            if bytes.len() == TilePayload::expected_len(job.rect.width, job.rect.height) {
                ctx.shared
                    .cache_hits
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                // Staging toward the GPU-visible queue goes through the
                // GPU-adjacent gate; the render thread itself never waits.
                let _slot = ctx.gpu_gate.acquire();
                ctx.completed.push(CompletedJob {
                    generation_id: ctx.generation_id,
                    job: job.clone(),
                    payload: TilePayload::from_cached_bytes(
                        job.payload.layer(),
                        job.rect.width,
                        job.rect.height,
                        bytes,
                    ),
                });
                ctx.shared.record_completed(job);
                return;
            }
            warn!(
                "cached payload for {} has unexpected length, recomputing",
                key.file_name()
            );
        }
        ctx.shared
            .cache_misses
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    let Some(computer) = computer_for(ctx, job) else {
        // No solver installed: the tile keeps its prior content.
        ctx.shared.record_completed(job);
        return;
    };

    let compute_ctx = ComputeContext {
        job,
        assets: ctx.assets.as_ref(),
        cancel: &ctx.shared.cancel,
    };
    let outcome = match computer.compute(&compute_ctx) {
        Ok(outcome) => outcome,
        Err(err) => {
            // A single failing tile is absorbed; the rest of the plan
            // proceeds and the tile keeps its default content.
            warn!("compute for texture '{}' failed: {}", job.texture_id, err);
            ctx.shared
                .errors
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            ctx.shared.record_completed(job);
            return;
        }
    };

    let Some(payload) = outcome.output else {
        ctx.shared.record_completed(job);
        return;
    };

    if let Some(key) = &key {
        if !ctx.shared.cancel.is_cancelled() {
            let _slot = ctx.disk_gate.acquire();
            ctx.cache
                .store(key, payload.width, payload.height, &payload.bytes);
        }
    }

    if outcome.requires_apply {
        let _slot = ctx.gpu_gate.acquire();
        ctx.completed.push(CompletedJob {
            generation_id: ctx.generation_id,
            job: job.clone(),
            payload,
        });
    }
    ctx.shared.record_completed(job);
}

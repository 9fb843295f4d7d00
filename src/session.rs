use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::atlas::PageInfo;
use crate::pipeline::CancelToken;
use crate::plan::{BuildPlan, TileJob};

/// Process-wide generation counter. Ids are strictly increasing and never
/// reused for the process lifetime, which is what makes the stale-result
/// guard sound.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation_id() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running,
    Completed,
    Cancelled,
}

/// Value snapshot of one session's progress, readable from any thread
/// without taking a lock. Counters are copied out of atomics; the snapshot
/// itself is plain data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildProgress {
    pub generation_id: u64,
    pub total_tiles: usize,
    pub completed_tiles: usize,
    pub total_normal_depth_jobs: usize,
    pub completed_normal_depth_jobs: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub errors: usize,
    pub is_complete: bool,
    pub is_cancelled: bool,
}

pub(crate) struct SessionShared {
    pub cancel: CancelToken,
    pub started: AtomicBool,
    pub complete: AtomicBool,
    pub completed_tiles: AtomicUsize,
    pub completed_normal_depth: AtomicUsize,
    pub errors: AtomicUsize,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            cancel: CancelToken::new(),
            started: AtomicBool::new(false),
            complete: AtomicBool::new(false),
            completed_tiles: AtomicUsize::new(0),
            completed_normal_depth: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Called after the job's result (if any) is already queued; the
    /// release pairs with the acquire in [`BuildSession::compute_done`] so a
    /// full count implies every queued result is visible to the drain.
    pub fn record_completed(&self, job: &TileJob) {
        if job.payload.is_normal_depth() {
            self.completed_normal_depth.fetch_add(1, Ordering::Release);
        } else {
            self.completed_tiles.fetch_add(1, Ordering::Release);
        }
    }
}

/// One generation's worth of planned work plus its cancellation state.
/// Exactly one session is active per scheduler; superseded sessions are
/// cancelled and their unconsumed queues dropped.
pub struct BuildSession {
    generation_id: u64,
    pages: Vec<PageInfo>,
    cpu_jobs: Arc<Vec<TileJob>>,
    override_jobs: Arc<Vec<TileJob>>,
    total_tiles: usize,
    total_normal_depth: usize,
    pub(crate) shared: Arc<SessionShared>,
}

impl BuildSession {
    pub fn new(plan: &BuildPlan) -> Self {
        let mut total_tiles = 0;
        let mut total_normal_depth = 0;
        for job in plan.tile_jobs.iter().chain(plan.override_jobs.iter()) {
            if job.payload.is_normal_depth() {
                total_normal_depth += 1;
            } else {
                total_tiles += 1;
            }
        }
        Self {
            generation_id: next_generation_id(),
            pages: plan.pages.clone(),
            cpu_jobs: Arc::new(plan.tile_jobs.clone()),
            override_jobs: Arc::new(plan.override_jobs.clone()),
            total_tiles,
            total_normal_depth,
            shared: Arc::new(SessionShared::new()),
        }
    }

    pub fn generation_id(&self) -> u64 {
        self.generation_id
    }

    pub fn pages(&self) -> &[PageInfo] {
        &self.pages
    }

    pub fn cpu_jobs(&self) -> Arc<Vec<TileJob>> {
        self.cpu_jobs.clone()
    }

    pub fn override_jobs(&self) -> Arc<Vec<TileJob>> {
        self.override_jobs.clone()
    }

    pub fn job_count(&self) -> usize {
        self.cpu_jobs.len() + self.override_jobs.len()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }

    pub(crate) fn mark_started(&self) {
        self.shared.started.store(true, Ordering::Relaxed);
    }

    pub(crate) fn mark_complete(&self) {
        self.shared.complete.store(true, Ordering::Relaxed);
    }

    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// True once every planned job's compute stage has finished.
    pub fn compute_done(&self) -> bool {
        let done = self.shared.completed_tiles.load(Ordering::Acquire)
            + self.shared.completed_normal_depth.load(Ordering::Acquire);
        done >= self.job_count()
    }

    pub fn state(&self) -> SessionState {
        if self.shared.cancel.is_cancelled() {
            return SessionState::Cancelled;
        }
        if self.shared.complete.load(Ordering::Relaxed) {
            return SessionState::Completed;
        }
        if self.shared.started.load(Ordering::Relaxed) {
            return SessionState::Running;
        }
        SessionState::NotStarted
    }

    pub fn progress(&self) -> BuildProgress {
        BuildProgress {
            generation_id: self.generation_id,
            total_tiles: self.total_tiles,
            completed_tiles: self.shared.completed_tiles.load(Ordering::Relaxed),
            total_normal_depth_jobs: self.total_normal_depth,
            completed_normal_depth_jobs: self
                .shared
                .completed_normal_depth
                .load(Ordering::Relaxed),
            cache_hits: self.shared.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.shared.cache_misses.load(Ordering::Relaxed),
            errors: self.shared.errors.load(Ordering::Relaxed),
            is_complete: self.state() == SessionState::Completed,
            is_cancelled: self.is_cancelled(),
        }
    }
}

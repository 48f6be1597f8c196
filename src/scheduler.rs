//! Frame generation scheduling
//!
//! Produces every frame of an animation, in index order, either on the
//! calling thread or across a bounded worker pool.
//!
//! # How It Works
//!
//! 1. Small animations (at most [`SEQUENTIAL_THRESHOLD`] frames) or runs with
//!    concurrency disabled are composed sequentially.
//! 2. Otherwise one task per frame index is dispatched to a pool of
//!    `max_workers` threads. Each task writes only its own result slot.
//! 3. Once every task has finished, slots are walked in index order. A slot
//!    whose task failed (or panicked) is recomputed synchronously; only a
//!    failure of that retry is returned to the caller.

use rayon::prelude::*;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::compositor::{ComposeError, ComposeFrame, Frame};
use crate::params::ResolvedPerformance;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Frame counts at or below this are always generated sequentially.
pub const SEQUENTIAL_THRESHOLD: u32 = 4;

/// How a batch of frames was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Sequential,
    Concurrent,
}

/// Statistics about one generation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    pub mode: GenerationMode,
    /// Worker threads used (1 when sequential)
    pub workers: usize,
    pub frames: u32,
    /// Indices recomputed after their task failed
    pub retried: Vec<u32>,
    pub duration_ms: u64,
}

/// Generates ordered frame lists.
#[derive(Debug, Clone, Copy)]
pub struct FrameScheduler {
    perf: ResolvedPerformance,
}

impl FrameScheduler {
    pub fn new(perf: ResolvedPerformance) -> Self {
        Self { perf }
    }

    /// Mode and worker count that `generate` will use for `frame_count` frames.
    pub fn plan(&self, frame_count: u32) -> (GenerationMode, usize) {
        if !self.perf.enable_concurrency || frame_count <= SEQUENTIAL_THRESHOLD {
            return (GenerationMode::Sequential, 1);
        }
        let workers = self.perf.max_workers.max(1).min(frame_count as usize);
        (GenerationMode::Concurrent, workers)
    }

    /// Generate frames `0..frame_count`, in order.
    pub fn generate(
        &self,
        frames: &dyn ComposeFrame,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<Frame>, ComposeError> {
        self.generate_with_stats(frames, progress).map(|(frames, _)| frames)
    }

    /// Like [`generate`](Self::generate), also returning batch statistics.
    #[tracing::instrument(skip_all, fields(frames = frames.frame_count()))]
    pub fn generate_with_stats(
        &self,
        frames: &dyn ComposeFrame,
        progress: &dyn ProgressReporter,
    ) -> Result<(Vec<Frame>, GenerationStats), ComposeError> {
        let start = Instant::now();
        let total = frames.frame_count();
        let (mode, workers) = self.plan(total);

        let result = match mode {
            GenerationMode::Sequential => {
                progress.report(ProgressEvent::FramesStarted { total, workers, concurrent: false });
                generate_sequential(frames, progress).map(|f| (f, Vec::new(), mode, 1))
            }
            GenerationMode::Concurrent => match build_pool(workers) {
                Ok(pool) => {
                    progress.report(ProgressEvent::FramesStarted {
                        total,
                        workers,
                        concurrent: true,
                    });
                    generate_concurrent(&pool, frames, progress)
                        .map(|(f, retried)| (f, retried, mode, workers))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "worker pool unavailable, generating sequentially");
                    progress.report(ProgressEvent::Warning {
                        message: format!("worker pool unavailable ({}), generating sequentially", e),
                    });
                    progress.report(ProgressEvent::FramesStarted {
                        total,
                        workers: 1,
                        concurrent: false,
                    });
                    generate_sequential(frames, progress)
                        .map(|f| (f, Vec::new(), GenerationMode::Sequential, 1))
                }
            },
        };

        let (ordered, retried, mode, workers) = result?;
        let duration_ms = start.elapsed().as_millis() as u64;
        progress.report(ProgressEvent::FramesCompleted { total, duration_ms });
        tracing::debug!(?mode, workers, duration_ms, "frames generated");

        let stats = GenerationStats { mode, workers, frames: total, retried, duration_ms };
        Ok((ordered, stats))
    }
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("pngbob-frame-{}", i))
        .build()
}

fn generate_sequential(
    frames: &dyn ComposeFrame,
    progress: &dyn ProgressReporter,
) -> Result<Vec<Frame>, ComposeError> {
    let total = frames.frame_count();
    let mut ordered = Vec::with_capacity(total as usize);
    for index in 0..total {
        ordered.push(frames.compose(index)?);
        progress.report(ProgressEvent::FrameCompleted { index, total });
    }
    Ok(ordered)
}

fn generate_concurrent(
    pool: &rayon::ThreadPool,
    frames: &dyn ComposeFrame,
    progress: &dyn ProgressReporter,
) -> Result<(Vec<Frame>, Vec<u32>), ComposeError> {
    let total = frames.frame_count();

    // Indexed collect: slot i always holds the outcome of task i.
    let slots: Vec<Result<Frame, ComposeError>> =
        pool.install(|| (0..total).into_par_iter().map(|index| run_task(frames, index)).collect());

    let mut ordered = Vec::with_capacity(slots.len());
    let mut retried = Vec::new();
    for (index, slot) in (0..total).zip(slots) {
        let frame = match slot {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(index, error = %err, "frame task failed, recomputing");
                progress.report(ProgressEvent::FrameRetried { index, reason: err.to_string() });
                retried.push(index);
                frames.compose(index)?
            }
        };
        progress.report(ProgressEvent::FrameCompleted { index, total });
        ordered.push(frame);
    }
    Ok((ordered, retried))
}

/// Run one compositing task, turning a panic into an error for its slot.
fn run_task(frames: &dyn ComposeFrame, index: u32) -> Result<Frame, ComposeError> {
    match panic::catch_unwind(AssertUnwindSafe(|| frames.compose(index))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string());
            Err(ComposeError::TaskFailed { index, reason })
        }
    }
}

//! Animation and performance settings
//!
//! Settings are plain data with defaults. [`PerformanceOptions`] is resolved
//! once, at pipeline configuration time, against a [`ParallelismProvider`]
//! so worker counts never depend on ambient global state.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default number of frames in one bob cycle.
pub const DEFAULT_FRAME_COUNT: u32 = 30;
/// Default bob amplitude in pixels.
pub const DEFAULT_BOB_HEIGHT: u32 = 10;
/// Default display time of each frame in milliseconds.
pub const DEFAULT_FRAME_DURATION_MS: u32 = 80;
/// Upper bound on the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Shape and timing of the animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationParams {
    pub frame_count: u32,
    pub bob_height: u32,
    pub frame_duration_ms: u32,
}

impl Default for AnimationParams {
    fn default() -> Self {
        Self {
            frame_count: DEFAULT_FRAME_COUNT,
            bob_height: DEFAULT_BOB_HEIGHT,
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
        }
    }
}

impl AnimationParams {
    pub fn new(frame_count: u32, bob_height: u32, frame_duration_ms: u32) -> Self {
        Self { frame_count, bob_height, frame_duration_ms }
    }

    /// Reject out-of-range values. Nothing is clamped.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.frame_count < 1 {
            return Err(ValidationError::FrameCount(self.frame_count));
        }
        if self.frame_duration_ms < 1 {
            return Err(ValidationError::FrameDuration(self.frame_duration_ms));
        }
        Ok(())
    }
}

/// Requested performance behaviour, before hardware limits are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceOptions {
    pub enable_concurrency: bool,
    /// `None` picks `min(available, 8)`.
    pub max_workers: Option<usize>,
    pub enable_palette_optimization: bool,
}

impl Default for PerformanceOptions {
    fn default() -> Self {
        Self { enable_concurrency: true, max_workers: None, enable_palette_optimization: true }
    }
}

impl PerformanceOptions {
    /// Apply hardware limits and produce the settings the pipeline runs with.
    pub fn resolve(
        &self,
        provider: &dyn ParallelismProvider,
    ) -> Result<ResolvedPerformance, ValidationError> {
        let available = provider.available().max(1);
        let max_workers = match self.max_workers {
            Some(0) => return Err(ValidationError::MaxWorkers(0)),
            Some(requested) => requested.min(available),
            None => available.min(MAX_DEFAULT_WORKERS),
        };
        Ok(ResolvedPerformance {
            enable_concurrency: self.enable_concurrency,
            max_workers,
            enable_palette_optimization: self.enable_palette_optimization,
        })
    }
}

/// Performance settings with a concrete worker count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedPerformance {
    pub enable_concurrency: bool,
    pub max_workers: usize,
    pub enable_palette_optimization: bool,
}

impl ResolvedPerformance {
    /// Single-threaded settings with the given optimization flag.
    pub fn sequential(enable_palette_optimization: bool) -> Self {
        Self { enable_concurrency: false, max_workers: 1, enable_palette_optimization }
    }
}

/// Source of the host's hardware parallelism.
pub trait ParallelismProvider: Send + Sync {
    /// Number of threads that can usefully run at once (at least 1).
    fn available(&self) -> usize;
}

/// Queries the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemParallelism;

impl ParallelismProvider for SystemParallelism {
    fn available(&self) -> usize {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }
}

/// A fixed count, for deterministic tests and embedding.
#[derive(Debug, Clone, Copy)]
pub struct FixedParallelism(pub usize);

impl ParallelismProvider for FixedParallelism {
    fn available(&self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_animation_defaults() {
        let params = AnimationParams::default();
        assert_eq!(params.frame_count, 30);
        assert_eq!(params.bob_height, 10);
        assert_eq!(params.frame_duration_ms, 80);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_frames() {
        let params = AnimationParams::new(0, 10, 80);
        assert_eq!(params.validate(), Err(ValidationError::FrameCount(0)));
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let params = AnimationParams::new(30, 10, 0);
        assert_eq!(params.validate(), Err(ValidationError::FrameDuration(0)));
    }

    #[test]
    fn test_validate_accepts_zero_bob() {
        assert!(AnimationParams::new(1, 0, 1).validate().is_ok());
    }

    #[test]
    fn test_resolve_default_caps_at_eight() {
        let resolved = PerformanceOptions::default().resolve(&FixedParallelism(32)).unwrap();
        assert_eq!(resolved.max_workers, 8);

        let resolved = PerformanceOptions::default().resolve(&FixedParallelism(3)).unwrap();
        assert_eq!(resolved.max_workers, 3);
    }

    #[test]
    fn test_resolve_requested_bounded_by_hardware() {
        let opts = PerformanceOptions { max_workers: Some(16), ..Default::default() };
        assert_eq!(opts.resolve(&FixedParallelism(4)).unwrap().max_workers, 4);

        // An explicit request may exceed the default ceiling of 8.
        assert_eq!(opts.resolve(&FixedParallelism(64)).unwrap().max_workers, 16);

        let opts = PerformanceOptions { max_workers: Some(2), ..Default::default() };
        assert_eq!(opts.resolve(&FixedParallelism(4)).unwrap().max_workers, 2);
    }

    #[test]
    fn test_resolve_rejects_zero_workers() {
        let opts = PerformanceOptions { max_workers: Some(0), ..Default::default() };
        assert_eq!(opts.resolve(&FixedParallelism(4)), Err(ValidationError::MaxWorkers(0)));
    }

    #[test]
    fn test_resolve_treats_zero_availability_as_one() {
        let resolved = PerformanceOptions::default().resolve(&FixedParallelism(0)).unwrap();
        assert_eq!(resolved.max_workers, 1);
    }

    #[test]
    fn test_system_parallelism_positive() {
        assert!(SystemParallelism.available() >= 1);
    }
}

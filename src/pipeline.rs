//! Pipeline entry points
//!
//! [`Pipeline::configure`] validates settings and resolves performance
//! options once; [`Pipeline::run`] then loads the source, generates every
//! frame, and encodes the artifact. A configured pipeline is `Send + Sync`,
//! so callers that need a responsive foreground can run it on their own
//! thread.
//!
//! # Example
//!
//! ```no_run
//! use pngbob::params::{AnimationParams, PerformanceOptions};
//! use pngbob::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::configure(
//!     "sprite.png",
//!     None,
//!     AnimationParams::default(),
//!     PerformanceOptions::default(),
//! )?;
//! let artifact = pipeline.run()?;
//! println!("wrote {} frames to {}", artifact.frame_count, artifact.path.display());
//! # Ok::<(), pngbob::error::PipelineError>(())
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::compositor::{Compositor, Frame};
use crate::error::PipelineError;
use crate::gif::{encode_with_fallback, EncodeOutcome};
use crate::output::resolve_output_path;
use crate::palette::{PaletteBuilder, PaletteOptimizer};
use crate::params::{
    AnimationParams, ParallelismProvider, PerformanceOptions, ResolvedPerformance,
    SystemParallelism,
};
use crate::preview::{preview_duration_ms, PreviewOptions, PreviewSequence};
use crate::progress::{NullProgress, ProgressEvent, ProgressReporter};
use crate::scheduler::{FrameScheduler, GenerationStats};
use crate::source::{SourceError, SourceImage};

/// How decoders treat the previous frame before drawing the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposal {
    /// Clear to background; no ghosting under transparent pixels.
    Background,
}

/// The written animation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub frame_duration_ms: u32,
    /// 0 means loop forever
    pub loop_count: u16,
    pub disposal: Disposal,
    pub encoding: EncodeOutcome,
    pub bytes_written: u64,
    pub generation: GenerationStats,
}

/// A configured PNG to bobbing GIF conversion.
pub struct Pipeline {
    input: PathBuf,
    output: PathBuf,
    params: AnimationParams,
    perf: ResolvedPerformance,
    progress: Arc<dyn ProgressReporter>,
    optimizer: PaletteOptimizer,
    source: OnceLock<Arc<SourceImage>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("params", &self.params)
            .field("perf", &self.perf)
            .field("optimizer", &self.optimizer)
            .finish()
    }
}

impl Pipeline {
    /// Validate settings and resolve worker counts against the host.
    ///
    /// `output` defaults to `{stem}_bobbing.gif`; a directory gets that name
    /// inside it.
    pub fn configure(
        input: impl AsRef<Path>,
        output: Option<PathBuf>,
        params: AnimationParams,
        perf: PerformanceOptions,
    ) -> Result<Self, PipelineError> {
        Self::configure_with(input, output, params, perf, &SystemParallelism)
    }

    /// [`configure`](Self::configure) with an explicit parallelism source.
    pub fn configure_with(
        input: impl AsRef<Path>,
        output: Option<PathBuf>,
        params: AnimationParams,
        perf: PerformanceOptions,
        parallelism: &dyn ParallelismProvider,
    ) -> Result<Self, PipelineError> {
        params.validate()?;
        let perf = perf.resolve(parallelism)?;
        let input = input.as_ref().to_path_buf();
        let output = resolve_output_path(&input, output.as_deref());

        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            ?params,
            workers = perf.max_workers,
            "pipeline configured"
        );

        Ok(Self {
            input,
            output,
            params,
            perf,
            progress: Arc::new(NullProgress::new()),
            optimizer: PaletteOptimizer::new(),
            source: OnceLock::new(),
        })
    }

    /// Report progress to `progress` instead of discarding it.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the median-cut palette builder.
    pub fn with_palette_builder(mut self, builder: Box<dyn PaletteBuilder>) -> Self {
        self.optimizer = PaletteOptimizer::with_builder(builder);
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn params(&self) -> &AnimationParams {
        &self.params
    }

    pub fn performance(&self) -> &ResolvedPerformance {
        &self.perf
    }

    /// Load the source once; later calls reuse it.
    fn load_source(&self) -> Result<Arc<SourceImage>, SourceError> {
        if let Some(source) = self.source.get() {
            return Ok(Arc::clone(source));
        }
        let source = Arc::new(SourceImage::load(&self.input)?);
        self.progress.report(ProgressEvent::SourceLoaded {
            path: self.input.clone(),
            width: source.width(),
            height: source.height(),
        });
        Ok(Arc::clone(self.source.get_or_init(|| source)))
    }

    /// Build the animation and write it. Blocks until the file is written.
    #[tracing::instrument(skip(self), fields(input = %self.input.display()))]
    pub fn run(&self) -> Result<OutputArtifact, PipelineError> {
        let start = Instant::now();
        let source = self.load_source()?;

        let compositor = Compositor::new(source, self.params);
        let (width, height) = compositor.canvas_size()?;

        let scheduler = FrameScheduler::new(self.perf);
        let (frames, generation) =
            scheduler.generate_with_stats(&compositor, self.progress.as_ref())?;

        let optimizer = self.perf.enable_palette_optimization.then_some(&self.optimizer);
        let (summary, encoding) = encode_with_fallback(
            &frames,
            optimizer,
            self.params.frame_duration_ms,
            &self.output,
            self.progress.as_ref(),
        )?;

        let duration_ms = start.elapsed().as_millis() as u64;
        self.progress.report(ProgressEvent::Completed {
            path: summary.path.clone(),
            frames: self.params.frame_count,
            bytes: summary.bytes_written,
            duration_ms,
        });
        tracing::debug!(bytes = summary.bytes_written, duration_ms, "animation written");

        Ok(OutputArtifact {
            path: summary.path,
            width,
            height,
            frame_count: self.params.frame_count,
            frame_duration_ms: self.params.frame_duration_ms,
            loop_count: 0,
            disposal: Disposal::Background,
            encoding,
            bytes_written: summary.bytes_written,
            generation,
        })
    }

    /// Up to `max_frames` (at most 15) preview frames, scaled to the default
    /// preview width. Palette optimization is skipped.
    pub fn preview_frames(&self, max_frames: usize) -> Result<Vec<Frame>, PipelineError> {
        let frames = self.preview(PreviewOptions::new(max_frames))?;
        Ok(frames.collect::<Result<Vec<_>, _>>()?)
    }

    /// A lazy, restartable preview sequence.
    pub fn preview(&self, options: PreviewOptions) -> Result<PreviewSequence, PipelineError> {
        let source = self.load_source()?;
        PreviewSequence::new(source, &self.params, &options)
    }

    /// Display time for each preview frame, never below 100ms.
    pub fn preview_frame_duration_ms(&self) -> u32 {
        preview_duration_ms(&self.params)
    }
}

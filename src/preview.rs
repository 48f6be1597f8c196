//! Low-fidelity preview frames
//!
//! A preview is a short, restartable, lazily composed sequence. It runs a
//! full bob cycle over at most 15 frames, skips palette optimization, and is
//! scaled to a fixed width. Playback timing belongs to the caller; the
//! sequence only reports the duration each frame should be shown for.

use image::imageops::FilterType;
use std::sync::Arc;

use crate::compositor::{ComposeError, ComposeFrame, Compositor, Frame};
use crate::error::{PipelineError, ValidationError};
use crate::params::AnimationParams;
use crate::source::SourceImage;

/// Upper bound on preview length.
pub const MAX_PREVIEW_FRAMES: usize = 15;
/// Default preview width in pixels.
pub const PREVIEW_WIDTH: u32 = 250;
/// Previews never play faster than this per frame.
pub const MIN_PREVIEW_DURATION_MS: u32 = 100;

/// How a preview is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewOptions {
    /// Requested frame count; clamped to [`MAX_PREVIEW_FRAMES`], 0 is rejected.
    pub max_frames: usize,
    /// Scale frames to this width keeping aspect ratio; `None` keeps canvas size.
    pub target_width: Option<u32>,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self { max_frames: MAX_PREVIEW_FRAMES, target_width: Some(PREVIEW_WIDTH) }
    }
}

impl PreviewOptions {
    pub fn new(max_frames: usize) -> Self {
        Self { max_frames, ..Default::default() }
    }

    pub fn unscaled(mut self) -> Self {
        self.target_width = None;
        self
    }
}

/// Per-frame display time for a preview of an animation with `params`.
pub fn preview_duration_ms(params: &AnimationParams) -> u32 {
    params.frame_duration_ms.max(MIN_PREVIEW_DURATION_MS)
}

/// Number of frames a preview of `params` produces for `max_frames`.
pub fn preview_frame_count(params: &AnimationParams, max_frames: usize) -> Result<u32, ValidationError> {
    if max_frames == 0 {
        return Err(ValidationError::PreviewFrames(max_frames));
    }
    let clamped = max_frames.min(MAX_PREVIEW_FRAMES) as u32;
    Ok(clamped.min(params.frame_count))
}

/// Lazily composed preview frames.
///
/// Yields each frame once; [`PreviewSequence::restart`] rewinds to frame 0 so
/// the caller can loop playback.
#[derive(Debug, Clone)]
pub struct PreviewSequence {
    compositor: Compositor,
    target_width: Option<u32>,
    frame_duration_ms: u32,
    next: u32,
}

impl PreviewSequence {
    pub fn new(
        source: Arc<SourceImage>,
        params: &AnimationParams,
        options: &PreviewOptions,
    ) -> Result<Self, PipelineError> {
        params.validate()?;
        let frame_count = preview_frame_count(params, options.max_frames)?;
        let preview_params =
            AnimationParams::new(frame_count, params.bob_height, preview_duration_ms(params));

        let compositor = Compositor::new(source, preview_params);
        // Surface an oversized canvas now rather than on the first frame
        compositor.canvas_size()?;

        Ok(Self {
            compositor,
            target_width: options.target_width.filter(|w| *w > 0),
            frame_duration_ms: preview_params.frame_duration_ms,
            next: 0,
        })
    }

    /// Total frames in one pass.
    pub fn frame_count(&self) -> u32 {
        self.compositor.frame_count()
    }

    pub fn frame_duration_ms(&self) -> u32 {
        self.frame_duration_ms
    }

    /// Output frame size after scaling.
    pub fn frame_size(&self) -> Result<(u32, u32), ComposeError> {
        let (width, height) = self.compositor.canvas_size()?;
        Ok(self.scaled_size(width, height))
    }

    /// Rewind to the first frame.
    pub fn restart(&mut self) {
        self.next = 0;
    }

    /// Compose and scale frame `index` without moving the cursor.
    pub fn frame(&self, index: u32) -> Result<Frame, ComposeError> {
        let frame = self.compositor.compose(index)?;
        Ok(self.scale(frame))
    }

    fn scaled_size(&self, width: u32, height: u32) -> (u32, u32) {
        match self.target_width {
            Some(target) if target != width => {
                let scale = f64::from(target) / f64::from(width);
                let scaled_height = (f64::from(height) * scale) as u32;
                (target, scaled_height.max(1))
            }
            _ => (width, height),
        }
    }

    fn scale(&self, frame: Frame) -> Frame {
        let (width, height) = self.scaled_size(frame.width(), frame.height());
        if (width, height) == frame.dimensions() {
            return frame;
        }
        image::imageops::resize(&frame, width, height, FilterType::Lanczos3)
    }
}

impl Iterator for PreviewSequence {
    type Item = Result<Frame, ComposeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.frame_count() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.frame(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.frame_count().saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PreviewSequence {}

//! Frame compositing
//!
//! A frame is a transparent canvas with the source pasted at its bob
//! position. Canvas size depends only on the source size and the bob height,
//! so every frame of an animation has the same dimensions.

use image::{Rgba, RgbaImage};
use std::sync::Arc;
use thiserror::Error;

use crate::motion::bob_offset;
use crate::params::AnimationParams;
use crate::source::SourceImage;

/// Fixed transparent margin around the source on every side.
pub const CANVAS_MARGIN: u32 = 10;

/// One fully composited RGBA animation step.
pub type Frame = RgbaImage;

/// Error type for frame compositing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    /// Canvas dimensions overflow `u32`
    #[error("canvas for a {width}x{height} source with bob height {bob_height} is too large")]
    CanvasTooLarge { width: u32, height: u32, bob_height: u32 },
    /// Requested frame lies outside the animation
    #[error("frame {index} is out of range for a {frame_count}-frame animation")]
    FrameOutOfRange { index: u32, frame_count: u32 },
    /// A compositing task panicked or was otherwise lost
    #[error("frame {index} failed: {reason}")]
    TaskFailed { index: u32, reason: String },
}

/// Canvas dimensions for a source of `width` x `height` bobbing by `bob_height`.
///
/// `(width + 20, height + 2 * bob_height + 20)`.
pub fn canvas_size(width: u32, height: u32, bob_height: u32) -> Result<(u32, u32), ComposeError> {
    let too_large = || ComposeError::CanvasTooLarge { width, height, bob_height };
    let canvas_width = width.checked_add(2 * CANVAS_MARGIN).ok_or_else(too_large)?;
    let canvas_height = bob_height
        .checked_mul(2)
        .and_then(|travel| travel.checked_add(height))
        .and_then(|h| h.checked_add(2 * CANVAS_MARGIN))
        .ok_or_else(too_large)?;
    Ok((canvas_width, canvas_height))
}

/// Top-left position of the source on the canvas for `frame_index`.
///
/// A canvas narrower than the source pins it to the left edge.
pub fn source_position(
    source_width: u32,
    canvas_width: u32,
    frame_index: u32,
    params: &AnimationParams,
) -> (u32, u32) {
    let x = canvas_width.saturating_sub(source_width) / 2;
    let offset = bob_offset(frame_index, params.frame_count, params.bob_height);
    // |offset| <= bob_height, so the subtraction never goes negative.
    let y = (i64::from(CANVAS_MARGIN) + i64::from(params.bob_height) - i64::from(offset)) as u32;
    (x, y)
}

/// Render frame `frame_index` of the animation.
///
/// Deterministic: identical inputs produce byte-identical frames. The source
/// is only read.
pub fn compose(
    source: &SourceImage,
    frame_index: u32,
    params: &AnimationParams,
) -> Result<Frame, ComposeError> {
    let (canvas_width, canvas_height) =
        canvas_size(source.width(), source.height(), params.bob_height)?;
    let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, Rgba([0, 0, 0, 0]));
    let (x, y) = source_position(source.width(), canvas_width, frame_index, params);
    blit_over(&mut canvas, source.pixels(), x, y);
    Ok(canvas)
}

/// Composite `sprite` onto `canvas` at `(x, y)` with source-over alpha.
///
/// Over a fully transparent destination this reproduces the sprite pixel
/// exactly.
pub(crate) fn blit_over(canvas: &mut RgbaImage, sprite: &RgbaImage, x: u32, y: u32) {
    let canvas_width = canvas.width();
    let canvas_height = canvas.height();

    for (sy, row) in sprite.rows().enumerate() {
        let dest_y = y + sy as u32;
        if dest_y >= canvas_height {
            break;
        }

        for (sx, src) in row.enumerate() {
            let dest_x = x + sx as u32;
            if dest_x >= canvas_width {
                break;
            }
            // Fully transparent source, skip
            if src[3] == 0 {
                continue;
            }

            let dst = canvas.get_pixel(dest_x, dest_y);
            let blended = source_over(src, dst);
            canvas.put_pixel(dest_x, dest_y, blended);
        }
    }
}

/// Porter-Duff "source over" in 8-bit.
fn source_over(src: &Rgba<u8>, dst: &Rgba<u8>) -> Rgba<u8> {
    if src[3] == 255 || dst[3] == 0 {
        return *src;
    }

    let src_alpha = src[3] as f32 / 255.0;
    let dst_alpha = dst[3] as f32 / 255.0;
    let out_alpha = src_alpha + dst_alpha * (1.0 - src_alpha);

    let composite = |s: u8, d: u8| -> u8 {
        let s = s as f32 / 255.0;
        let d = d as f32 / 255.0;
        let result = (s * src_alpha + d * dst_alpha * (1.0 - src_alpha)) / out_alpha;
        (result.clamp(0.0, 1.0) * 255.0).round() as u8
    };

    Rgba([
        composite(src[0], dst[0]),
        composite(src[1], dst[1]),
        composite(src[2], dst[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}

/// Anything that can produce the frames of one animation by index.
///
/// Implementations must be pure: calling `compose` twice with the same index
/// yields the same frame, which is what lets the scheduler run tasks in any
/// order and retry failed ones.
pub trait ComposeFrame: Send + Sync {
    /// Number of frames in the animation.
    fn frame_count(&self) -> u32;

    /// Produce frame `index`.
    fn compose(&self, index: u32) -> Result<Frame, ComposeError>;
}

/// Composites a shared source with fixed animation parameters.
#[derive(Debug, Clone)]
pub struct Compositor {
    source: Arc<SourceImage>,
    params: AnimationParams,
}

impl Compositor {
    pub fn new(source: Arc<SourceImage>, params: AnimationParams) -> Self {
        Self { source, params }
    }

    pub fn params(&self) -> &AnimationParams {
        &self.params
    }

    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    /// Dimensions shared by every frame.
    pub fn canvas_size(&self) -> Result<(u32, u32), ComposeError> {
        canvas_size(self.source.width(), self.source.height(), self.params.bob_height)
    }
}

impl ComposeFrame for Compositor {
    fn frame_count(&self) -> u32 {
        self.params.frame_count
    }

    fn compose(&self, index: u32) -> Result<Frame, ComposeError> {
        if index >= self.params.frame_count {
            return Err(ComposeError::FrameOutOfRange {
                index,
                frame_count: self.params.frame_count,
            });
        }
        compose(&self.source, index, &self.params)
    }
}

//! Sinusoidal bob motion
//!
//! Maps a frame index to a vertical displacement. One full sine period spans
//! the whole animation, so frame `frame_count` would land exactly where frame
//! 0 started and the loop has no visible seam.
//!
//! # Example
//!
//! ```
//! use pngbob::motion::bob_offset;
//!
//! assert_eq!(bob_offset(0, 30, 10), 0);
//! assert_eq!(bob_offset(15, 60, 10), 10); // quarter period: top of the bob
//! ```

use std::f64::consts::PI;

/// Vertical offset in pixels for `frame_index`; positive values move the
/// image up.
///
/// Computes `round(sin(2π · frame_index / frame_count) · bob_height)`.
/// A `frame_count` of 0 or 1 yields 0 for every index.
pub fn bob_offset(frame_index: u32, frame_count: u32, bob_height: u32) -> i32 {
    if frame_count <= 1 || bob_height == 0 {
        return 0;
    }
    let angle = 2.0 * PI * f64::from(frame_index) / f64::from(frame_count);
    (angle.sin() * f64::from(bob_height)).round() as i32
}

/// The offsets of one complete bob cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionCurve {
    pub frame_count: u32,
    pub bob_height: u32,
}

impl MotionCurve {
    pub fn new(frame_count: u32, bob_height: u32) -> Self {
        Self { frame_count, bob_height }
    }

    /// Offset of a single frame.
    pub fn offset(&self, frame_index: u32) -> i32 {
        bob_offset(frame_index, self.frame_count, self.bob_height)
    }

    /// Offsets for frames `0..frame_count`, in order.
    pub fn offsets(&self) -> impl Iterator<Item = i32> + '_ {
        (0..self.frame_count).map(move |i| self.offset(i))
    }
}

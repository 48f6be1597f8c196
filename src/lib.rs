//! pngbob - Library for turning a still image into a looping bobbing GIF
//!
//! This library provides functionality to:
//! - Load a raster image and normalize it to RGBA
//! - Compose frames that move the image along a sine wave, in parallel
//! - Build one shared palette for all frames and encode a looping GIF,
//!   falling back to per-frame palettes if optimization fails
//! - Produce low-fidelity preview frames for interactive callers
//!
//! Most callers only need [`pipeline::Pipeline`].

pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod gif;
pub mod motion;
pub mod output;
pub mod palette;
pub mod params;
pub mod pipeline;
pub mod preview;
pub mod progress;
pub mod scheduler;
pub mod source;

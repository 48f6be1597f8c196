//! GIF sequence encoding
//!
//! Every animation is written with infinite looping and background disposal,
//! so each frame is drawn onto a cleared canvas and transparent regions never
//! show the previous position. Frames either carry their own quantized color
//! tables (standard) or share one global palette built by
//! [`PaletteOptimizer`] (optimized).

use gif::{DisposalMethod, Encoder, Repeat};
use serde::Serialize;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::compositor::Frame;
use crate::palette::{PaletteFrames, PaletteOptimizer, ALPHA_THRESHOLD};
use crate::progress::{ProgressEvent, ProgressReporter};

/// NeuQuant speed for per-frame color tables (1 best, 30 fastest).
const STANDARD_QUANTIZE_SPEED: i32 = 10;

/// Error type for GIF encoding
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("no frames to encode")]
    NoFrames,
    #[error("{width}x{height} frames exceed the GIF size limit of 65535")]
    CanvasTooLarge { width: u32, height: u32 },
    #[error("frame {index} has dimensions {actual:?}, expected {expected:?}")]
    DimensionMismatch { index: usize, expected: (u32, u32), actual: (u32, u32) },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Gif {
        path: PathBuf,
        #[source]
        source: gif::EncodingError,
    },
}

impl EncodeError {
    /// The output path involved, for errors that have one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            EncodeError::Io { path, .. } | EncodeError::Gif { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Whether the destination itself could not be written.
    fn is_io(&self) -> bool {
        matches!(
            self,
            EncodeError::Io { .. } | EncodeError::Gif { source: gif::EncodingError::Io(_), .. }
        )
    }

    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> EncodeError + '_ {
        move |source| EncodeError::Io { path: path.to_path_buf(), source }
    }

    fn gif(path: &Path) -> impl FnOnce(gif::EncodingError) -> EncodeError + '_ {
        move |source| EncodeError::Gif { path: path.to_path_buf(), source }
    }
}

/// Frames ready to be written, in one of the two encodings.
#[derive(Debug, Clone, Copy)]
pub enum FrameSet<'a> {
    /// Full-color frames; each gets its own color table.
    Rgba(&'a [Frame]),
    /// Frames indexed into a shared global palette.
    Indexed(&'a PaletteFrames),
}

impl FrameSet<'_> {
    pub fn len(&self) -> usize {
        match self {
            FrameSet::Rgba(frames) => frames.len(),
            FrameSet::Indexed(indexed) => indexed.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            FrameSet::Rgba(frames) => frames.first().map(|f| f.dimensions()),
            FrameSet::Indexed(indexed) if !indexed.is_empty() => Some(indexed.dimensions()),
            FrameSet::Indexed(_) => None,
        }
    }
}

/// How the sequence ended up being encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EncodeOutcome {
    /// Shared palette with `colors` entries.
    Optimized { colors: usize },
    /// Per-frame color tables, as requested.
    Standard,
    /// Optimization was requested but failed; per-frame color tables were used.
    FallbackStandard { reason: String },
}

impl EncodeOutcome {
    pub fn is_optimized(&self) -> bool {
        matches!(self, EncodeOutcome::Optimized { .. })
    }
}

/// What was written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frames: usize,
    /// Per-frame delay as stored in the file.
    pub delay_cs: u16,
    pub bytes_written: u64,
}

/// GIF delays are centiseconds; round down and keep at least 1.
pub fn delay_centiseconds(duration_ms: u32) -> u16 {
    u16::try_from((duration_ms / 10).max(1)).unwrap_or(u16::MAX)
}

/// Write `frames` as an infinitely looping GIF at `path`.
///
/// Parent directories are created as needed.
pub fn encode(frames: FrameSet<'_>, duration_ms: u32, path: &Path) -> Result<EncodeSummary, EncodeError> {
    let (width, height) = frames.dimensions().ok_or(EncodeError::NoFrames)?;
    let (gif_width, gif_height) = match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err(EncodeError::CanvasTooLarge { width, height }),
    };
    if let FrameSet::Rgba(rgba) = frames {
        check_dimensions(rgba, (width, height))?;
    }

    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(EncodeError::io(path))?;
        }
    }

    let file = File::create(path).map_err(EncodeError::io(path))?;
    let global_palette = match frames {
        FrameSet::Indexed(indexed) => indexed.palette().to_rgb_bytes(),
        FrameSet::Rgba(_) => Vec::new(),
    };
    let mut encoder = Encoder::new(BufWriter::new(file), gif_width, gif_height, &global_palette)
        .map_err(EncodeError::gif(path))?;
    encoder.set_repeat(Repeat::Infinite).map_err(EncodeError::gif(path))?;

    let delay = delay_centiseconds(duration_ms);

    match frames {
        FrameSet::Rgba(rgba) => {
            for frame in rgba {
                let mut pixels = binarize_alpha(frame);
                let mut gif_frame = gif::Frame::from_rgba_speed(
                    gif_width,
                    gif_height,
                    &mut pixels,
                    STANDARD_QUANTIZE_SPEED,
                );
                gif_frame.delay = delay;
                gif_frame.dispose = DisposalMethod::Background;
                encoder.write_frame(&gif_frame).map_err(EncodeError::gif(path))?;
            }
        }
        FrameSet::Indexed(indexed) => {
            let transparent = indexed.palette().transparent_index();
            for indices in indexed.frames() {
                let gif_frame = gif::Frame {
                    width: gif_width,
                    height: gif_height,
                    delay,
                    dispose: DisposalMethod::Background,
                    transparent,
                    buffer: Cow::Borrowed(indices.as_slice()),
                    ..Default::default()
                };
                encoder.write_frame(&gif_frame).map_err(EncodeError::gif(path))?;
            }
        }
    }

    let mut writer = encoder.into_inner().map_err(EncodeError::io(path))?;
    writer.flush().map_err(EncodeError::io(path))?;
    drop(writer);

    let bytes_written = std::fs::metadata(path).map_err(EncodeError::io(path))?.len();

    Ok(EncodeSummary {
        path: path.to_path_buf(),
        width,
        height,
        frames: frames.len(),
        delay_cs: delay,
        bytes_written,
    })
}

/// Encode with the shared palette when an optimizer is given, falling back to
/// per-frame color tables if optimization or the optimized encode fails.
///
/// A fallback is reported as [`ProgressEvent::OptimizationFallback`] and never
/// surfaces as an error. I/O errors on the destination are returned directly,
/// as is any failure of the standard path.
#[tracing::instrument(skip_all, fields(frames = frames.len(), path = %path.display()))]
pub fn encode_with_fallback(
    frames: &[Frame],
    optimizer: Option<&PaletteOptimizer>,
    duration_ms: u32,
    path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<(EncodeSummary, EncodeOutcome), EncodeError> {
    if frames.is_empty() {
        return Err(EncodeError::NoFrames);
    }

    let Some(optimizer) = optimizer else {
        progress.report(ProgressEvent::EncodeStarted { path: path.to_path_buf(), optimized: false });
        let summary = encode(FrameSet::Rgba(frames), duration_ms, path)?;
        return Ok((summary, EncodeOutcome::Standard));
    };

    progress.report(ProgressEvent::EncodeStarted { path: path.to_path_buf(), optimized: true });
    let reason = match optimizer.optimize(frames) {
        Ok(indexed) => match encode(FrameSet::Indexed(&indexed), duration_ms, path) {
            Ok(summary) => {
                let colors = indexed.palette().len();
                return Ok((summary, EncodeOutcome::Optimized { colors }));
            }
            // An unwritable destination would fail the standard path the same way
            Err(e) if e.is_io() => return Err(e),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    tracing::warn!(%reason, "palette optimization failed, using standard encoding");
    progress.report(ProgressEvent::OptimizationFallback { reason: reason.clone() });
    let summary = encode(FrameSet::Rgba(frames), duration_ms, path)?;
    Ok((summary, EncodeOutcome::FallbackStandard { reason }))
}

fn check_dimensions(frames: &[Frame], expected: (u32, u32)) -> Result<(), EncodeError> {
    match frames.iter().position(|f| f.dimensions() != expected) {
        Some(index) => Err(EncodeError::DimensionMismatch {
            index,
            expected,
            actual: frames[index].dimensions(),
        }),
        None => Ok(()),
    }
}

/// GIF transparency is on/off; apply the same cutoff the palette optimizer uses.
fn binarize_alpha(frame: &Frame) -> Vec<u8> {
    let mut pixels = frame.as_raw().clone();
    for px in pixels.chunks_exact_mut(4) {
        if px[3] < ALPHA_THRESHOLD {
            px.copy_from_slice(&[0, 0, 0, 0]);
        } else {
            px[3] = 255;
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{OptimizeError, Palette, PaletteBuilder};
    use crate::progress::CollectingProgress;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    struct Decoded {
        width: u16,
        height: u16,
        repeat: Repeat,
        global_palette: Option<Vec<u8>>,
        frames: Vec<(u16, DisposalMethod, Option<u8>, Option<Vec<u8>>)>,
    }

    fn decode(path: &Path) -> Decoded {
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::Indexed);
        let mut decoder = options.read_info(File::open(path).unwrap()).unwrap();

        let mut frames = Vec::new();
        while let Some(frame) = decoder.read_next_frame().unwrap() {
            frames.push((frame.delay, frame.dispose, frame.transparent, frame.palette.clone()));
        }
        Decoded {
            width: decoder.width(),
            height: decoder.height(),
            repeat: decoder.repeat(),
            global_palette: decoder.global_palette().map(|p| p.to_vec()),
            frames,
        }
    }

    /// Create a simple test frame with a solid color
    fn create_test_frame(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(width, height, color)
    }

    fn bobbing_frames(count: u32) -> Vec<Frame> {
        (0..count)
            .map(|i| {
                let mut img = RgbaImage::new(12, 16);
                for y in i % 4..i % 4 + 8 {
                    for x in 2..10 {
                        img.put_pixel(x, y, Rgba([200, (x * 20) as u8, 40, 255]));
                    }
                }
                img
            })
            .collect()
    }

    struct RejectingBuilder;

    impl PaletteBuilder for RejectingBuilder {
        fn build(&self, _: &RgbaImage, _: usize) -> Result<Palette, OptimizeError> {
            Ok(Palette::new(vec![[0, 0, 0]; 512], Some(0)))
        }
    }

    #[test]
    fn test_delay_centiseconds() {
        assert_eq!(delay_centiseconds(80), 8);
        assert_eq!(delay_centiseconds(85), 8);
        assert_eq!(delay_centiseconds(5), 1);
        assert_eq!(delay_centiseconds(1), 1);
        assert_eq!(delay_centiseconds(u32::MAX), u16::MAX);
    }

    #[test]
    fn test_encode_standard_loops_with_background_disposal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("standard.gif");
        let frames = bobbing_frames(6);

        let summary = encode(FrameSet::Rgba(&frames), 80, &path).unwrap();
        assert_eq!(summary.frames, 6);
        assert_eq!(summary.delay_cs, 8);
        assert!(summary.bytes_written > 0);

        let decoded = decode(&path);
        assert_eq!((decoded.width, decoded.height), (12, 16));
        assert_eq!(decoded.repeat, Repeat::Infinite);
        assert_eq!(decoded.frames.len(), 6);
        for (delay, dispose, transparent, palette) in &decoded.frames {
            assert_eq!(*delay, 8);
            assert_eq!(*dispose, DisposalMethod::Background);
            assert!(transparent.is_some());
            assert!(palette.is_some());
        }
    }

    #[test]
    fn test_encode_indexed_uses_global_palette() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("optimized.gif");
        let indexed = PaletteOptimizer::new().optimize(&bobbing_frames(5)).unwrap();

        encode(FrameSet::Indexed(&indexed), 120, &path).unwrap();

        let decoded = decode(&path);
        let global = decoded.global_palette.unwrap();
        assert!(global.len() / 3 <= 256);
        assert_eq!(decoded.frames.len(), 5);
        for (delay, dispose, transparent, palette) in &decoded.frames {
            assert_eq!(*delay, 12);
            assert_eq!(*dispose, DisposalMethod::Background);
            assert_eq!(*transparent, indexed.palette().transparent_index());
            assert!(palette.is_none());
        }
    }

    #[test]
    fn test_encode_single_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("single.gif");
        let frames = vec![create_test_frame(8, 8, Rgba([128, 128, 128, 255]))];

        encode(FrameSet::Rgba(&frames), 100, &path).unwrap();
        assert_eq!(decode(&path).frames.len(), 1);
    }

    #[test]
    fn test_encode_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dirs/test.gif");
        let frames = vec![create_test_frame(2, 2, Rgba([255, 0, 0, 255]))];

        assert!(encode(FrameSet::Rgba(&frames), 100, &path).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_encode_empty_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.gif");

        let result = encode(FrameSet::Rgba(&[]), 100, &path);
        assert!(matches!(result, Err(EncodeError::NoFrames)));
        assert!(!path.exists());
    }

    #[test]
    fn test_encode_rejects_mismatched_frames() {
        let dir = tempdir().unwrap();
        let frames = vec![RgbaImage::new(4, 4), RgbaImage::new(4, 5)];
        let result = encode(FrameSet::Rgba(&frames), 100, &dir.path().join("bad.gif"));
        assert!(matches!(result, Err(EncodeError::DimensionMismatch { index: 1, .. })));
    }

    #[test]
    fn test_encode_rejects_oversized_canvas() {
        let dir = tempdir().unwrap();
        let frames = vec![RgbaImage::new(70_000, 1)];
        let result = encode(FrameSet::Rgba(&frames), 100, &dir.path().join("wide.gif"));
        assert!(matches!(result, Err(EncodeError::CanvasTooLarge { width: 70_000, height: 1 })));
    }

    #[test]
    fn test_encode_io_error_carries_path() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened as a file
        let frames = vec![create_test_frame(2, 2, Rgba([255, 0, 0, 255]))];
        let err = encode(FrameSet::Rgba(&frames), 100, dir.path()).unwrap_err();
        assert_eq!(err.path(), Some(&dir.path().to_path_buf()));
    }

    #[test]
    fn test_binarize_alpha() {
        let mut frame = RgbaImage::new(3, 1);
        frame.put_pixel(0, 0, Rgba([10, 20, 30, 127]));
        frame.put_pixel(1, 0, Rgba([10, 20, 30, 128]));
        frame.put_pixel(2, 0, Rgba([10, 20, 30, 255]));

        assert_eq!(binarize_alpha(&frame), vec![0, 0, 0, 0, 10, 20, 30, 255, 10, 20, 30, 255]);
    }

    #[test]
    fn test_fallback_not_needed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("opt.gif");
        let progress = CollectingProgress::new();
        let optimizer = PaletteOptimizer::new();

        let (_, outcome) =
            encode_with_fallback(&bobbing_frames(4), Some(&optimizer), 80, &path, &progress)
                .unwrap();
        assert!(outcome.is_optimized());
        assert!(!progress.saw_fallback());
    }

    #[test]
    fn test_fallback_on_malformed_palette() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fallback.gif");
        let progress = CollectingProgress::new();
        let optimizer = PaletteOptimizer::with_builder(Box::new(RejectingBuilder));

        let (summary, outcome) =
            encode_with_fallback(&bobbing_frames(4), Some(&optimizer), 80, &path, &progress)
                .unwrap();
        assert!(matches!(outcome, EncodeOutcome::FallbackStandard { .. }));
        assert!(progress.saw_fallback());
        assert_eq!(summary.frames, 4);

        let decoded = decode(&path);
        assert_eq!(decoded.frames.len(), 4);
        assert!(decoded.frames.iter().all(|(_, d, _, _)| *d == DisposalMethod::Background));
    }

    #[test]
    fn test_unwritable_destination_is_not_a_fallback() {
        let dir = tempdir().unwrap();
        let progress = CollectingProgress::new();
        let optimizer = PaletteOptimizer::new();

        // A directory cannot be opened as a file
        let err = encode_with_fallback(&bobbing_frames(4), Some(&optimizer), 80, dir.path(), &progress)
            .unwrap_err();
        assert!(err.is_io(), "got {err:?}");
        assert_eq!(err.path(), Some(&dir.path().to_path_buf()));
        assert!(!progress.saw_fallback());
    }

    #[test]
    fn test_standard_when_no_optimizer() {
        let dir = tempdir().unwrap();
        let progress = CollectingProgress::new();
        let (_, outcome) = encode_with_fallback(
            &bobbing_frames(3),
            None,
            80,
            &dir.path().join("std.gif"),
            &progress,
        )
        .unwrap();
        assert_eq!(outcome, EncodeOutcome::Standard);
        assert!(!progress.saw_fallback());
    }

    #[test]
    fn test_outcome_serializes_with_mode_tag() {
        let json = serde_json::to_string(&EncodeOutcome::Optimized { colors: 12 }).unwrap();
        assert_eq!(json, r#"{"mode":"optimized","colors":12}"#);
        let json = serde_json::to_string(&EncodeOutcome::Standard).unwrap();
        assert_eq!(json, r#"{"mode":"standard"}"#);
    }
}

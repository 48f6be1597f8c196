//! Shared adaptive palette optimization
//!
//! Builds one color table from a small sample of frames and re-expresses
//! every frame as indices into it. Bobbing only moves pixels around, so the
//! first few frames already contain every color the animation will show.
//!
//! The default palette builder is a median cut in perceptual L*a*b* space.
//! One palette slot is always reserved for transparency: GIF alpha is binary,
//! so pixels below [`ALPHA_THRESHOLD`] become transparent and everything else
//! is treated as opaque.

use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use thiserror::Error;

use crate::compositor::Frame;

/// Maximum entries in a GIF color table.
pub const MAX_PALETTE_COLORS: usize = 256;
/// Number of leading frames sampled to build the palette.
pub const SAMPLE_FRAMES: usize = 4;
/// Pixels with alpha below this are written as transparent.
pub const ALPHA_THRESHOLD: u8 = 128;

/// Error type for palette optimization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimizeError {
    #[error("no frames to optimize")]
    NoFrames,
    #[error("frame {index} has dimensions {actual:?}, expected {expected:?}")]
    DimensionMismatch { index: usize, expected: (u32, u32), actual: (u32, u32) },
    #[error("sample composite of {frames} frames of width {width} is too large")]
    SampleTooLarge { frames: usize, width: u32 },
    #[error("malformed palette: {0}")]
    MalformedPalette(String),
}

/// A color represented as RGBA values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// Whether a pixel is written as the transparent index.
fn is_see_through(pixel: &Rgba<u8>) -> bool {
    pixel[3] < ALPHA_THRESHOLD
}

/// LAB color representation for perceptual color quantization.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LabColor {
    pub l: f64, // Lightness: 0-100
    pub a: f64, // Green-Red axis: -128 to 127
    pub b: f64, // Blue-Yellow axis: -128 to 127
}

impl LabColor {
    /// Convert RGB color to LAB color space (D65 illuminant).
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let r_lin = srgb_to_linear(r as f64 / 255.0);
        let g_lin = srgb_to_linear(g as f64 / 255.0);
        let b_lin = srgb_to_linear(b as f64 / 255.0);

        let x = r_lin * 0.4124564 + g_lin * 0.3575761 + b_lin * 0.1804375;
        let y = r_lin * 0.2126729 + g_lin * 0.7151522 + b_lin * 0.0721750;
        let z = r_lin * 0.0193339 + g_lin * 0.1191920 + b_lin * 0.9503041;

        // D65 reference white point
        let fx = lab_f(x / 0.95047);
        let fy = lab_f(y / 1.00000);
        let fz = lab_f(z / 1.08883);

        Self { l: 116.0 * fy - 16.0, a: 500.0 * (fx - fy), b: 200.0 * (fy - fz) }
    }

    fn of(color: Color) -> Self {
        Self::from_rgb(color.r, color.g, color.b)
    }

    /// Squared CIE76 distance; ordering is all nearest-color search needs.
    pub fn distance_sq(&self, other: &LabColor) -> f64 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        dl * dl + da * da + db * db
    }

    fn channel(&self, channel: LabChannel) -> f64 {
        match channel {
            LabChannel::L => self.l,
            LabChannel::A => self.a,
            LabChannel::B => self.b,
        }
    }
}

/// sRGB gamma expansion (inverse companding).
fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// LAB f function for XYZ to LAB conversion.
fn lab_f(t: f64) -> f64 {
    let delta: f64 = 6.0 / 29.0;
    if t > delta.powi(3) {
        t.cbrt()
    } else {
        t / (3.0 * delta * delta) + 4.0 / 29.0
    }
}

#[derive(Debug, Clone, Copy)]
enum LabChannel {
    L,
    A,
    B,
}

/// A box of colors in LAB space for perceptual median cut.
#[derive(Debug, Clone)]
struct LabColorBox {
    colors: Vec<(Color, LabColor, u32)>, // Sampled color, LAB color, count
}

impl LabColorBox {
    fn new(colors: Vec<(Color, LabColor, u32)>) -> Self {
        Self { colors }
    }

    /// Find which LAB channel has the largest range.
    fn widest_channel(&self) -> LabChannel {
        let (mut min_l, mut max_l) = (f64::MAX, f64::MIN);
        let (mut min_a, mut max_a) = (f64::MAX, f64::MIN);
        let (mut min_b, mut max_b) = (f64::MAX, f64::MIN);

        for (_, lab, _) in &self.colors {
            min_l = min_l.min(lab.l);
            max_l = max_l.max(lab.l);
            min_a = min_a.min(lab.a);
            max_a = max_a.max(lab.a);
            min_b = min_b.min(lab.b);
            max_b = max_b.max(lab.b);
        }

        let range_l = max_l - min_l;
        let range_a = max_a - min_a;
        let range_b = max_b - min_b;

        if range_l >= range_a && range_l >= range_b {
            LabChannel::L
        } else if range_a >= range_b {
            LabChannel::A
        } else {
            LabChannel::B
        }
    }

    /// Split the box into two along the widest LAB channel.
    fn split(mut self) -> (LabColorBox, LabColorBox) {
        let channel = self.widest_channel();

        // total_cmp keeps the sort deterministic; ties fall back to the RGB value
        self.colors.sort_by(|(c1, lab1, _), (c2, lab2, _)| {
            lab1.channel(channel)
                .total_cmp(&lab2.channel(channel))
                .then_with(|| (c1.r, c1.g, c1.b).cmp(&(c2.r, c2.g, c2.b)))
        });

        // Find median by pixel count
        let total: u64 = self.colors.iter().map(|(_, _, count)| u64::from(*count)).sum();
        let mut running = 0u64;
        let mut split_idx = self.colors.len() / 2;

        for (i, (_, _, count)) in self.colors.iter().enumerate() {
            running += u64::from(*count);
            if running >= total / 2 {
                split_idx = (i + 1).min(self.colors.len() - 1);
                break;
            }
        }

        // Ensure we don't create empty boxes
        split_idx = split_idx.max(1).min(self.colors.len() - 1);

        let right = self.colors.split_off(split_idx);
        (LabColorBox::new(self.colors), LabColorBox::new(right))
    }

    /// The sampled color closest to the count-weighted LAB mean.
    fn average_color(&self) -> Color {
        let total: u64 = self.colors.iter().map(|(_, _, count)| u64::from(*count)).sum();
        if total == 0 {
            return Color::opaque(0, 0, 0);
        }

        let weighted = |f: fn(&LabColor) -> f64| -> f64 {
            self.colors.iter().map(|(_, lab, count)| f(lab) * f64::from(*count)).sum::<f64>()
                / total as f64
        };
        let avg_lab = LabColor { l: weighted(|c| c.l), a: weighted(|c| c.a), b: weighted(|c| c.b) };

        // Return an actual sampled color rather than synthesizing one
        self.colors
            .iter()
            .min_by(|(_, lab1, _), (_, lab2, _)| {
                avg_lab.distance_sq(lab1).total_cmp(&avg_lab.distance_sq(lab2))
            })
            .map(|(c, _, _)| *c)
            .unwrap_or(Color::opaque(0, 0, 0))
    }

    fn pixel_count(&self) -> u64 {
        self.colors.iter().map(|(_, _, count)| u64::from(*count)).sum()
    }
}

/// Reduce opaque colors to at most `max_colors` using median cut in LAB space.
///
/// The result is sorted so identical histograms always give identical palettes.
pub(crate) fn median_cut_lab(colors: HashMap<Color, u32>, max_colors: usize) -> Vec<Color> {
    let mut entries: Vec<(Color, LabColor, u32)> =
        colors.into_iter().map(|(c, count)| (c, LabColor::of(c), count)).collect();
    entries.sort_by_key(|(c, _, _)| (c.r, c.g, c.b));

    if entries.len() <= max_colors || max_colors == 0 {
        entries.truncate(max_colors);
        return entries.into_iter().map(|(c, _, _)| c).collect();
    }

    let mut boxes = vec![LabColorBox::new(entries)];

    while boxes.len() < max_colors {
        // Split the most populated box that still has more than one color
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.colors.len() > 1)
            .max_by_key(|(i, b)| (b.pixel_count(), std::cmp::Reverse(*i)))
            .map(|(i, _)| i);

        let Some(idx) = candidate else {
            break;
        };

        let box_to_split = boxes.remove(idx);
        let (left, right) = box_to_split.split();
        boxes.push(left);
        boxes.push(right);
    }

    let mut result: Vec<Color> = boxes.iter().map(LabColorBox::average_color).collect();
    result.sort_by_key(|c| (c.r, c.g, c.b));
    result.dedup();
    result
}

/// A color table with an optional transparent slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
    transparent: Option<u8>,
}

impl Palette {
    /// Build a palette from RGB entries. No validation is performed here;
    /// [`Palette::validate`] does that.
    pub fn new(colors: Vec<[u8; 3]>, transparent: Option<u8>) -> Self {
        Self { colors, transparent }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    pub fn transparent_index(&self) -> Option<u8> {
        self.transparent
    }

    /// Flat `RGBRGB...` bytes for a GIF color table.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.colors.iter().flatten().copied().collect()
    }

    /// Check the palette can be written as a GIF color table that
    /// preserves transparency.
    pub fn validate(&self, max_colors: usize) -> Result<(), OptimizeError> {
        if self.colors.is_empty() {
            return Err(OptimizeError::MalformedPalette("palette is empty".to_string()));
        }
        if self.colors.len() > max_colors {
            return Err(OptimizeError::MalformedPalette(format!(
                "{} colors exceeds the limit of {}",
                self.colors.len(),
                max_colors
            )));
        }
        match self.transparent {
            None => Err(OptimizeError::MalformedPalette("no transparent entry".to_string())),
            Some(index) if usize::from(index) >= self.colors.len() => {
                Err(OptimizeError::MalformedPalette(format!(
                    "transparent index {} outside {} colors",
                    index,
                    self.colors.len()
                )))
            }
            Some(_) => Ok(()),
        }
    }
}

/// Strategy for choosing palette colors from a sample image.
pub trait PaletteBuilder: Send + Sync {
    /// Choose at most `max_colors` entries (including the transparent slot)
    /// representing `sample`.
    fn build(&self, sample: &RgbaImage, max_colors: usize) -> Result<Palette, OptimizeError>;
}

/// Perceptual median-cut palette with a trailing transparent slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct MedianCut;

impl PaletteBuilder for MedianCut {
    fn build(&self, sample: &RgbaImage, max_colors: usize) -> Result<Palette, OptimizeError> {
        if max_colors < 2 {
            return Err(OptimizeError::MalformedPalette(format!(
                "need room for at least one color and transparency, got {}",
                max_colors
            )));
        }

        let mut histogram: HashMap<Color, u32> = HashMap::new();
        for pixel in sample.pixels().filter(|p| !is_see_through(p)) {
            *histogram.entry(Color::opaque(pixel[0], pixel[1], pixel[2])).or_insert(0) += 1;
        }

        let mut colors: Vec<[u8; 3]> = median_cut_lab(histogram, max_colors - 1)
            .into_iter()
            .map(|c| [c.r, c.g, c.b])
            .collect();
        let transparent = colors.len() as u8;
        colors.push([0, 0, 0]);
        Ok(Palette::new(colors, Some(transparent)))
    }
}

/// Frames re-expressed as indices into one shared palette.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteFrames {
    palette: Palette,
    width: u32,
    height: u32,
    frames: Vec<Vec<u8>>,
}

impl PaletteFrames {
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Row-major palette indices, one buffer per frame.
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Expand frame `index` back to RGBA (transparent index becomes zero alpha).
    pub fn to_rgba(&self, index: usize) -> Option<RgbaImage> {
        let indices = self.frames.get(index)?;
        let mut image = RgbaImage::new(self.width, self.height);
        for (pixel, &i) in image.pixels_mut().zip(indices) {
            *pixel = if Some(i) == self.palette.transparent {
                Rgba([0, 0, 0, 0])
            } else {
                let [r, g, b] = self.palette.colors[usize::from(i)];
                Rgba([r, g, b, 255])
            };
        }
        Some(image)
    }
}

/// Builds a shared palette from the first few frames and quantizes all of them.
pub struct PaletteOptimizer {
    builder: Box<dyn PaletteBuilder>,
    sample_frames: usize,
    max_colors: usize,
}

impl std::fmt::Debug for PaletteOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaletteOptimizer")
            .field("sample_frames", &self.sample_frames)
            .field("max_colors", &self.max_colors)
            .finish()
    }
}

impl Default for PaletteOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PaletteOptimizer {
    /// Median cut, 4 sample frames, 256 colors.
    pub fn new() -> Self {
        Self::with_builder(Box::new(MedianCut))
    }

    pub fn with_builder(builder: Box<dyn PaletteBuilder>) -> Self {
        Self { builder, sample_frames: SAMPLE_FRAMES, max_colors: MAX_PALETTE_COLORS }
    }

    /// Limit the palette size (clamped to 2..=256).
    pub fn with_max_colors(mut self, max_colors: usize) -> Self {
        self.max_colors = max_colors.clamp(2, MAX_PALETTE_COLORS);
        self
    }

    /// Build the shared palette and quantize every frame against it.
    ///
    /// All-or-nothing: any failure abandons the whole batch.
    #[tracing::instrument(skip_all, fields(frames = frames.len()))]
    pub fn optimize(&self, frames: &[Frame]) -> Result<PaletteFrames, OptimizeError> {
        let (width, height) = check_dimensions(frames)?;

        let sample = sample_composite(frames, self.sample_frames)?;
        let palette = self.builder.build(&sample, self.max_colors)?;
        palette.validate(self.max_colors)?;
        tracing::debug!(colors = palette.len(), "shared palette built");

        let mut quantizer = Quantizer::new(&palette);
        let indexed = frames.iter().map(|frame| quantizer.quantize(frame)).collect();

        Ok(PaletteFrames { palette, width, height, frames: indexed })
    }
}

fn check_dimensions(frames: &[Frame]) -> Result<(u32, u32), OptimizeError> {
    let first = frames.first().ok_or(OptimizeError::NoFrames)?;
    let expected = first.dimensions();
    for (index, frame) in frames.iter().enumerate() {
        if frame.dimensions() != expected {
            return Err(OptimizeError::DimensionMismatch {
                index,
                expected,
                actual: frame.dimensions(),
            });
        }
    }
    Ok(expected)
}

/// Place the first `count` frames side by side.
pub fn sample_composite(frames: &[Frame], count: usize) -> Result<RgbaImage, OptimizeError> {
    let (width, height) = check_dimensions(frames)?;
    let sampled = &frames[..count.clamp(1, frames.len())];

    let composite_width = u32::try_from(sampled.len())
        .ok()
        .and_then(|n| width.checked_mul(n))
        .ok_or(OptimizeError::SampleTooLarge { frames: sampled.len(), width })?;

    let mut composite = RgbaImage::new(composite_width, height);
    for (i, frame) in sampled.iter().enumerate() {
        image::imageops::replace(&mut composite, frame, i64::from(width) * i as i64, 0);
    }
    Ok(composite)
}

/// Nearest-color lookup with a per-batch cache.
struct Quantizer<'a> {
    palette: &'a Palette,
    transparent: u8,
    labs: Vec<(u8, LabColor)>,
    cache: HashMap<[u8; 3], u8>,
}

impl<'a> Quantizer<'a> {
    /// `palette` must have passed [`Palette::validate`].
    fn new(palette: &'a Palette) -> Self {
        let transparent = palette.transparent.unwrap_or(0);
        let labs = palette
            .colors
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != usize::from(transparent))
            .map(|(i, [r, g, b])| (i as u8, LabColor::from_rgb(*r, *g, *b)))
            .collect();
        Self { palette, transparent, labs, cache: HashMap::new() }
    }

    fn quantize(&mut self, frame: &Frame) -> Vec<u8> {
        frame.pixels().map(|p| self.index_of(p)).collect()
    }

    fn index_of(&mut self, pixel: &Rgba<u8>) -> u8 {
        if is_see_through(pixel) {
            return self.transparent;
        }
        let rgb = [pixel[0], pixel[1], pixel[2]];
        if let Some(&index) = self.cache.get(&rgb) {
            return index;
        }

        let target = LabColor::from_rgb(rgb[0], rgb[1], rgb[2]);
        let index = self
            .labs
            .iter()
            .min_by(|(_, a), (_, b)| target.distance_sq(a).total_cmp(&target.distance_sq(b)))
            .map(|(i, _)| *i)
            // Palette holds only the transparent slot
            .unwrap_or(self.transparent);
        debug_assert!(usize::from(index) < self.palette.len());
        self.cache.insert(rgb, index);
        index
    }
}

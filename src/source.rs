//! Source image loading
//!
//! Every source is normalized to 8-bit RGBA on load so the compositor can
//! treat each pixel as carrying an alpha channel.

use image::{DynamicImage, RgbaImage};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for source loading
#[derive(Debug, Error)]
pub enum SourceError {
    /// The input path does not resolve to a file
    #[error("input file '{}' not found", path.display())]
    NotFound { path: PathBuf },
    /// The bytes could not be decoded as a raster image
    #[error("cannot decode '{}' as an image: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },
    /// Other IO error while reading the file
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    /// Path of the offending input.
    pub fn path(&self) -> &PathBuf {
        match self {
            SourceError::NotFound { path }
            | SourceError::UnsupportedFormat { path, .. }
            | SourceError::Io { path, .. } => path,
        }
    }
}

/// An immutable RGBA source image.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pixels: RgbaImage,
}

impl SourceImage {
    /// Load and normalize an image file.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        if !path.is_file() {
            return Err(SourceError::NotFound { path: path.to_path_buf() });
        }

        let decoded = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(source) if source.kind() == io::ErrorKind::NotFound => {
                SourceError::NotFound { path: path.to_path_buf() }
            }
            image::ImageError::IoError(source) => {
                SourceError::Io { path: path.to_path_buf(), source }
            }
            other => SourceError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })?;

        Self::from_dynamic(decoded).require_pixels(path)
    }

    /// Reject zero-area images; there is nothing to animate.
    fn require_pixels(self, path: &Path) -> Result<Self, SourceError> {
        if self.width() == 0 || self.height() == 0 {
            return Err(SourceError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "image has no pixels".to_string(),
            });
        }
        Ok(self)
    }

    /// Wrap an already-decoded image, converting it to RGBA.
    ///
    /// Images without an alpha channel become fully opaque.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { pixels: image.into_rgba8() }
    }

    /// Wrap an RGBA buffer as-is.
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Borrow the RGBA pixel buffer.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

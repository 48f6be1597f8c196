//! Pipeline error taxonomy
//!
//! Each stage owns a small error enum; [`PipelineError`] folds the terminal
//! ones together for callers. Recoverable conditions (a frame that had to be
//! recomputed, a palette optimization that fell back to standard encoding)
//! never show up here; they are reported through [`crate::progress`].

use std::path::PathBuf;
use thiserror::Error;

use crate::compositor::ComposeError;
use crate::config::ConfigError;
use crate::gif::EncodeError;
use crate::source::SourceError;

/// Out-of-range animation or performance settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("frame count must be at least 1, got {0}")]
    FrameCount(u32),
    #[error("frame duration must be at least 1ms, got {0}")]
    FrameDuration(u32),
    #[error("max workers must be at least 1, got {0}")]
    MaxWorkers(usize),
    #[error("preview needs at least 1 frame, got {0}")]
    PreviewFrames(usize),
}

/// Terminal failure of a pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("invalid settings: {0}")]
    Validation(#[from] ValidationError),
    #[error("frame generation failed: {0}")]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceNotFound,
    UnsupportedFormat,
    /// The input exists but reading it failed
    SourceIo,
    Validation,
    Compose,
    Encode,
    Config,
}

impl PipelineError {
    /// Which taxonomy entry this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Source(SourceError::NotFound { .. }) => ErrorKind::SourceNotFound,
            PipelineError::Source(SourceError::UnsupportedFormat { .. }) => {
                ErrorKind::UnsupportedFormat
            }
            PipelineError::Source(SourceError::Io { .. }) => ErrorKind::SourceIo,
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Compose(_) => ErrorKind::Compose,
            PipelineError::Encode(_) => ErrorKind::Encode,
            PipelineError::Config(_) => ErrorKind::Config,
        }
    }

    /// The file path the error is about, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            PipelineError::Source(e) => Some(e.path()),
            PipelineError::Encode(e) => e.path(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_source_not_found() {
        let err: PipelineError =
            SourceError::NotFound { path: PathBuf::from("missing.png") }.into();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
        assert_eq!(err.path(), Some(&PathBuf::from("missing.png")));
        assert!(err.to_string().contains("missing.png"));
    }

    #[test]
    fn test_kind_unsupported_format() {
        let err: PipelineError = SourceError::UnsupportedFormat {
            path: PathBuf::from("notes.txt"),
            reason: "unknown format".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_kind_source_io() {
        let err: PipelineError = SourceError::Io {
            path: PathBuf::from("locked.png"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::SourceIo);
        assert_eq!(err.path(), Some(&PathBuf::from("locked.png")));
        assert!(err.to_string().contains("locked.png"));
    }

    #[test]
    fn test_kind_validation() {
        let err: PipelineError = ValidationError::FrameCount(0).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "invalid settings: frame count must be at least 1, got 0");
        assert!(err.path().is_none());
    }

    #[test]
    fn test_kind_encode() {
        let err: PipelineError = EncodeError::NoFrames.into();
        assert_eq!(err.kind(), ErrorKind::Encode);
    }
}

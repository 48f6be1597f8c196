//! Configuration loading and discovery for `pngbob.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::PngbobConfig;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file looked up on disk.
pub const CONFIG_FILE_NAME: &str = "pngbob.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML parsing error
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// Validation error
    #[error("config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub frames: Option<u32>,
    pub bob_height: Option<u32>,
    pub duration_ms: Option<u32>,
    pub concurrency: Option<bool>,
    pub max_workers: Option<usize>,
    pub optimize: Option<bool>,
}

/// Find pngbob.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for pngbob.toml
/// 2. Check XDG_CONFIG_HOME/pngbob/pngbob.toml (or ~/.config/pngbob/pngbob.toml)
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

/// Find pngbob.toml in the XDG config directory.
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("pngbob").join(CONFIG_FILE_NAME);
    config_path.is_file().then_some(config_path)
}

/// Find pngbob.toml by walking up from `start`.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, the discovered file is used,
/// or defaults when there is none.
pub fn load_config(path: Option<&Path>) -> Result<PngbobConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(PngbobConfig::default()),
    }
}

/// Load configuration from a specific file path.
pub fn load_config_file(path: &Path) -> Result<PngbobConfig, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    let config = parse_config(&contents)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

fn parse_config(contents: &str) -> Result<PngbobConfig, toml::de::Error> {
    toml::from_str(contents)
}

/// Merge CLI overrides into a configuration. CLI arguments take precedence.
pub fn merge_cli_overrides(config: &mut PngbobConfig, overrides: &CliOverrides) {
    if let Some(frames) = overrides.frames {
        config.animation.frames = frames;
    }
    if let Some(bob_height) = overrides.bob_height {
        config.animation.bob_height = bob_height;
    }
    if let Some(duration_ms) = overrides.duration_ms {
        config.animation.duration_ms = duration_ms;
    }
    if let Some(concurrency) = overrides.concurrency {
        config.performance.concurrency = concurrency;
    }
    if let Some(max_workers) = overrides.max_workers {
        config.performance.max_workers = Some(max_workers);
    }
    if let Some(optimize) = overrides.optimize {
        config.performance.optimize = optimize;
    }
}

//! Configuration schema types for `pngbob.toml`
//!
//! Every table and key is optional; missing values take the library defaults.

use serde::{Deserialize, Serialize};

use crate::params::{
    AnimationParams, PerformanceOptions, DEFAULT_BOB_HEIGHT, DEFAULT_FRAME_COUNT,
    DEFAULT_FRAME_DURATION_MS,
};

/// `[animation]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnimationConfig {
    /// Frames per bob cycle
    #[serde(default = "default_frames")]
    pub frames: u32,
    /// Bob amplitude in pixels
    #[serde(default = "default_bob_height")]
    pub bob_height: u32,
    /// Display time of each frame
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            bob_height: default_bob_height(),
            duration_ms: default_duration_ms(),
        }
    }
}

fn default_frames() -> u32 {
    DEFAULT_FRAME_COUNT
}

fn default_bob_height() -> u32 {
    DEFAULT_BOB_HEIGHT
}

fn default_duration_ms() -> u32 {
    DEFAULT_FRAME_DURATION_MS
}

/// `[performance]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerformanceConfig {
    /// Generate frames on a worker pool
    #[serde(default = "default_true")]
    pub concurrency: bool,
    /// Worker pool size; omitted means min(available cores, 8)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Encode with one shared palette
    #[serde(default = "default_true")]
    pub optimize: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { concurrency: true, max_workers: None, optimize: true }
    }
}

fn default_true() -> bool {
    true
}

/// Root of `pngbob.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PngbobConfig {
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// A single configuration problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    /// Dotted path to the invalid key (e.g., "animation.frames")
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl PngbobConfig {
    /// Collect every invalid value rather than stopping at the first.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: &str| {
            errors.push(ConfigValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.animation.frames == 0 {
            invalid("animation.frames", "must be a positive integer");
        }
        if self.animation.duration_ms == 0 {
            invalid("animation.duration_ms", "must be a positive integer");
        }
        if self.performance.max_workers == Some(0) {
            invalid("performance.max_workers", "must be a positive integer");
        }

        errors
    }

    pub fn animation_params(&self) -> AnimationParams {
        AnimationParams::new(
            self.animation.frames,
            self.animation.bob_height,
            self.animation.duration_ms,
        )
    }

    pub fn performance_options(&self) -> PerformanceOptions {
        PerformanceOptions {
            enable_concurrency: self.performance.concurrency,
            max_workers: self.performance.max_workers,
            enable_palette_optimization: self.performance.optimize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: PngbobConfig = toml::from_str("").unwrap();
        assert_eq!(config, PngbobConfig::default());
        assert_eq!(config.animation_params(), AnimationParams::default());
        assert_eq!(config.performance_options(), PerformanceOptions::default());
    }

    #[test]
    fn test_partial_tables() {
        let config: PngbobConfig = toml::from_str(
            r#"
[animation]
bob_height = 4

[performance]
max_workers = 2
"#,
        )
        .unwrap();
        assert_eq!(config.animation.frames, 30);
        assert_eq!(config.animation.bob_height, 4);
        assert_eq!(config.performance.max_workers, Some(2));
        assert!(config.performance.optimize);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<PngbobConfig>("[animation]\nspeed = 3\n").is_err());
        assert!(toml::from_str::<PngbobConfig>("[output]\ndir = \"x\"\n").is_err());
    }

    #[test]
    fn test_negative_values_rejected_at_parse() {
        assert!(toml::from_str::<PngbobConfig>("[animation]\nbob_height = -1\n").is_err());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = PngbobConfig::default();
        config.animation.frames = 0;
        config.animation.duration_ms = 0;
        config.performance.max_workers = Some(0);

        let errors = config.validate();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].to_string(), "animation.frames: must be a positive integer");
    }

    #[test]
    fn test_validate_default_ok() {
        assert!(PngbobConfig::default().validate().is_empty());
    }
}

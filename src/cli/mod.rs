//! Command-line interface implementation
//!
//! A thin caller of [`Pipeline`]: settings come from `pngbob.toml` (if any)
//! with command-line flags layered on top.

use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::config::{load_config, merge_cli_overrides, CliOverrides, PngbobConfig};
use crate::error::{ErrorKind, PipelineError};
use crate::pipeline::{OutputArtifact, Pipeline};
use crate::progress::{ConsoleProgress, JsonProgress, NullProgress, ProgressReporter};

/// Process exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// pngbob - Turn a PNG into a looping bobbing GIF
#[derive(Parser, Debug)]
#[command(name = "pngbob")]
#[command(about = "Convert a PNG into a looping animated GIF that bobs up and down")]
#[command(version)]
pub struct Cli {
    /// Input image (PNG or any format the image decoder understands)
    pub input: PathBuf,

    /// Output GIF file or directory.
    /// If omitted: {input stem}_bobbing.gif in the current directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of frames in one bob cycle [default: 30]
    #[arg(short, long)]
    pub frames: Option<u32>,

    /// Bob height in pixels [default: 10]
    #[arg(short, long)]
    pub bob_height: Option<u32>,

    /// Frame duration in milliseconds [default: 80]
    #[arg(short, long = "duration")]
    pub duration: Option<u32>,

    /// Generate frames on the calling thread only
    #[arg(long)]
    pub no_concurrency: bool,

    /// Skip shared-palette optimization
    #[arg(long)]
    pub no_optimize: bool,

    /// Maximum worker threads (bounded by available cores)
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Config file (default: nearest pngbob.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print progress as JSON lines and the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Show every frame and debug diagnostics
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress progress output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            frames: self.frames,
            bob_height: self.bob_height,
            duration_ms: self.duration,
            concurrency: self.no_concurrency.then_some(false),
            max_workers: self.max_workers,
            optimize: self.no_optimize.then_some(false),
        }
    }

    fn progress(&self) -> Arc<dyn ProgressReporter> {
        if self.quiet {
            Arc::new(NullProgress::new())
        } else if self.json {
            Arc::new(JsonProgress::new())
        } else {
            Arc::new(
                ConsoleProgress::new()
                    .with_colors(std::io::stderr().is_terminal())
                    .with_verbose(self.verbose),
            )
        }
    }
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_INVALID_ARGS)
            } else {
                ExitCode::from(EXIT_SUCCESS)
            };
        }
    };

    if cli.verbose {
        init_tracing();
    }

    match run_animation(&cli) {
        Ok(artifact) => {
            if cli.json {
                match serde_json::to_string_pretty(&artifact) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return ExitCode::from(EXIT_ERROR);
                    }
                }
            } else {
                println!("{}", artifact.path.display());
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run_animation(cli: &Cli) -> Result<OutputArtifact, PipelineError> {
    let config = resolve_config(cli)?;
    let pipeline = Pipeline::configure(
        &cli.input,
        cli.output.clone(),
        config.animation_params(),
        config.performance_options(),
    )?
    .with_progress(cli.progress());
    pipeline.run()
}

fn resolve_config(cli: &Cli) -> Result<PngbobConfig, PipelineError> {
    let mut config = load_config(cli.config.as_deref())?;
    merge_cli_overrides(&mut config, &cli.overrides());
    Ok(config)
}

/// Out-of-range settings are argument errors; everything else is a run failure.
fn exit_code_for(error: &PipelineError) -> u8 {
    match error.kind() {
        ErrorKind::Validation => EXIT_INVALID_ARGS,
        _ => EXIT_ERROR,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::source::SourceError;

    #[test]
    fn test_parse_minimal() {
        let cli = Cli::try_parse_from(["pngbob", "sprite.png"]).unwrap();
        assert_eq!(cli.input, PathBuf::from("sprite.png"));
        assert!(cli.output.is_none());
        assert!(!cli.no_concurrency);

        let overrides = cli.overrides();
        assert_eq!(overrides.frames, None);
        assert_eq!(overrides.concurrency, None);
        assert_eq!(overrides.optimize, None);
    }

    #[test]
    fn test_parse_all_flags() {
        let cli = Cli::try_parse_from([
            "pngbob",
            "sprite.png",
            "-o",
            "out.gif",
            "-f",
            "12",
            "-b",
            "4",
            "-d",
            "50",
            "--no-concurrency",
            "--no-optimize",
            "--max-workers",
            "3",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(cli.output, Some(PathBuf::from("out.gif")));
        assert_eq!(overrides.frames, Some(12));
        assert_eq!(overrides.bob_height, Some(4));
        assert_eq!(overrides.duration_ms, Some(50));
        assert_eq!(overrides.concurrency, Some(false));
        assert_eq!(overrides.optimize, Some(false));
        assert_eq!(overrides.max_workers, Some(3));
    }

    #[test]
    fn test_parse_rejects_negative_frames() {
        assert!(Cli::try_parse_from(["pngbob", "sprite.png", "-f", "-3"]).is_err());
    }

    #[test]
    fn test_parse_requires_input() {
        assert!(Cli::try_parse_from(["pngbob"]).is_err());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["pngbob", "a.png", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let validation: PipelineError = ValidationError::FrameCount(0).into();
        assert_eq!(exit_code_for(&validation), EXIT_INVALID_ARGS);

        let missing: PipelineError = SourceError::NotFound { path: PathBuf::from("x.png") }.into();
        assert_eq!(exit_code_for(&missing), EXIT_ERROR);
    }
}

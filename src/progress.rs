//! Progress reporting
//!
//! The pipeline narrates what it is doing through a [`ProgressReporter`].
//! Recoverable problems (a frame that had to be recomputed, a palette
//! optimization that fell back to standard encoding) are reported here as
//! well; they never turn into errors.
//!
//! # Example
//!
//! ```
//! use pngbob::progress::{ConsoleProgress, ProgressEvent, ProgressReporter};
//!
//! let reporter = ConsoleProgress::with_output(std::io::sink());
//! reporter.report(ProgressEvent::FramesStarted { total: 30, workers: 4, concurrent: true });
//! reporter.report(ProgressEvent::FrameCompleted { index: 0, total: 30 });
//! ```

use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Events that can be reported while building an animation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Source image decoded
    SourceLoaded {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    /// Frame generation started
    FramesStarted {
        total: u32,
        workers: usize,
        concurrent: bool,
    },
    /// One frame finished (reported in index order)
    FrameCompleted { index: u32, total: u32 },
    /// A frame task failed and was recomputed synchronously
    FrameRetried { index: u32, reason: String },
    /// All frames exist
    FramesCompleted { total: u32, duration_ms: u64 },
    /// Palette optimization failed; standard encoding is used instead
    OptimizationFallback { reason: String },
    /// Writing the container started
    EncodeStarted { path: PathBuf, optimized: bool },
    /// The artifact was written
    Completed {
        path: PathBuf,
        frames: u32,
        bytes: u64,
        duration_ms: u64,
    },
    /// Anything else worth telling the user
    Warning { message: String },
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Records every event, in order.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events reported so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Indices of frames that had to be recomputed.
    pub fn retried_frames(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::FrameRetried { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    /// Whether an optimization fallback was reported.
    pub fn saw_fallback(&self) -> bool {
        self.events().iter().any(|e| matches!(e, ProgressEvent::OptimizationFallback { .. }))
    }
}

impl ProgressReporter for CollectingProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Console progress reporter with optional colors.
pub struct ConsoleProgress {
    /// Whether to use colors
    use_colors: bool,
    /// Whether to show every frame
    verbose: bool,
    /// Output writer (for testing)
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl ConsoleProgress {
    /// Create a new console progress reporter writing to stderr.
    pub fn new() -> Self {
        Self { use_colors: true, verbose: false, output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a console progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self {
            use_colors: false, // Disable colors for custom output
            verbose: false,
            output: Mutex::new(Box::new(output)),
        }
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn writeln(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", line);
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::SourceLoaded { path, width, height } => {
                self.writeln(&format!(
                    "{} {} ({}x{})",
                    self.cyan("[load]"),
                    path.display(),
                    width,
                    height
                ));
            }
            ProgressEvent::FramesStarted { total, workers, concurrent } => {
                let mode = if concurrent {
                    format!("{} worker{}", workers, if workers == 1 { "" } else { "s" })
                } else {
                    "sequential".to_string()
                };
                self.writeln(&format!(
                    "{} Creating {} frame{} ({})...",
                    self.cyan("[frames]"),
                    total,
                    if total == 1 { "" } else { "s" },
                    mode
                ));
            }
            ProgressEvent::FrameCompleted { index, total } => {
                // Every fifth frame, plus the last one
                if self.verbose || index % 5 == 0 || index + 1 == total {
                    self.writeln(&format!(
                        "{} Completed frame {}/{}",
                        self.cyan("[frames]"),
                        index + 1,
                        total
                    ));
                }
            }
            ProgressEvent::FrameRetried { index, reason } => {
                self.writeln(&format!(
                    "{} frame {} failed ({}), recomputed synchronously",
                    self.yellow("[warn]"),
                    index,
                    reason
                ));
            }
            ProgressEvent::FramesCompleted { total, duration_ms } => {
                if self.verbose {
                    self.writeln(&format!(
                        "{} {} frames in {}",
                        self.cyan("[frames]"),
                        total,
                        format_duration(duration_ms)
                    ));
                }
            }
            ProgressEvent::OptimizationFallback { reason } => {
                self.writeln(&format!(
                    "{} Optimization failed ({}), falling back to standard encoding",
                    self.yellow("[warn]"),
                    reason
                ));
            }
            ProgressEvent::EncodeStarted { path, optimized } => {
                self.writeln(&format!(
                    "{} Saving {}animation to {}",
                    self.cyan("[encode]"),
                    if optimized { "optimized " } else { "" },
                    path.display()
                ));
            }
            ProgressEvent::Completed { path, frames, bytes, duration_ms } => {
                self.writeln(&format!(
                    "{} {} ({} frames, {}) in {}",
                    self.green("[done]"),
                    path.display(),
                    frames,
                    format_bytes(bytes),
                    format_duration(duration_ms)
                ));
            }
            ProgressEvent::Warning { message } => {
                self.writeln(&format!("{} {}", self.yellow("[warn]"), message));
            }
        }
    }
}

/// JSON-lines progress reporter for machine-readable output.
pub struct JsonProgress {
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonProgress").finish()
    }
}

impl JsonProgress {
    /// Create a new JSON progress reporter writing to stderr.
    pub fn new() -> Self {
        Self { output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a JSON progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let Ok(json) = serde_json::to_string(&event) else {
            return;
        };
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", json);
        }
    }
}

/// Format a duration in milliseconds to a human-readable string.
fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Writer that appends into a shared buffer.
    struct TestWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn console() -> (ConsoleProgress, Arc<Mutex<Vec<u8>>>) {
        let output = Arc::new(Mutex::new(Vec::new()));
        let reporter = ConsoleProgress::with_output(TestWriter(Arc::clone(&output)));
        (reporter, output)
    }

    fn text(output: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&output.lock().unwrap()).into_owned()
    }

    #[test]
    fn test_null_progress() {
        let reporter = NullProgress::new();
        reporter.report(ProgressEvent::Warning { message: "ignored".to_string() });
    }

    #[test]
    fn test_collecting_progress() {
        let reporter = CollectingProgress::new();
        reporter.report(ProgressEvent::FrameRetried { index: 4, reason: "boom".to_string() });
        reporter.report(ProgressEvent::OptimizationFallback { reason: "bad".to_string() });

        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.retried_frames(), vec![4]);
        assert!(reporter.saw_fallback());
    }

    #[test]
    fn test_console_frames_started() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::FramesStarted { total: 30, workers: 4, concurrent: true });
        reporter.report(ProgressEvent::FramesStarted { total: 1, workers: 1, concurrent: false });

        let text = text(&output);
        assert!(text.contains("Creating 30 frames (4 workers)"));
        assert!(text.contains("Creating 1 frame (sequential)"));
    }

    #[test]
    fn test_console_frame_cadence() {
        let (reporter, output) = console();
        for index in 0..12 {
            reporter.report(ProgressEvent::FrameCompleted { index, total: 12 });
        }

        let text = text(&output);
        assert!(text.contains("Completed frame 1/12"));
        assert!(text.contains("Completed frame 6/12"));
        assert!(text.contains("Completed frame 11/12"));
        assert!(text.contains("Completed frame 12/12"));
        assert!(!text.contains("Completed frame 2/12"));
    }

    #[test]
    fn test_console_verbose_shows_every_frame() {
        let (reporter, output) = console();
        let reporter = reporter.with_verbose(true);
        reporter.report(ProgressEvent::FrameCompleted { index: 1, total: 12 });
        assert!(text(&output).contains("Completed frame 2/12"));
    }

    #[test]
    fn test_console_fallback_warning() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::OptimizationFallback { reason: "no colors".to_string() });

        let text = text(&output);
        assert!(text.contains("[warn]"));
        assert!(text.contains("falling back to standard encoding"));
        assert!(text.contains("no colors"));
    }

    #[test]
    fn test_console_completed() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::Completed {
            path: PathBuf::from("out.gif"),
            frames: 30,
            bytes: 2048,
            duration_ms: 1500,
        });

        let text = text(&output);
        assert!(text.contains("[done] out.gif (30 frames, 2.0 KB) in 1.5s"));
    }

    #[test]
    fn test_console_no_colors_for_custom_output() {
        let (reporter, output) = console();
        reporter.report(ProgressEvent::Warning { message: "hmm".to_string() });
        assert!(!text(&output).contains("\x1b["));
    }

    #[test]
    fn test_json_progress_lines() {
        let output = Arc::new(Mutex::new(Vec::new()));
        let reporter = JsonProgress::with_output(TestWriter(Arc::clone(&output)));
        reporter.report(ProgressEvent::FrameRetried { index: 2, reason: "quote \"x\"".to_string() });

        let text = text(&output);
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["event"], "frame_retried");
        assert_eq!(value["index"], 2);
        assert_eq!(value["reason"], "quote \"x\"");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(500), "500ms");
        assert_eq!(format_duration(1500), "1.5s");
        assert_eq!(format_duration(65000), "1m 5s");
    }
}

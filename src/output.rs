//! Output file path generation

use std::path::{Path, PathBuf};

/// Container extension for every artifact.
pub const GIF_EXTENSION: &str = "gif";
/// Appended to the input stem for default output names.
pub const OUTPUT_SUFFIX: &str = "_bobbing";

fn output_file_name(input: &Path) -> String {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    format!("{}{}.{}", stem, OUTPUT_SUFFIX, GIF_EXTENSION)
}

/// `{stem}_bobbing.gif`, relative to the working directory.
pub fn default_output_path(input: &Path) -> PathBuf {
    PathBuf::from(output_file_name(input))
}

/// `{stem}_bobbing.gif` next to the input file.
pub fn sibling_output_path(input: &Path) -> PathBuf {
    let name = output_file_name(input);
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

/// Where the artifact for `input` is written.
///
/// | `output_arg` | Result |
/// |--------------|--------|
/// | none | `{stem}_bobbing.gif` |
/// | `dir/` or an existing directory | `dir/{stem}_bobbing.gif` |
/// | `anim.gif` | `anim.gif` |
pub fn resolve_output_path(input: &Path, output_arg: Option<&Path>) -> PathBuf {
    match output_arg {
        Some(output) => {
            let is_dir = output.as_os_str().to_string_lossy().ends_with('/') || output.is_dir();
            if is_dir {
                output.join(output_file_name(input))
            } else {
                output.to_path_buf()
            }
        }
        None => default_output_path(input),
    }
}

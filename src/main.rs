//! pngbob - Command-line tool for turning a PNG into a bobbing animated GIF

use std::process::ExitCode;

use pngbob::cli;

fn main() -> ExitCode {
    cli::run()
}

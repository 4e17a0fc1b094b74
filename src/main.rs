//! Pixpack - command-line tool for packing sprite sheets into atlases

use std::process::ExitCode;

use pixpack::cli;

fn main() -> ExitCode {
    cli::run()
}

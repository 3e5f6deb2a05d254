//! CLI entrypoint for the warden lint router.
//!
//! The binary delegates to [`warden_cli::run`], which loads configuration,
//! parses the command, and prints the outcome as JSON.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    warden_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}

//! CLI entrypoint for the scan-in/scan-out client.
//!
//! The binary delegates to [`scaninout_cli::run`], which loads configuration,
//! sends one request to the daemon, and prints the response fields.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    scaninout_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}

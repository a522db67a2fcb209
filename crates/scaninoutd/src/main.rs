use std::io::Write;
use std::process::ExitCode;

fn main() -> ExitCode {
    match scaninoutd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = std::io::stderr().lock();
            // Nothing useful remains to be done if stderr is gone.
            let _ = writeln!(stderr, "scaninoutd: {error}");
            ExitCode::FAILURE
        }
    }
}

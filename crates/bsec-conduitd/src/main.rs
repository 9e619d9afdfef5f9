use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match bsec_conduitd::run_daemon() {
        Ok(outcome) => outcome.exit_code(),
        Err(error) => {
            let _ = writeln!(io::stderr(), "bsec-conduitd: {error}");
            ExitCode::FAILURE
        }
    }
}

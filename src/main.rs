//! taskgraph - drive items to their desired state

use std::process::ExitCode;

fn main() -> ExitCode {
    match taskgraph::cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

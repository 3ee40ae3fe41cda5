//! rtstore CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`; errors go to stderr
//! with a non-zero exit code. All other logic lives in the CLI module.

use rtstore::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

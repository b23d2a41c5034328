//! nestdb CLI entry point
//!
//! Parses arguments and dispatches through the CLI module. Failures are
//! reported as a JSON error on stdout and a plain line on stderr, with a
//! non-zero exit code.

use nestdb::cli;

fn main() {
    if let Err(e) = cli::run() {
        let _ = cli::write_error(e.code_str(), e.message());
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

//! CLI entry point.
//!
//! # Responsibility
//! - Print the core version.
//! - Scope a stylesheet file under a selector prefix and print the result.
//!
//! # Invariants
//! - Exit code `1` on I/O or CSS errors, `2` on usage errors.
//! - File logging only starts when `MICROHOST_LOG_DIR` is set.

use log::{error, info};
use std::process::ExitCode;

const USAGE: &str = "usage: microhost_cli [version | scope <prefix> <file>]";
const LOG_DIR_ENV: &str = "MICROHOST_LOG_DIR";

fn main() -> ExitCode {
    init_logging_from_env();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["version"] => {
            println!("microhost_core version={}", microhost_core::core_version());
            ExitCode::SUCCESS
        }
        ["scope", prefix, file] => run_scope(prefix, file),
        _ => {
            eprintln!("{USAGE}");
            ExitCode::from(2)
        }
    }
}

fn run_scope(prefix: &str, file: &str) -> ExitCode {
    let css = match std::fs::read_to_string(file) {
        Ok(css) => css,
        Err(err) => {
            error!("event=cli_scope module=cli status=error file={file} error={err}");
            eprintln!("failed to read `{file}`: {err}");
            return ExitCode::from(1);
        }
    };

    match microhost_core::scope_css(&css, prefix) {
        Ok(scoped) => {
            info!(
                "event=cli_scope module=cli status=ok file={file} bytes_in={} bytes_out={}",
                css.len(),
                scoped.len()
            );
            println!("{scoped}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_scope module=cli status=error file={file} error={err}");
            eprintln!("failed to scope `{file}`: {err}");
            ExitCode::from(1)
        }
    }
}

fn init_logging_from_env() {
    let Ok(log_dir) = std::env::var(LOG_DIR_ENV) else {
        return;
    };
    if let Err(err) = microhost_core::init_logging(microhost_core::default_log_level(), &log_dir) {
        eprintln!("logging disabled: {err}");
    }
}

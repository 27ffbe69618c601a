//! Minimal entry point: load and validate a run configuration.
//!
//! Wiring a config into a runnable [`ion_bca::driver::Driver`] additionally
//! needs a periodic-table lookup (to resolve element symbols into
//! `target::Atom` records) and a `dedx::StoppingSource` data provider —
//! both collaborator interfaces this crate deliberately doesn't implement.
//! A full CLI front-end is out of scope; this binary only exercises config
//! loading/validation end to end.

use ion_bca::config::Config;
use std::env;
use std::fs;
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = match env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: ion-bca <config.json|config.toml>");
            return ExitCode::FAILURE;
        }
    };

    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to read {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = if path.ends_with(".toml") { Config::from_toml(&contents) } else { Config::from_json(&contents) };

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to parse {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    println!(
        "configuration '{}' is valid: {} ion(s), {} thread(s)",
        config.output.title, config.run.max_no_ions, config.run.threads
    );
    ExitCode::SUCCESS
}

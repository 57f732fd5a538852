//! Housekeeping tools for documents and action camera footage.
//!
//! * [`range`] and [`pdf`] back `extract-pages` and `rotate-pdf`.
//! * [`fragment`], [`plan`], [`command`], [`probe`] and [`merge`] back
//!   `merge-clips`, which joins the fragments a camera splits long
//!   recordings into.

pub mod awake;
pub mod command;
pub mod fragment;
pub mod merge;
pub mod paths;
pub mod pdf;
pub mod plan;
pub mod probe;
pub mod range;

use tracing_subscriber::EnvFilter;

/// Sets up stderr logging. `RUST_LOG` wins over `verbosity`.
pub fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Prints `error` and its causes to stderr, the way the binaries exit.
pub fn report_error(error: &failure::Error) {
    eprintln!("error: {}", error);
    for cause in error.iter_causes() {
        eprintln!("  caused by: {}", cause);
    }
}

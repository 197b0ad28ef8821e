//! Structured logging setup shared by the CLI and the background processor.

use std::io::IsTerminal;

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Whether ANSI color codes should be emitted: only when stdout is a
/// terminal and the user hasn't opted out via `NO_COLOR`.
#[must_use]
pub fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the global `tracing` subscriber.
///
/// Honors `RUST_LOG` if set; otherwise defaults to `specforge=debug,info`
/// under `--verbose` or `specforge=info,warn` in normal operation.
pub fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "specforge=debug,info"
    } else {
        "specforge=info,warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let fmt_layer = fmt::layer()
        .with_target(verbose)
        .with_ansi(use_color())
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

/// Initialize a JSON-formatted subscriber, used when `SPECFORGE_LOG_FORMAT=json`.
pub fn init_tracing_json(verbose: bool) {
    let default_directive = if verbose {
        "specforge=debug,info"
    } else {
        "specforge=info,warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let fmt_layer = fmt::layer().json().with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

/// Pick plain or JSON logging based on `SPECFORGE_LOG_FORMAT`, defaulting to
/// plain text.
pub fn init_from_env(verbose: bool) {
    match std::env::var("SPECFORGE_LOG_FORMAT").as_deref() {
        Ok("json") => init_tracing_json(verbose),
        _ => init_tracing(verbose),
    }
}

//! Development-time tracing.
//!
//! Diagnostics only: configured through `RUST_LOG`, written to stderr, never
//! part of command output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with a `warn` default.
///
/// # Example
/// ```bash
/// RUST_LOG=bread=debug bread check
/// ```
pub fn init() {
    init_with_default("warn");
}

/// Like [`init`], with `default` used when `RUST_LOG` is unset or invalid.
pub fn init_with_default(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

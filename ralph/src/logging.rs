//! Development-time tracing for debugging the loop.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. Loop progress
//! printed by the CLI goes to stdout, and per-iteration agent output is
//! written under `agent.log_dir`; neither is affected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=ralph=debug ralph run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

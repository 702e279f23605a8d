//! Tracing subscriber setup for the Lens daemon.

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` overrides `level` when set.
///
/// Call once at startup, before any `tracing` events are emitted.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

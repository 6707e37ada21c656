//! Logging and tracing utilities
//!
//! Library crates only emit `tracing` events. Binaries pick one of these
//! initialisers once at startup. `RUST_LOG` overrides the default filter.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize tracing subscriber with default configuration
pub fn init_tracing() {
    init_tracing_with_filter(DEFAULT_FILTER);
}

/// Initialize human-readable tracing with `default` as the fallback filter
pub fn init_tracing_with_filter(default: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize tracing with one JSON object per event
///
/// Suited to log shippers; structured fields such as `tool_name` and
/// `call_id` become top-level keys of the event's `fields` object.
pub fn init_json_tracing() {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

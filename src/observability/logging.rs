//! Tracing subscriber setup for the server binary.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "workforce_analytics=info,tower_http=info";

/// Installs the global fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

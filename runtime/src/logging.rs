//! Tracing subscriber bootstrap.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to this
/// workspace's crates.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(default_level: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!(
        "request_queue_runtime={level},request_queue_core={level}"
    ))
}

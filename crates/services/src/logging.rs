use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stdout subscriber filtered by `filter` (`RUST_LOG` syntax).
///
/// An unparsable filter falls back to `info`. Returns `false` when a global
/// subscriber was already installed, so hosts and tests can call this freely.
pub fn init_tracing(filter: &str) -> bool {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}

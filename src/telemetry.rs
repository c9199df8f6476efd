//! Log output setup for the binary.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global log subscriber. `RUST_LOG` wins when set.
pub fn init_telemetry(verbose: bool) {
    let default_filter = if verbose {
        "info,docportal_fetch=debug,docfetch=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

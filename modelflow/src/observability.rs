//! Log subscriber setup for the binary.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Builds the filter: `RUST_LOG` when set, else `modelflow=<level>,warn`.
#[must_use]
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("modelflow={level},warn")))
        .unwrap_or_else(|_| EnvFilter::new("modelflow=info,warn"))
}

/// Installs the global subscriber.
///
/// Returns false when a subscriber was already installed (tests, embedding
/// applications); the existing one is kept.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = env_filter(&config.level);
    if config.json {
        let layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false);
        Registry::default().with(filter).with(layer).try_init().is_ok()
    } else {
        let layer = fmt::layer().with_target(true);
        Registry::default().with(filter).with(layer).try_init().is_ok()
    }
}

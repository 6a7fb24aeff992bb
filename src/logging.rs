//! Diagnostic logging for the shim itself.
//!
//! Transfer output belongs to the engine; these events describe the shim's
//! own lifecycle and go to stderr only when enabled through [`LOG_ENV`].

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "CURLSHIM_LOG";

/// Filter used when [`LOG_ENV`] is unset or invalid.
pub const DEFAULT_FILTER: &str = "warn";

/// Builds the filter from [`LOG_ENV`], falling back to [`DEFAULT_FILTER`].
#[must_use]
pub fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the stderr subscriber. Later calls leave the first one in place.
pub fn init() {
    tracing_subscriber::registry()
        .with(filter_from_env())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .ok();
}

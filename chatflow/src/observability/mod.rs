//! Logging setup.
//!
//! The library only emits `tracing` events. Applications call one of the
//! initializers below once at startup; both are idempotent.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding per-module log directives.
pub const LOG_ENV: &str = "CHATFLOW_LOG";

/// Directive used when [`LOG_ENV`] is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "chatflow=info";

static INIT: Once = Once::new();

/// Builds the filter from `CHATFLOW_LOG`, e.g.
/// `CHATFLOW_LOG=chatflow::pipeline=debug,chatflow::tracker=warn`.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs a human-readable subscriber.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(env_filter())
            .try_init();
    });
}

/// Installs a JSON subscriber, one object per event.
pub fn init_json_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().json().with_current_span(false))
            .with(env_filter())
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
        init_json_tracing();
        tracing::info!(target: "chatflow", "still logging");
    }

    #[test]
    fn test_default_directive_parses() {
        let filter = EnvFilter::new(DEFAULT_DIRECTIVE);
        assert!(filter.to_string().contains("chatflow"));
    }
}

//! Tracing subscriber initialization.

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Selects JSON output when set to `json`.
pub const LOG_FORMAT_VAR: &str = "PGBROKER_LOG_FORMAT";

const DEFAULT_FILTER: &str = "pgbroker_db=info,pgbroker_core=info,warn";

#[derive(Debug, Error)]
#[error("Failed to init subscriber: {0}")]
pub struct TelemetryError(String);

/// Install the global subscriber. The filter comes from `RUST_LOG`; output
/// goes to stderr so stdout stays free for command results.
///
/// Call once at startup, before any tracing occurs.
pub fn init_tracing() -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var(LOG_FORMAT_VAR)
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| TelemetryError(e.to_string()))?;
    tracing::debug!(json, "Tracing initialized");
    Ok(())
}

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use crate::config::{LogFormat, LoggingConfig};

const CRATE_TARGET: &str = "semantic_query_cache";
const FALLBACK_LEVEL: &str = "info";

/// Filter that applies `level` to cache events and keeps dependencies at
/// `warn`. An unparseable level falls back to `info`.
fn cache_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("warn,{}={}", CRATE_TARGET, level.trim())).unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,{}={}", CRATE_TARGET, FALLBACK_LEVEL))
    })
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Logs go to stderr; stdout carries command output only.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| cache_filter(&config.level));

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()?,
    }

    tracing::debug!(level = %config.level, "semantic cache logging ready");

    Ok(())
}

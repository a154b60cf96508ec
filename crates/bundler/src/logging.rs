//! Process-wide log and trace subscriber setup.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::ConfigError;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Builds the event filter. `RUST_LOG` wins over the configured level.
pub fn build_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| ConfigError::Logging(format!("Invalid log level '{}': {}", level, e)))
}

/// Installs the global subscriber and routes `log` records into it.
///
/// Returns `Ok(true)` when this call installed the subscriber and `Ok(false)`
/// when logging was already set up.
pub fn init(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = build_filter(&config.level)?;

    if INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(false);
    }

    let (json_layer, plain_layer) = if config.json {
        (Some(fmt::layer().json().with_current_span(true)), None)
    } else {
        (None, Some(fmt::layer().with_target(true)))
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // Someone else owns the global subscriber; leave it in place.
        return Ok(false);
    }

    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::warn!("log records will not be captured: {}", e);
    }

    log::info!(
        "Logging initialized (level: {}, json: {})",
        config.level,
        config.json
    );
    Ok(true)
}

//! Tracing setup.
//!
//! The subscriber is installed before configuration is read, so the filter
//! sits behind a reload layer and is swapped once `logging.level` is known.
//! `RUST_LOG` always wins over the configured level.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

const STARTUP_LEVEL: &str = "info";

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = env_filter().unwrap_or_else(|| EnvFilter::new(STARTUP_LEVEL));
    let (filter_layer, handle) = reload::Layer::new(filter);

    if tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
    {
        let _ = FILTER_HANDLE.set(handle);
    }
}

/// Switch to the configured level unless `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) {
    if env_filter().is_some() {
        tracing::debug!("RUST_LOG set, ignoring logging.level");
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    let filter = match EnvFilter::try_new(level) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!(level, error = %e, "Invalid logging.level, keeping current filter");
            return;
        }
    };
    match handle.reload(filter) {
        Ok(()) => tracing::info!(level, "Log level applied"),
        Err(e) => tracing::warn!(error = %e, "Failed to apply log level"),
    }
}

fn env_filter() -> Option<EnvFilter> {
    std::env::var_os(EnvFilter::DEFAULT_ENV)?;
    EnvFilter::try_from_default_env().ok()
}

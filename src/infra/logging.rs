use tracing_subscriber::EnvFilter;

use crate::infra::{config::LogConfig, error::AppError};

/// Installs the global subscriber. The configured level is the fallback; a
/// `RUST_LOG` environment filter wins when set.
pub fn init(config: &LogConfig) -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)),
        )
        .with_target(true)
        .compact()
        .try_init()
        .map_err(AppError::LoggingInit)?;

    tracing::debug!(level = %config.level, "logging initialized");
    Ok(())
}

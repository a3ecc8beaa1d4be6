//! Online store entry point.
//!
//! Loads the configuration, installs tracing and the Prometheus recorder,
//! connects the configured store and applies pending migrations.

use app::{AppConfig, AppError};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;

    app::telemetry::init(&config.log_filter, config.log_format)
        .map_err(|e| AppError::Telemetry(e.to_string()))?;
    let metrics = app::telemetry::init_metrics()?;

    let backend = app::bootstrap(&config).await?;
    tracing::info!(
        backend = backend.name(),
        issuer = %config.token_issuer,
        token_ttl_secs = config.token_ttl.num_seconds(),
        "online store ready"
    );
    tracing::debug!(metrics = %metrics.render(), "metrics recorder installed");

    Ok(())
}

//! Tracing and metrics setup.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::ServiceError;

/// Installs the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &Config) -> Result<(), ServiceError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| ServiceError::Telemetry(e.to_string()))?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    result.map_err(|e| ServiceError::Telemetry(e.to_string()))
}

/// Installs the Prometheus recorder behind the `metrics` macros.
pub fn install_metrics() -> Result<PrometheusHandle, ServiceError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServiceError::Telemetry(e.to_string()))
}

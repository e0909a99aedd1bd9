//! Service startup errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

//! Monitor error types

use netrom_router::RouterError;
use thiserror::Error;

/// Errors that stop the monitor or one of its sources
#[derive(Debug, Error)]
pub enum MonitorError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Settings (de)serialization error
    #[error("settings format error: {0}")]
    Json(#[from] serde_json::Error),

    /// Router actor error
    #[error(transparent)]
    Router(#[from] RouterError),

    /// No configuration directory could be determined
    #[error("could not determine settings path")]
    NoConfigDir,
}

//! Error types for the router
//!
//! Packet processing never fails; these errors come from configuration
//! checks, snapshot I/O and the actor boundary only.

use thiserror::Error;

/// Errors that can occur outside per-packet processing
#[derive(Debug, Error)]
pub enum RouterError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error
    #[error("snapshot format error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Snapshot is too old or was taken under a different configuration
    #[error("snapshot rejected: {0}")]
    SnapshotRejected(String),

    /// The router actor has shut down
    #[error("router actor is no longer running")]
    ActorGone,
}

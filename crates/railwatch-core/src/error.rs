//! Error type shared by all Railwatch crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RailwatchError>;

#[derive(Debug, Error)]
pub enum RailwatchError {
    /// Invalid or missing configuration. Always fatal at startup.
    #[error("Config error: {0}")]
    Config(String),

    /// The delivery ledger could not be read or written.
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Subscription registry error: {0}")]
    Registry(String),

    /// A message could not be delivered.
    #[error("Notify error: {0}")]
    Notify(String),

    /// The incident feed could not be fetched or decoded.
    #[error("Source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RailwatchError {
    /// Whether this error should abort startup rather than be logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RailwatchError::Config(_))
    }
}

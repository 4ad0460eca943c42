//! Error types for the AppGrid registry.

use thiserror::Error;

/// Result type alias for registry operations.
pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("could not open registry file: {0}")]
    Open(String),

    #[error("registry transaction failed: {0}")]
    Transaction(String),

    #[error("registry table unavailable: {0}")]
    Table(String),

    #[error("could not read registry row: {0}")]
    Read(String),

    #[error("could not write registry row: {0}")]
    Write(String),

    #[error("could not encode app or instance entry: {0}")]
    Serialize(String),

    #[error("stored app or instance entry is corrupt: {0}")]
    Deserialize(String),
}

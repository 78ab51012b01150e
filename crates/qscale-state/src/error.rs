//! Error types for the qscale timer store.

use thiserror::Error;

/// Result type alias for timer store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during timer store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Reachable, but held by another process right now.
    #[error("store busy: {0} is held by another process")]
    Busy(String),
}

//! Signal collaborator error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for collaborator calls.
pub type SignalResult<T> = Result<T, SignalError>;

/// Errors a collaborator call can produce.
///
/// The reader never propagates these out of a tick; they are logged and
/// mapped to the documented fallback values.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected status {status} from {uri}")]
    Status { status: u16, uri: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

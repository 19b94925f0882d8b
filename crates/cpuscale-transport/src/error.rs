//! Transport error types.

use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

/// Outcome of a logical call that did not produce a value.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: String,
    },

    #[error("{operation} cancelled after {attempts} attempt(s)")]
    Cancelled { operation: String, attempts: u32 },

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    /// Number of attempts made before the call gave up.
    pub fn attempts(&self) -> u32 {
        match self {
            TransportError::Exhausted { attempts, .. }
            | TransportError::Cancelled { attempts, .. } => *attempts,
            TransportError::InvalidUrl { .. } | TransportError::Encode(_) => 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled { .. })
    }
}

/// Why a single attempt failed. Every variant is retried.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),

    #[error("unexpected status {0}")]
    Status(http::StatusCode),

    #[error("malformed response body: {0}")]
    Decode(#[source] serde_json::Error),
}

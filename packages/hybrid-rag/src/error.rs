//! Typed errors for the hybrid retrieval library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use std::time::Duration;

use thiserror::Error;

use crate::types::retrieval::Origin;

/// Errors that can occur during routing and orchestration.
#[derive(Debug, Error)]
pub enum RagError {
    /// Retrieval backend failed
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Language model unavailable or failed
    #[error("model error: {0}")]
    Model(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Invalid query provided
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by the vector and graph collaborators.
///
/// These never leave the `RetrievalOrchestrator`; they are folded into a
/// [`SourceReport`](crate::types::retrieval::SourceReport) instead.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend not reachable
    #[error("{origin} backend unavailable: {message}")]
    Unavailable { origin: Origin, message: String },

    /// Structured query could not be built or was rejected
    #[error("malformed {origin} query: {message}")]
    MalformedQuery { origin: Origin, message: String },

    /// Call exceeded its per-source timeout
    #[error("{origin} search timed out after {after:?}")]
    Timeout { origin: Origin, after: Duration },

    /// Anything else the backend reported
    #[error("{origin} backend error: {message}")]
    Other { origin: Origin, message: String },
}

impl BackendError {
    /// Which source raised this error.
    pub fn origin(&self) -> Origin {
        match self {
            Self::Unavailable { origin, .. }
            | Self::MalformedQuery { origin, .. }
            | Self::Timeout { origin, .. }
            | Self::Other { origin, .. } => *origin,
        }
    }

    /// Whether this error is a timeout rather than a hard failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type alias for routing and orchestration operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Result type alias for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

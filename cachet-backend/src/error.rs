//! Error types for backend operations.

use thiserror::Error;

/// Error type for backend operations.
///
/// Backend errors never reach the caller of a cached request: the engine
/// logs them and treats the lookup as a miss.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Internal backend error, state or computation error.
    #[error(transparent)]
    InternalError(Box<dyn std::error::Error + Send + Sync>),

    /// Serialization or deserialization error.
    #[error(transparent)]
    FormatError(#[from] serde_json::Error),

    /// The storage area has no room left for the write.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// The backend cannot operate with its current configuration.
    #[error("backend misconfigured: {0}")]
    Misconfigured(String),
}

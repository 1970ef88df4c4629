use std::sync::Arc;

use cachet_backend::BackendError;
use cachet_core::Response;
use thiserror::Error;

/// Error returned by [`Cache::execute`](crate::Cache::execute).
///
/// On the error path the cache is invisible: transport errors and rejected
/// responses come back exactly as the transport produced them. Concurrent
/// callers sharing one in-flight request all observe the same error, so the
/// transport error is reference counted.
#[derive(Debug, Error)]
pub enum CacheError<E> {
    /// The transport failed.
    #[error(transparent)]
    Upstream(Arc<E>),

    /// The transport answered with a status the cache does not accept as
    /// success. The full response is preserved.
    #[error("upstream responded with status {}", .0.status)]
    Status(Response),

    /// This caller waited longer than its request timeout for another
    /// caller's in-flight request.
    #[error("timed out waiting for an in-flight request")]
    Timeout,
}

impl<E> Clone for CacheError<E> {
    fn clone(&self) -> Self {
        match self {
            CacheError::Upstream(error) => CacheError::Upstream(Arc::clone(error)),
            CacheError::Status(response) => CacheError::Status(response.clone()),
            CacheError::Timeout => CacheError::Timeout,
        }
    }
}

impl<E> CacheError<E> {
    /// The rejected response, if the transport produced one.
    pub fn response(&self) -> Option<&Response> {
        match self {
            CacheError::Status(response) => Some(response),
            _ => None,
        }
    }
}

/// Error raised while building a [`Cache`](crate::Cache).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The backend failed its capability check.
    #[error("backend `{backend}` failed validation: {source}")]
    InvalidBackend {
        /// Backend name.
        backend: String,
        /// Validation failure.
        #[source]
        source: BackendError,
    },
}

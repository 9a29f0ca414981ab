//! Remote store transport errors

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Result type for remote store calls
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors raised by a [`RemoteStore`](super::RemoteStore) implementation.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Bounds a remote call by `limit`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> RemoteResult<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(limit)),
    }
}

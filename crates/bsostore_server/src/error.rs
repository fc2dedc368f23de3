//! Error types for the storage server.

use bsostore_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling a request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Credential resolution failed.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request body exceeds the configured limit.
    #[error("request body too large: {size} bytes exceeds {limit}")]
    PayloadTooLarge {
        /// Body size.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// Error raised by the record store.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ServerError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            ServerError::InvalidRequest(_) | ServerError::PayloadTooLarge { .. } => {
                ErrorKind::MalformedRequest
            }
            ServerError::Core(err) => err.kind(),
        }
    }

    /// HTTP status code for the error.
    pub fn status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotAuthorized => 401,
            ErrorKind::MalformedRequest | ErrorKind::InvalidRecord => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::PreconditionFailed => 412,
            ErrorKind::Internal => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status() >= 500
    }

    /// Returns true if repeating the request may succeed.
    ///
    /// A precondition failure clears once the client has caught up with
    /// the collection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::PreconditionFailed | ErrorKind::Internal
        )
    }
}

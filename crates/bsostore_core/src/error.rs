//! Error types for BSOStore core.

use crate::types::Timestamp;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Machine-distinguishable classification of a rejection.
///
/// Clients use the kind to decide whether to retry, fix their input,
/// re-authenticate or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credential resolution failed; no store was touched.
    NotAuthorized,
    /// A filter, pagination value or body could not be parsed.
    MalformedRequest,
    /// A record failed validation.
    InvalidRecord,
    /// The addressed record does not exist.
    NotFound,
    /// The collection changed after the caller's reference timestamp.
    PreconditionFailed,
    /// Storage or journal failure on the server side.
    Internal,
}

impl ErrorKind {
    /// Returns a stable lowercase name for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotAuthorized => "not-authorized",
            Self::MalformedRequest => "malformed-request",
            Self::InvalidRecord => "invalid-record",
            Self::NotFound => "not-found",
            Self::PreconditionFailed => "precondition-failed",
            Self::Internal => "internal",
        }
    }
}

/// Errors that can occur in BSOStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Journal is corrupted or has an unknown format.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected in a journal frame.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// A journal entry or response body could not be encoded.
    #[error("encoding error: {message}")]
    Encoding {
        /// Description of the failure.
        message: String,
    },

    /// The account store is held open by another process.
    #[error("account store locked: another process has exclusive access")]
    StoreLocked,

    /// The account store does not exist and creation was not requested.
    #[error("account store not found: {account}")]
    StoreNotFound {
        /// The account whose store is missing.
        account: String,
    },

    /// The request could not be parsed.
    #[error("malformed request: {message}")]
    MalformedRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// A record failed validation.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// What was wrong with the record.
        message: String,
    },

    /// Record not found.
    #[error("record not found: {id} in collection {collection}")]
    RecordNotFound {
        /// The collection searched.
        collection: String,
        /// The record id that was not found.
        id: String,
    },

    /// The collection was modified after the caller's reference timestamp.
    #[error("precondition failed: collection {collection} last modified at {last_modified}")]
    PreconditionFailed {
        /// The guarded collection.
        collection: String,
        /// The collection's actual last-modified timestamp.
        last_modified: Timestamp,
    },
}

impl CoreError {
    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a malformed request error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a record not found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Classifies the error for callers deciding how to react.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedRequest { .. } => ErrorKind::MalformedRequest,
            Self::InvalidRecord { .. } => ErrorKind::InvalidRecord,
            Self::RecordNotFound { .. } => ErrorKind::NotFound,
            Self::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Self::Io(_)
            | Self::JournalCorruption { .. }
            | Self::ChecksumMismatch { .. }
            | Self::Encoding { .. }
            | Self::StoreLocked
            | Self::StoreNotFound { .. } => ErrorKind::Internal,
        }
    }
}

//! Optimistic-concurrency preconditions for writes.
//!
//! The check runs while the caller holds the collection's table lock, in
//! the same critical section as the mutation it protects.

use crate::error::{CoreError, CoreResult};
use crate::store::CollectionTable;
use crate::types::{CollectionName, Timestamp};

/// Condition a write must satisfy before it is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precondition {
    /// Always write.
    #[default]
    Unconditional,
    /// Write only if the collection has not been modified after this time.
    IfUnmodifiedSince(Timestamp),
}

impl Precondition {
    /// Builds a precondition from an optional `X-If-Unmodified-Since` value.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` if the value is not a timestamp.
    pub fn from_header(value: Option<&str>) -> CoreResult<Self> {
        match value {
            None => Ok(Self::Unconditional),
            Some(text) => Ok(Self::IfUnmodifiedSince(Timestamp::parse(text)?)),
        }
    }

    /// Rejects the write if the collection changed after the reference.
    ///
    /// A collection without records always passes.
    pub(crate) fn check(
        &self,
        collection: &CollectionName,
        table: &CollectionTable,
    ) -> CoreResult<()> {
        let Self::IfUnmodifiedSince(reference) = *self else {
            return Ok(());
        };
        match table.last_modified() {
            Some(last_modified) if last_modified > reference => {
                tracing::debug!(
                    collection = %collection,
                    %last_modified,
                    %reference,
                    "precondition failed"
                );
                Err(CoreError::PreconditionFailed {
                    collection: collection.to_string(),
                    last_modified,
                })
            }
            _ => Ok(()),
        }
    }
}

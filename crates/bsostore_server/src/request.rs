//! Transport-independent requests and responses.
//!
//! An HTTP front end parses routes and headers into these types and writes
//! [`StorageResponse`] back out unchanged.

use crate::error::ServerResult;
use bsostore_core::CoreError;
use serde::Serialize;

/// Header carrying the server time (or write time) of every response.
pub const TIMESTAMP_HEADER: &str = "X-Weave-Timestamp";

/// Header carrying the number of records in a list response.
pub const RECORDS_HEADER: &str = "X-Weave-Records";

/// Header carrying a collection's last-modified on precondition failure.
pub const LAST_MODIFIED_HEADER: &str = "X-Last-Modified";

/// One storage operation.
///
/// Collection names and record ids are raw; they are validated before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageRequest {
    /// Last-modified per collection.
    InfoCollections,
    /// Record count per collection.
    InfoCollectionCounts,
    /// Payload KB per collection.
    InfoCollectionUsage,
    /// Account usage and configured quota.
    InfoQuota,
    /// List records.
    GetCollection {
        /// Collection name.
        collection: String,
        /// Query parameters.
        params: Vec<(String, String)>,
    },
    /// Fetch one record.
    GetItem {
        /// Collection name.
        collection: String,
        /// Record id.
        id: String,
    },
    /// Create or update one record.
    PutItem {
        /// Collection name.
        collection: String,
        /// Record id.
        id: String,
        /// JSON object body.
        body: Vec<u8>,
    },
    /// Write a batch of records.
    PostCollection {
        /// Collection name.
        collection: String,
        /// Encoded record list.
        body: Vec<u8>,
    },
    /// Delete one record.
    DeleteItem {
        /// Collection name.
        collection: String,
        /// Record id.
        id: String,
    },
    /// Delete the records matching a list query.
    DeleteCollection {
        /// Collection name.
        collection: String,
        /// Query parameters.
        params: Vec<(String, String)>,
    },
    /// Delete everything the account stores.
    DeleteStorage {
        /// Must be true.
        confirm: bool,
    },
}

impl StorageRequest {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InfoCollections => "info_collections",
            Self::InfoCollectionCounts => "info_collection_counts",
            Self::InfoCollectionUsage => "info_collection_usage",
            Self::InfoQuota => "info_quota",
            Self::GetCollection { .. } => "get_collection",
            Self::GetItem { .. } => "get_item",
            Self::PutItem { .. } => "put_item",
            Self::PostCollection { .. } => "post_collection",
            Self::DeleteItem { .. } => "delete_item",
            Self::DeleteCollection { .. } => "delete_collection",
            Self::DeleteStorage { .. } => "delete_storage",
        }
    }
}

/// Per-request metadata taken from the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Account named by the request.
    pub account: String,
    /// Presented credential.
    pub credential: Vec<u8>,
    /// `Accept` header.
    pub accept: Option<String>,
    /// `Content-Type` header.
    pub content_type: Option<String>,
    /// Raw `X-If-Unmodified-Since` header.
    pub if_unmodified_since: Option<String>,
}

impl RequestContext {
    /// Creates a context for `account` with `credential`.
    pub fn new(account: impl Into<String>, credential: impl Into<Vec<u8>>) -> Self {
        Self {
            account: account.into(),
            credential: credential.into(),
            ..Self::default()
        }
    }

    /// Sets the `Accept` header.
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Sets the `Content-Type` header.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the `X-If-Unmodified-Since` header.
    pub fn with_if_unmodified_since(mut self, value: impl Into<String>) -> Self {
        self.if_unmodified_since = Some(value.into());
        self
    }
}

/// A response ready to be written by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl StorageResponse {
    pub(crate) fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_owned(), content_type.to_owned())],
            body,
        }
    }

    pub(crate) fn json<T: Serialize>(status: u16, value: &T) -> ServerResult<Self> {
        let body =
            serde_json::to_vec(value).map_err(|e| CoreError::encoding(e.to_string()))?;
        Ok(Self::new(status, "application/json", body))
    }

    pub(crate) fn with_header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.push((name.to_owned(), value.to_string()));
        self
    }

    /// Returns the first header named `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Parses the body as JSON.
    pub fn json_body(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

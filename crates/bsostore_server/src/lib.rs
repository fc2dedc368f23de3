//! # BSOStore Server
//!
//! Transport-independent request handling for BSOStore.
//!
//! This crate provides:
//! - Credential resolution (HMAC-SHA256 tokens, static password tables)
//! - Dispatch of storage requests to per-account record stores
//! - Response rendering with the negotiated list encoding
//! - Error kind to status mapping
//!
//! # Request Flow
//!
//! 1. The credential is checked against the account id named by the request
//! 2. The account id alone opens the account's store
//! 3. Parameters and bodies are validated before any mutation
//! 4. The store executes the operation under the collection lock
//!
//! # Authentication
//!
//! ```rust,ignore
//! use bsostore_core::{AccountId, SystemClock};
//! use bsostore_server::{ServerConfig, StorageServer, TokenResolver};
//! use std::sync::Arc;
//!
//! let tokens = Arc::new(TokenResolver::new(b"my-secure-secret-32-bytes-long!".to_vec(), Arc::new(SystemClock)));
//! let token = tokens.issue(&AccountId::parse("alice")?)?;
//! let server = StorageServer::new(ServerConfig::default().with_data_dir("/var/lib/bsostore"), tokens);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod request;
mod server;

pub use auth::{AllowAll, CredentialResolver, StaticResolver, TokenResolver};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use request::{
    RequestContext, StorageRequest, StorageResponse, LAST_MODIFIED_HEADER, RECORDS_HEADER,
    TIMESTAMP_HEADER,
};
pub use server::StorageServer;

//! # BSOStore Core
//!
//! Embedded per-account record store for BSOStore.
//!
//! This crate provides:
//! - Account stores holding named collections of BSOs (basic storage objects)
//! - A checksummed append-only journal for durability
//! - List queries with filters, sorting and pagination
//! - Merge-patch writes with per-record batch isolation
//! - Optimistic-concurrency preconditions
//! - Lazy ttl expiry
//! - The `json`, `newlines` and `whoisi` list encodings
//! - Account-wide usage summaries
//!
//! # Example
//!
//! ```rust,ignore
//! use bsostore_core::{AccountId, AccountStores, BsoQuery, CollectionName, Precondition, StoreConfig, SystemClock};
//! use std::sync::Arc;
//!
//! let stores = AccountStores::on_disk("/var/lib/bsostore", StoreConfig::default(), Arc::new(SystemClock));
//! let store = stores.store(&AccountId::parse("alice")?)?;
//! let history = CollectionName::parse("history")?;
//!
//! store.put(&history, "page-1", &serde_json::json!({"payload": "...", "sortindex": 3}), Precondition::Unconditional)?;
//! let newest = store.find(&history, &BsoQuery::from_params(&[("sort", "newest"), ("limit", "10")])?)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accounts;
mod aggregate;
mod bso;
mod clock;
mod codec;
mod config;
mod dir;
mod error;
mod guard;
pub mod journal;
mod merge;
mod query;
mod store;
mod sweeper;
pub mod types;

pub use accounts::{AccountStores, DEFAULT_MAX_OPEN_ACCOUNTS};
pub use aggregate::Quota;
pub use bso::{Bso, BsoPatch};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::OutputFormat;
pub use config::StoreConfig;
pub use dir::{list_accounts, AccountDir};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use guard::Precondition;
pub use merge::{merge_into, BatchReport};
pub use query::{BsoQuery, QueryItems, QueryResult, Sort};
pub use store::{CompactionStats, RecordStore};
pub use types::{AccountId, CollectionName, Timestamp};

/// Crate version, as recorded in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

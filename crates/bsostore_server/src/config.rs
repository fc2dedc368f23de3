//! Server configuration.

use bsostore_core::{StoreConfig, DEFAULT_MAX_OPEN_ACCOUNTS};
use std::path::PathBuf;

/// Configuration for the storage server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root directory of the account stores. `None` keeps every store in
    /// memory.
    pub data_dir: Option<PathBuf>,
    /// Maximum records in one batch write.
    pub max_batch_records: usize,
    /// Maximum size of a request body in bytes.
    pub max_request_bytes: usize,
    /// Whether to check credentials.
    pub require_auth: bool,
    /// Maximum account stores kept open at once.
    pub max_open_accounts: usize,
    /// Options for every account store.
    pub store: StoreConfig,
}

impl ServerConfig {
    /// Creates a configuration with in-memory stores.
    pub fn new() -> Self {
        Self {
            data_dir: None,
            max_batch_records: 100,
            max_request_bytes: 2 * 1024 * 1024,
            require_auth: true,
            max_open_accounts: DEFAULT_MAX_OPEN_ACCOUNTS,
            store: StoreConfig::default(),
        }
    }

    /// Persists account stores under `dir`.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch_records(mut self, max: usize) -> Self {
        self.max_batch_records = max;
        self
    }

    /// Sets the maximum request body size.
    pub fn with_max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = max;
        self
    }

    /// Sets whether credentials are checked.
    pub fn with_require_auth(mut self, require: bool) -> Self {
        self.require_auth = require;
        self
    }

    /// Sets how many account stores stay open at once.
    pub fn with_max_open_accounts(mut self, max: usize) -> Self {
        self.max_open_accounts = max;
        self
    }

    /// Sets the account store options.
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

//! Record store configuration.

/// Configuration for opening an account store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Whether to create the account store if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the journal after every record write (safer but slower).
    pub sync_on_write: bool,

    /// Advertised per-account quota in KB. Reported, never enforced.
    pub quota_kb: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            quota_kb: None,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the journal on every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the advertised quota.
    #[must_use]
    pub const fn quota_kb(mut self, value: Option<u64>) -> Self {
        self.quota_kb = value;
        self
    }
}

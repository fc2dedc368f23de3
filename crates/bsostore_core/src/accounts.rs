//! Registry of open account stores.

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::error::CoreResult;
use crate::store::RecordStore;
use crate::types::{AccountId, Timestamp};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default bound on simultaneously open stores.
pub const DEFAULT_MAX_OPEN_ACCOUNTS: usize = 1024;

struct OpenStore {
    store: Arc<RecordStore>,
    last_used: u64,
}

#[derive(Default)]
struct OpenStores {
    stores: HashMap<AccountId, OpenStore>,
    tick: u64,
}

impl OpenStores {
    /// Closes the least recently used store nobody else holds.
    ///
    /// In-memory stores are only closed while they have never been
    /// written to, since closing one discards its records.
    fn evict_one(&mut self, persistent: bool) -> bool {
        let victim = self
            .stores
            .iter()
            .filter(|(_, open)| {
                Arc::strong_count(&open.store) == 1 && (persistent || !open.store.has_collections())
            })
            .min_by_key(|(_, open)| open.last_used)
            .map(|(account, _)| account.clone());

        match victim {
            Some(account) => {
                self.stores.remove(&account);
                tracing::debug!(account = %account, "account store closed");
                true
            }
            None => false,
        }
    }
}

/// Opens account stores on first use and keeps up to a bounded number of
/// them open.
///
/// Stores are either all persistent under one data root or all in memory.
/// Lookup is by account id only; credentials never reach this type. When
/// the bound is reached the least recently used idle store is closed,
/// which releases its directory lock. Stores in use by a caller are never
/// closed, so the bound can be exceeded while they are held.
pub struct AccountStores {
    root: Option<PathBuf>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    max_open: usize,
    open: Mutex<OpenStores>,
}

impl AccountStores {
    /// Stores that live only in memory.
    pub fn in_memory(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: None,
            config,
            clock,
            max_open: DEFAULT_MAX_OPEN_ACCOUNTS,
            open: Mutex::new(OpenStores::default()),
        }
    }

    /// Stores persisted under `root`, one directory per account.
    pub fn on_disk(root: impl Into<PathBuf>, config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: Some(root.into()),
            config,
            clock,
            max_open: DEFAULT_MAX_OPEN_ACCOUNTS,
            open: Mutex::new(OpenStores::default()),
        }
    }

    /// Sets the bound on simultaneously open stores.
    #[must_use]
    pub fn with_max_open(mut self, max_open: usize) -> Self {
        self.max_open = max_open.max(1);
        self
    }

    /// Returns the store of `account`, opening it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or replayed.
    pub fn store(&self, account: &AccountId) -> CoreResult<Arc<RecordStore>> {
        let mut open = self.open.lock();
        open.tick += 1;
        let tick = open.tick;
        if let Some(entry) = open.stores.get_mut(account) {
            entry.last_used = tick;
            return Ok(Arc::clone(&entry.store));
        }

        while open.stores.len() >= self.max_open && open.evict_one(self.root.is_some()) {}

        let store = match &self.root {
            Some(root) => RecordStore::open(
                root,
                account.clone(),
                self.config.clone(),
                Arc::clone(&self.clock),
            )?,
            None => RecordStore::open_in_memory(
                account.clone(),
                self.config.clone(),
                Arc::clone(&self.clock),
            )?,
        };
        let store = Arc::new(store);
        open.stores.insert(
            account.clone(),
            OpenStore {
                store: Arc::clone(&store),
                last_used: tick,
            },
        );
        Ok(store)
    }

    /// Closes the store of `account` if it is open and not in use.
    ///
    /// Returns whether a store was closed. Closing an in-memory store
    /// discards its records.
    pub fn close(&self, account: &AccountId) -> bool {
        let mut open = self.open.lock();
        let idle = open
            .stores
            .get(account)
            .is_some_and(|entry| Arc::strong_count(&entry.store) == 1);
        if idle {
            open.stores.remove(account);
            tracing::debug!(account = %account, "account store closed");
        }
        idle
    }

    /// Current server time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Number of stores currently open.
    #[must_use]
    pub fn open_accounts(&self) -> usize {
        self.open.lock().stores.len()
    }

    /// The data root, if persistent.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

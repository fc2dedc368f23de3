//! Per-account record store.
//!
//! A `RecordStore` holds every collection of one account. Collections are
//! in-memory tables rebuilt from the account's journal on open; every
//! mutation is journaled before it becomes visible.
//!
//! ## Locking
//!
//! Each collection table sits behind its own mutex, so writers to
//! different collections never contend. The sweep, the precondition check
//! and the mutation of a request all run under one hold of that mutex.
//! Lock order is collection map → collection table → journal.

mod table;

pub(crate) use table::CollectionTable;

use crate::bso::Bso;
use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::dir::AccountDir;
use crate::error::{CoreError, CoreResult};
use crate::guard::Precondition;
use crate::journal::{FileJournal, Journal, JournalBackend, JournalEntry, MemoryJournal};
use crate::query::BsoQuery;
use crate::types::{is_valid_bso_id, AccountId, CollectionName, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

type SharedTable = Arc<Mutex<CollectionTable>>;

/// Summary of a journal compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Live records written to the new journal.
    pub records: usize,
    /// Journal size before compaction.
    pub bytes_before: u64,
    /// Journal size after compaction.
    pub bytes_after: u64,
}

/// The isolated store of one account.
///
/// # Example
///
/// ```rust,ignore
/// use bsostore_core::{AccountId, CollectionName, Precondition, RecordStore, StoreConfig, SystemClock};
/// use std::sync::Arc;
///
/// let store = RecordStore::open_in_memory(
///     AccountId::parse("alice")?,
///     StoreConfig::default(),
///     Arc::new(SystemClock),
/// )?;
/// let tabs = CollectionName::parse("tabs")?;
/// store.put(&tabs, "device-1", &serde_json::json!({"payload": "..."}), Precondition::Unconditional)?;
/// let bso = store.get(&tabs, "device-1")?;
/// ```
pub struct RecordStore {
    account: AccountId,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    collections: RwLock<HashMap<CollectionName, SharedTable>>,
    journal: Mutex<Journal>,
    /// Holds the directory lock; `None` for in-memory stores.
    dir: Option<AccountDir>,
}

impl RecordStore {
    /// Opens the store of `account` under the data root `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process has the store locked (`StoreLocked`)
    /// - The store is missing and `create_if_missing` is false
    /// - The journal is corrupted
    pub fn open(
        root: &Path,
        account: AccountId,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        let dir = AccountDir::open(root, &account, config.create_if_missing)?;
        let backend = FileJournal::open(&dir.journal_path())?;
        let mut store = Self::with_backend(account, config, clock, Box::new(backend))?;
        store.dir = Some(dir);
        Ok(store)
    }

    /// Opens a fresh store that lives only in memory.
    pub fn open_in_memory(
        account: AccountId,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        Self::with_backend(account, config, clock, Box::new(MemoryJournal::new()))
    }

    /// Opens a store over an existing journal backend, replaying it.
    pub fn with_backend(
        account: AccountId,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        backend: Box<dyn JournalBackend>,
    ) -> CoreResult<Self> {
        let mut journal = Journal::new(backend, config.sync_on_write);
        let entries = journal.replay()?;
        let replayed = entries.len();

        let mut tables: HashMap<CollectionName, CollectionTable> = HashMap::new();
        for entry in entries {
            apply_entry(&mut tables, entry);
        }

        tracing::info!(
            account = %account,
            entries = replayed,
            collections = tables.len(),
            "account store opened"
        );

        Ok(Self {
            account,
            config,
            clock,
            collections: RwLock::new(
                tables
                    .into_iter()
                    .map(|(name, table)| (name, Arc::new(Mutex::new(table))))
                    .collect(),
            ),
            journal: Mutex::new(journal),
            dir: None,
        })
    }

    /// Returns the owning account.
    #[must_use]
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the store directory, if persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(AccountDir::path)
    }

    /// Returns the current server time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Returns the journal size in bytes.
    #[must_use]
    pub fn journal_size(&self) -> u64 {
        self.journal.lock().size()
    }

    /// Returns whether any collection was ever written in this store.
    #[must_use]
    pub fn has_collections(&self) -> bool {
        !self.collections.read().is_empty()
    }

    pub(crate) fn table(&self, name: &CollectionName) -> Option<SharedTable> {
        self.collections.read().get(name).cloned()
    }

    /// Create-if-absent; concurrent callers all get the same table.
    pub(crate) fn table_or_create(&self, name: &CollectionName) -> SharedTable {
        if let Some(table) = self.table(name) {
            return table;
        }
        Arc::clone(self.collections.write().entry(name.clone()).or_default())
    }

    /// Snapshot of every table handle, sorted by name.
    pub(crate) fn tables(&self) -> Vec<(CollectionName, SharedTable)> {
        let mut tables: Vec<_> = self
            .collections
            .read()
            .iter()
            .map(|(name, table)| (name.clone(), Arc::clone(table)))
            .collect();
        tables.sort_by(|a, b| a.0.cmp(&b.0));
        tables
    }

    pub(crate) fn log(&self, entry: &JournalEntry) -> CoreResult<()> {
        self.journal.lock().append(entry)?;
        Ok(())
    }

    fn run_swept<T>(
        &self,
        name: &CollectionName,
        table: &SharedTable,
        f: impl FnOnce(&mut CollectionTable, Timestamp) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut table = table.lock();
        let now = self.clock.now();
        self.sweep_locked(name, &mut table, now)?;
        f(&mut table, now)
    }

    /// Locks the table of `name`, sweeps expired records and runs `f`.
    ///
    /// Returns `Ok(None)` without running `f` when the collection has no
    /// table.
    pub(crate) fn with_swept_table<T>(
        &self,
        name: &CollectionName,
        f: impl FnOnce(&mut CollectionTable, Timestamp) -> CoreResult<T>,
    ) -> CoreResult<Option<T>> {
        match self.table(name) {
            Some(table) => self.run_swept(name, &table, f).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`Self::with_swept_table`], creating the table if needed.
    pub(crate) fn with_created_table<T>(
        &self,
        name: &CollectionName,
        f: impl FnOnce(&mut CollectionTable, Timestamp) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let table = self.table_or_create(name);
        self.run_swept(name, &table, f)
    }

    /// Fetches one record.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the record (or its collection) does not
    /// exist or has expired.
    pub fn get(&self, collection: &CollectionName, id: &str) -> CoreResult<Bso> {
        if !is_valid_bso_id(id) {
            return Err(CoreError::malformed(format!("invalid record id {id:?}")));
        }
        self.with_swept_table(collection, |table, _| Ok(table.get(id).cloned()))?
            .flatten()
            .ok_or_else(|| CoreError::not_found(collection.as_str(), id))
    }

    /// Deletes one record and returns the write timestamp.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` if the collection changed after the
    /// reference timestamp, or `RecordNotFound` if the record is absent.
    pub fn delete(
        &self,
        collection: &CollectionName,
        id: &str,
        precondition: Precondition,
    ) -> CoreResult<Timestamp> {
        if !is_valid_bso_id(id) {
            return Err(CoreError::malformed(format!("invalid record id {id:?}")));
        }

        self.with_swept_table(collection, |table, now| {
            precondition.check(collection, table)?;
            if table.get(id).is_none() {
                return Err(CoreError::not_found(collection.as_str(), id));
            }

            let ts = table.next_timestamp(now);
            self.log(&JournalEntry::Delete {
                collection: collection.clone(),
                ids: vec![id.to_owned()],
                at: Some(ts),
            })?;
            table.remove(id);
            table.advance(ts);

            tracing::debug!(account = %self.account, collection = %collection, id, "record deleted");
            Ok(ts)
        })?
        .ok_or_else(|| CoreError::not_found(collection.as_str(), id))
    }

    /// Deletes every record matching `query` and returns the timestamp.
    ///
    /// Pagination and sorting in the query apply, projection does not.
    /// Deleting from a missing collection succeeds and changes nothing.
    pub fn delete_where(
        &self,
        collection: &CollectionName,
        query: &BsoQuery,
        precondition: Precondition,
    ) -> CoreResult<Timestamp> {
        let ts = self.with_swept_table(collection, |table, now| {
            precondition.check(collection, table)?;

            let ids: Vec<String> = query
                .select(table)
                .into_iter()
                .map(|bso| bso.id.clone())
                .collect();
            if ids.is_empty() {
                return Ok(now);
            }

            let ts = table.next_timestamp(now);
            self.log(&JournalEntry::Delete {
                collection: collection.clone(),
                ids: ids.clone(),
                at: Some(ts),
            })?;
            for id in &ids {
                table.remove(id);
            }
            table.advance(ts);

            tracing::debug!(
                account = %self.account,
                collection = %collection,
                deleted = ids.len(),
                "records deleted by filter"
            );
            Ok(ts)
        })?;

        Ok(ts.unwrap_or_else(|| self.now()))
    }

    /// Deletes every record of every collection and empties the journal.
    pub fn wipe(&self) -> CoreResult<Timestamp> {
        let collections = self.collections.write();
        let mut tables: Vec<_> = collections.values().map(|table| table.lock()).collect();

        let now = self.clock.now();
        let ts = tables
            .iter()
            .map(|table| table.next_timestamp(now))
            .max()
            .unwrap_or(now);

        self.journal.lock().rewrite(&[])?;
        for table in &mut tables {
            table.clear();
            table.advance(ts);
        }

        tracing::info!(account = %self.account, collections = tables.len(), "account store wiped");
        Ok(ts)
    }

    /// Rewrites the journal to hold only live records.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        let collections = self.collections.read();
        let tables: Vec<_> = collections
            .iter()
            .map(|(name, table)| (name, table.lock()))
            .collect();

        let mut entries = Vec::new();
        let mut records = 0;
        for (name, table) in &tables {
            for bso in table.rows() {
                entries.push(JournalEntry::Put {
                    collection: (*name).clone(),
                    bso: bso.clone(),
                });
                records += 1;
            }
            if let Some(high_water) = table.high_water() {
                entries.push(JournalEntry::Delete {
                    collection: (*name).clone(),
                    ids: Vec::new(),
                    at: Some(high_water),
                });
            }
        }

        let mut journal = self.journal.lock();
        let bytes_before = journal.size();
        journal.rewrite(&entries)?;
        let bytes_after = journal.size();

        tracing::info!(
            account = %self.account,
            records,
            bytes_before,
            bytes_after,
            "journal compacted"
        );
        Ok(CompactionStats {
            records,
            bytes_before,
            bytes_after,
        })
    }
}

fn apply_entry(tables: &mut HashMap<CollectionName, CollectionTable>, entry: JournalEntry) {
    match entry {
        JournalEntry::Put { collection, mut bso } => {
            bso.refresh_payload_size();
            tables.entry(collection).or_default().insert(bso);
        }
        JournalEntry::Delete {
            collection,
            ids,
            at,
        } => {
            let table = tables.entry(collection).or_default();
            for id in &ids {
                table.remove(id);
            }
            if let Some(at) = at {
                table.advance(at);
            }
        }
    }
}

//! Lazy ttl expiry.
//!
//! Expired records are removed from a collection right before a request
//! touches it. There is no background sweep; an idle collection keeps its
//! expired rows until the next request or an explicit
//! [`RecordStore::sweep_all`].

use crate::error::CoreResult;
use crate::journal::JournalEntry;
use crate::store::{CollectionTable, RecordStore};
use crate::types::{CollectionName, Timestamp};

fn expired_ids(table: &CollectionTable, now: Timestamp) -> Vec<String> {
    table
        .rows()
        .filter(|bso| bso.is_expired(now))
        .map(|bso| bso.id.clone())
        .collect()
}

impl RecordStore {
    /// Removes expired records from a locked table; returns how many.
    ///
    /// Sweeps are journaled but do not advance the collection's
    /// last-modified.
    pub(crate) fn sweep_locked(
        &self,
        name: &CollectionName,
        table: &mut CollectionTable,
        now: Timestamp,
    ) -> CoreResult<usize> {
        let ids = expired_ids(table, now);
        if ids.is_empty() {
            return Ok(0);
        }

        self.log(&JournalEntry::Delete {
            collection: name.clone(),
            ids: ids.clone(),
            at: None,
        })?;
        for id in &ids {
            table.remove(id);
        }

        tracing::debug!(
            account = %self.account(),
            collection = %name,
            swept = ids.len(),
            "expired records swept"
        );
        Ok(ids.len())
    }

    /// Sweeps one collection; returns the number of records removed.
    pub fn sweep(&self, collection: &CollectionName) -> CoreResult<usize> {
        let Some(table) = self.table(collection) else {
            return Ok(0);
        };
        let mut table = table.lock();
        let now = self.now();
        self.sweep_locked(collection, &mut table, now)
    }

    /// Sweeps every collection of the account.
    pub fn sweep_all(&self) -> CoreResult<usize> {
        let mut swept = 0;
        for (name, _) in self.tables() {
            swept += self.sweep(&name)?;
        }
        Ok(swept)
    }
}

//! Account-wide summaries.
//!
//! These reads never create a collection and never touch payloads. Each
//! table is swept before it is measured, so expired records do not count;
//! collections left without records are skipped.

use crate::error::CoreResult;
use crate::store::{CollectionTable, RecordStore};
use crate::types::Timestamp;
use serde::Serialize;
use std::collections::BTreeMap;

/// Payload usage of an account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quota {
    /// Total payload size in KB.
    pub usage_kb: f64,
    /// Configured quota in KB, if any. Not enforced.
    pub limit_kb: Option<u64>,
}

fn kilobytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

impl RecordStore {
    fn summarize<T>(
        &self,
        f: impl Fn(&CollectionTable) -> Option<T>,
    ) -> CoreResult<BTreeMap<String, T>> {
        let now = self.now();
        let mut summary = BTreeMap::new();
        for (name, table) in self.tables() {
            let mut table = table.lock();
            self.sweep_locked(&name, &mut table, now)?;
            if table.is_empty() {
                continue;
            }
            if let Some(value) = f(&table) {
                summary.insert(name.to_string(), value);
            }
        }
        Ok(summary)
    }

    /// Last-modified time of every collection.
    ///
    /// # Errors
    ///
    /// Returns an error if sweeping expired records fails.
    pub fn collections_info(&self) -> CoreResult<BTreeMap<String, Timestamp>> {
        self.summarize(CollectionTable::last_modified)
    }

    /// Record count of every collection.
    ///
    /// # Errors
    ///
    /// Returns an error if sweeping expired records fails.
    pub fn collection_counts(&self) -> CoreResult<BTreeMap<String, usize>> {
        self.summarize(|table| Some(table.len()))
    }

    /// Payload usage of every collection, in KB.
    ///
    /// # Errors
    ///
    /// Returns an error if sweeping expired records fails.
    pub fn collection_usage(&self) -> CoreResult<BTreeMap<String, f64>> {
        self.summarize(|table| Some(kilobytes(table.payload_bytes())))
    }

    /// Payload usage of the whole account.
    ///
    /// # Errors
    ///
    /// Returns an error if sweeping expired records fails.
    pub fn quota(&self) -> CoreResult<Quota> {
        let bytes: u64 = self
            .summarize(|table| Some(table.payload_bytes()))?
            .values()
            .sum();
        Ok(Quota {
            usage_kb: kilobytes(bytes),
            limit_kb: self.config().quota_kb,
        })
    }
}

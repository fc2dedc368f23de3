//! In-memory table of one collection.

use crate::bso::Bso;
use crate::types::Timestamp;
use std::collections::BTreeMap;

/// Records of one collection, keyed by id.
///
/// A table with no rows is indistinguishable from a missing collection:
/// it reports no last-modified and is skipped by aggregates.
///
/// Last-modified is the newest `modified` among the rows still present.
/// The high-water mark is separate and only orders new writes.
#[derive(Debug, Default)]
pub(crate) struct CollectionTable {
    rows: BTreeMap<String, Bso>,
    /// Highest write timestamp ever assigned, kept across emptying so
    /// new writes stay strictly increasing.
    high_water: Option<Timestamp>,
    payload_bytes: u64,
}

impl CollectionTable {
    pub(crate) fn get(&self, id: &str) -> Option<&Bso> {
        self.rows.get(id)
    }

    pub(crate) fn insert(&mut self, bso: Bso) {
        self.advance(bso.modified);
        self.payload_bytes += bso.payload_size;
        if let Some(old) = self.rows.insert(bso.id.clone(), bso) {
            self.payload_bytes -= old.payload_size;
        }
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Bso> {
        let removed = self.rows.remove(id)?;
        self.payload_bytes -= removed.payload_size;
        Some(removed)
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.payload_bytes = 0;
    }

    /// Records that a write happened at `ts` without inserting a row.
    pub(crate) fn advance(&mut self, ts: Timestamp) {
        self.high_water = Some(self.high_water.map_or(ts, |hw| hw.max(ts)));
    }

    /// Picks the timestamp for the next write: the current time, pushed
    /// past every earlier write.
    pub(crate) fn next_timestamp(&self, now: Timestamp) -> Timestamp {
        match self.high_water {
            Some(hw) if hw >= now => hw.next(),
            _ => now,
        }
    }

    /// Returns the collection's last-modified, or `None` if it has no rows.
    pub(crate) fn last_modified(&self) -> Option<Timestamp> {
        self.rows.values().map(|bso| bso.modified).max()
    }

    pub(crate) fn high_water(&self) -> Option<Timestamp> {
        self.high_water
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &Bso> {
        self.rows.values()
    }
}

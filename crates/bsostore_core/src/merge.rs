//! Create-or-update of records with merge-patch semantics.
//!
//! A write names only the fields it changes. On an id collision the stored
//! record keeps every field the write omits; `modified` is always
//! refreshed. In a batch each record is validated and applied on its own,
//! so one bad record never sinks the others.

use crate::bso::{Bso, BsoPatch};
use crate::error::{CoreError, CoreResult};
use crate::guard::Precondition;
use crate::journal::JournalEntry;
use crate::store::{CollectionTable, RecordStore};
use crate::types::{is_valid_bso_id, CollectionName, Timestamp};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of a batch write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Write timestamp shared by every stored record.
    pub modified: Timestamp,
    /// Ids written, in request order.
    pub success: Vec<String>,
    /// Reasons per rejected id.
    pub failed: BTreeMap<String, Vec<String>>,
}

/// Applies `patch` over `existing` (or a blank record) at `modified`.
#[must_use]
pub fn merge_into(existing: Option<&Bso>, patch: &BsoPatch, modified: Timestamp) -> Bso {
    let mut bso = existing
        .cloned()
        .unwrap_or_else(|| Bso::new(patch.id.clone(), modified));

    bso.modified = modified;
    if let Some(sortindex) = patch.sortindex {
        bso.sortindex = Some(sortindex);
    }
    if let Some(payload) = &patch.payload {
        bso.payload = Some(payload.clone());
    }
    if let Some(parentid) = &patch.parentid {
        bso.parentid = Some(parentid.clone());
    }
    if let Some(predecessorid) = &patch.predecessorid {
        bso.predecessorid = Some(predecessorid.clone());
    }
    if let Some(ttl) = patch.ttl {
        bso.ttl = Some(ttl);
    }
    bso.refresh_payload_size();
    bso
}

impl RecordStore {
    fn upsert_locked(
        &self,
        collection: &CollectionName,
        table: &mut CollectionTable,
        patch: &BsoPatch,
        ts: Timestamp,
    ) -> CoreResult<()> {
        let bso = merge_into(table.get(&patch.id), patch, ts);
        self.log(&JournalEntry::Put {
            collection: collection.clone(),
            bso: bso.clone(),
        })?;
        table.insert(bso);
        Ok(())
    }

    /// Creates or updates the record `id` and returns the write timestamp.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` for a bad body, `MalformedRequest` for a bad
    /// id, or `PreconditionFailed` if the collection changed after the
    /// reference timestamp.
    pub fn put(
        &self,
        collection: &CollectionName,
        id: &str,
        body: &Value,
        precondition: Precondition,
    ) -> CoreResult<Timestamp> {
        if !is_valid_bso_id(id) {
            return Err(CoreError::malformed(format!("invalid record id {id:?}")));
        }
        let patch = BsoPatch::from_value(body, Some(id))?;

        self.with_created_table(collection, |table, now| {
            precondition.check(collection, table)?;
            let ts = table.next_timestamp(now);
            self.upsert_locked(collection, table, &patch, ts)?;
            tracing::debug!(account = %self.account(), collection = %collection, id, %ts, "record written");
            Ok(ts)
        })
    }

    /// Writes a batch of records, each independently.
    ///
    /// The collection is created only if at least one record is valid.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` (writing nothing) if the collection
    /// changed after the reference timestamp, or the journal error if the
    /// first record cannot be written. Per-record problems are reported in
    /// the [`BatchReport`] instead; when the journal fails partway through,
    /// the records not yet written are reported as failed.
    pub fn post(
        &self,
        collection: &CollectionName,
        items: &[Value],
        precondition: Precondition,
    ) -> CoreResult<BatchReport> {
        let mut failed: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut patches = Vec::with_capacity(items.len());
        for item in items {
            match BsoPatch::from_value(item, None) {
                Ok(patch) => patches.push(patch),
                Err(err) => failed
                    .entry(BsoPatch::reported_id(item))
                    .or_default()
                    .push(err.to_string()),
            }
        }

        let write = |table: &mut CollectionTable, now: Timestamp| -> CoreResult<BatchReport> {
            precondition.check(collection, table)?;
            if patches.is_empty() {
                return Ok(BatchReport {
                    modified: now,
                    success: Vec::new(),
                    failed: BTreeMap::new(),
                });
            }

            let ts = table.next_timestamp(now);
            let mut success = Vec::with_capacity(patches.len());
            let mut unwritten: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (i, patch) in patches.iter().enumerate() {
                match self.upsert_locked(collection, table, patch, ts) {
                    Ok(()) => success.push(patch.id.clone()),
                    // Nothing committed yet: fail the whole request.
                    Err(err) if success.is_empty() => return Err(err),
                    Err(err) => {
                        tracing::warn!(
                            account = %self.account(),
                            collection = %collection,
                            written = success.len(),
                            error = %err,
                            "batch write interrupted"
                        );
                        let reason = err.to_string();
                        for rest in &patches[i..] {
                            unwritten.entry(rest.id.clone()).or_default().push(reason.clone());
                        }
                        break;
                    }
                }
            }
            Ok(BatchReport {
                modified: ts,
                success,
                failed: unwritten,
            })
        };

        let report = if patches.is_empty() {
            self.with_swept_table(collection, write)?
        } else {
            Some(self.with_created_table(collection, write)?)
        };
        let mut report = report.unwrap_or_else(|| BatchReport {
            modified: self.now(),
            success: Vec::new(),
            failed: BTreeMap::new(),
        });
        for (id, reasons) in failed {
            report.failed.entry(id).or_default().extend(reasons);
        }

        tracing::debug!(
            account = %self.account(),
            collection = %collection,
            written = report.success.len(),
            rejected = report.failed.len(),
            modified = %report.modified,
            "batch written"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;
    use crate::error::ErrorKind;
    use crate::journal::{JournalBackend, MemoryJournal};
    use crate::types::AccountId;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<ManualClock>, RecordStore, CollectionName) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000)));
        let store = RecordStore::open_in_memory(
            AccountId::parse("alice").unwrap(),
            StoreConfig::default(),
            clock.clone(),
        )
        .unwrap();
        (clock, store, CollectionName::parse("bookmarks").unwrap())
    }

    #[test]
    fn all_fields_round_trip() {
        let (_, store, col) = setup();
        let ts = store
            .put(
                &col,
                "b1",
                &json!({
                    "sortindex": 4,
                    "payload": "data",
                    "parentid": "menu",
                    "predecessorid": "b0",
                    "ttl": 3600,
                    "modified": 1.0
                }),
                Precondition::Unconditional,
            )
            .unwrap();

        let bso = store.get(&col, "b1").unwrap();
        assert_eq!(bso.modified, ts);
        assert_eq!(bso.sortindex, Some(4));
        assert_eq!(bso.payload.as_deref(), Some("data"));
        assert_eq!(bso.payload_size, 4);
        assert_eq!(bso.parentid.as_deref(), Some("menu"));
        assert_eq!(bso.predecessorid.as_deref(), Some("b0"));
        assert_eq!(bso.ttl, Some(3600));
    }

    #[test]
    fn update_retains_unspecified_fields() {
        let (_, store, col) = setup();
        store
            .put(&col, "x", &json!({"sortindex": 1, "payload": "old", "parentid": "p"}), Precondition::Unconditional)
            .unwrap();
        let first = store.get(&col, "x").unwrap();

        store.put(&col, "x", &json!({"payload": "new"}), Precondition::Unconditional).unwrap();
        let second = store.get(&col, "x").unwrap();

        assert_eq!(second.payload.as_deref(), Some("new"));
        assert_eq!(second.sortindex, Some(1));
        assert_eq!(second.parentid.as_deref(), Some("p"));
        assert!(second.modified > first.modified);
    }

    #[test]
    fn modified_strictly_increases_on_a_frozen_clock() {
        let (_, store, col) = setup();
        let mut last = Timestamp::ZERO;
        for round in 0..20 {
            let ts = store
                .put(&col, "same", &json!({"sortindex": round}), Precondition::Unconditional)
                .unwrap();
            assert!(ts > last);
            last = ts;
        }
    }

    #[test]
    fn batch_isolates_bad_records() {
        let (_, store, col) = setup();
        let report = store
            .post(
                &col,
                &[
                    json!({"id": "a", "payload": "1"}),
                    json!({"id": "b", "sortindex": "not a number"}),
                    json!({"id": "c", "payload": "3"}),
                ],
                Precondition::Unconditional,
            )
            .unwrap();

        assert_eq!(report.success, vec!["a", "c"]);
        assert_eq!(report.failed.keys().collect::<Vec<_>>(), vec!["b"]);
        assert!(store.get(&col, "a").is_ok());
        assert!(store.get(&col, "c").is_ok());
        assert_eq!(store.get(&col, "b").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(store.get(&col, "a").unwrap().modified, report.modified);
    }

    #[test]
    fn batch_without_ids_reports_empty_key() {
        let (_, store, col) = setup();
        let report = store
            .post(&col, &[json!({"payload": "x"}), json!(17)], Precondition::Unconditional)
            .unwrap();
        assert!(report.success.is_empty());
        assert_eq!(report.failed[""].len(), 2);
        assert!(store.collection_counts().unwrap().is_empty());
    }

    #[test]
    fn precondition_equal_passes_smaller_fails_without_mutation() {
        let (clock, store, col) = setup();
        let ts = store.put(&col, "a", &json!({"payload": "v1"}), Precondition::Unconditional).unwrap();
        clock.advance_secs(1);

        let ok = store.put(&col, "a", &json!({"payload": "v2"}), Precondition::IfUnmodifiedSince(ts));
        let ts2 = ok.unwrap();

        let err = store
            .put(&col, "a", &json!({"payload": "v3"}), Precondition::IfUnmodifiedSince(ts))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        let err = store
            .post(&col, &[json!({"id": "b"})], Precondition::IfUnmodifiedSince(ts))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let bso = store.get(&col, "a").unwrap();
        assert_eq!(bso.payload.as_deref(), Some("v2"));
        assert_eq!(bso.modified, ts2);
        assert_eq!(store.get(&col, "b").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn put_rejects_bad_bodies_before_writing() {
        let (_, store, col) = setup();
        let err = store.put(&col, "a", &json!({"ttl": "soon"}), Precondition::Unconditional).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRecord);
        let err = store.put(&col, "a b", &json!({}), Precondition::Unconditional).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
        assert!(store.collections_info().unwrap().is_empty());
    }

    #[test]
    fn merge_into_blank_record() {
        let patch = BsoPatch {
            id: "n".into(),
            payload: Some("abc".into()),
            ..BsoPatch::default()
        };
        let bso = merge_into(None, &patch, Timestamp::from_centis(9));
        assert_eq!(bso.id, "n");
        assert_eq!(bso.modified, Timestamp::from_centis(9));
        assert_eq!(bso.payload_size, 3);
        assert_eq!(bso.sortindex, None);
    }

    struct FailingJournal {
        inner: MemoryJournal,
        appends_left: usize,
    }

    impl JournalBackend for FailingJournal {
        fn read_all(&self) -> CoreResult<Vec<u8>> {
            self.inner.read_all()
        }

        fn append(&mut self, data: &[u8]) -> CoreResult<u64> {
            if self.appends_left == 0 {
                return Err(CoreError::Io(std::io::Error::other("disk full")));
            }
            self.appends_left -= 1;
            self.inner.append(data)
        }

        fn sync(&mut self) -> CoreResult<()> {
            self.inner.sync()
        }

        fn truncate(&mut self, len: u64) -> CoreResult<()> {
            self.inner.truncate(len)
        }

        fn replace(&mut self, data: &[u8]) -> CoreResult<()> {
            self.inner.replace(data)
        }

        fn size(&self) -> u64 {
            self.inner.size()
        }
    }

    fn store_failing_after(appends: usize) -> RecordStore {
        RecordStore::with_backend(
            AccountId::parse("alice").unwrap(),
            StoreConfig::default(),
            Arc::new(ManualClock::new(Timestamp::from_secs(1_000))),
            Box::new(FailingJournal {
                inner: MemoryJournal::new(),
                appends_left: appends,
            }),
        )
        .unwrap()
    }

    #[test]
    fn journal_failure_mid_batch_reports_unwritten_records() {
        let store = store_failing_after(2);
        let bookmarks = CollectionName::parse("bookmarks").unwrap();
        let items: Vec<Value> = ["a", "b", "c", "d"].iter().map(|id| json!({"id": id})).collect();

        let report = store.post(&bookmarks, &items, Precondition::Unconditional).unwrap();
        assert_eq!(report.success, vec!["a", "b"]);
        assert_eq!(report.failed.keys().collect::<Vec<_>>(), vec!["c", "d"]);
        assert!(report.failed["c"][0].contains("disk full"));

        assert!(store.get(&bookmarks, "b").is_ok());
        assert_eq!(store.get(&bookmarks, "c").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn journal_failure_before_any_write_fails_batch() {
        let store = store_failing_after(0);
        let bookmarks = CollectionName::parse("bookmarks").unwrap();
        let err = store
            .post(&bookmarks, &[json!({"id": "a"})], Precondition::Unconditional)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}

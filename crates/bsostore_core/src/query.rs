//! Translation of list parameters into a typed collection query.
//!
//! Filter values are parsed into typed bounds up front; evaluation is a
//! scan over the in-memory table, so no parameter text ever reaches a
//! storage name.

use crate::bso::Bso;
use crate::error::{CoreError, CoreResult};
use crate::store::{CollectionTable, RecordStore};
use crate::types::{is_valid_bso_id, CollectionName, Timestamp};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    /// Sortindex descending, records without one last.
    Index,
    /// Modified ascending.
    Oldest,
    /// Modified descending.
    Newest,
}

impl FromStr for Sort {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "index" => Ok(Self::Index),
            "oldest" => Ok(Self::Oldest),
            "newest" => Ok(Self::Newest),
            other => Err(CoreError::malformed(format!("unknown sort order {other:?}"))),
        }
    }
}

/// A parsed list query. All conditions combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BsoQuery {
    /// Only these ids.
    pub ids: Option<BTreeSet<String>>,
    /// Modified strictly after.
    pub newer: Option<Timestamp>,
    /// Modified strictly before.
    pub older: Option<Timestamp>,
    /// Sortindex strictly above.
    pub index_above: Option<i64>,
    /// Sortindex strictly below.
    pub index_below: Option<i64>,
    /// Parent id equals.
    pub parentid: Option<String>,
    /// Predecessor id equals.
    pub predecessorid: Option<String>,
    /// Ordering; `None` means id order.
    pub sort: Option<Sort>,
    /// Maximum number of records.
    pub limit: Option<usize>,
    /// Records to skip; ignored without `limit`.
    pub offset: Option<usize>,
    /// Return whole records instead of ids.
    pub full: bool,
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> CoreResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::malformed(format!("invalid value for {name}: {value:?}")))
}

impl BsoQuery {
    /// Parses raw request parameters. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` for unparseable numbers, an unknown sort
    /// order or an invalid id in `ids`.
    pub fn from_params<K: AsRef<str>, V: AsRef<str>>(params: &[(K, V)]) -> CoreResult<Self> {
        let mut query = Self::default();
        for (key, value) in params {
            let value = value.as_ref();
            match key.as_ref() {
                "ids" => {
                    let mut ids = BTreeSet::new();
                    for id in value.split(',').filter(|id| !id.is_empty()) {
                        if !is_valid_bso_id(id) {
                            return Err(CoreError::malformed(format!("invalid id {id:?} in ids")));
                        }
                        ids.insert(id.to_owned());
                    }
                    query.ids = Some(ids);
                }
                "newer" => query.newer = Some(Timestamp::parse(value)?),
                "older" => query.older = Some(Timestamp::parse(value)?),
                "index_above" => query.index_above = Some(parse_number("index_above", value)?),
                "index_below" => query.index_below = Some(parse_number("index_below", value)?),
                "parentid" => query.parentid = Some(value.to_owned()),
                "predecessorid" => query.predecessorid = Some(value.to_owned()),
                "sort" => query.sort = Some(value.parse()?),
                "limit" => query.limit = Some(parse_number("limit", value)?),
                "offset" => query.offset = Some(parse_number("offset", value)?),
                "full" => query.full = true,
                _ => {}
            }
        }
        Ok(query)
    }

    /// Returns true if `bso` satisfies every filter.
    #[must_use]
    pub fn matches(&self, bso: &Bso) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&bso.id) {
                return false;
            }
        }
        if self.newer.is_some_and(|newer| bso.modified <= newer) {
            return false;
        }
        if self.older.is_some_and(|older| bso.modified >= older) {
            return false;
        }
        if let Some(above) = self.index_above {
            if !bso.sortindex.is_some_and(|index| index > above) {
                return false;
            }
        }
        if let Some(below) = self.index_below {
            if !bso.sortindex.is_some_and(|index| index < below) {
                return false;
            }
        }
        if self.parentid.is_some() && bso.parentid != self.parentid {
            return false;
        }
        if self.predecessorid.is_some() && bso.predecessorid != self.predecessorid {
            return false;
        }
        true
    }

    fn compare(&self, a: &Bso, b: &Bso) -> Ordering {
        let primary = match self.sort {
            None => Ordering::Equal,
            Some(Sort::Oldest) => a.modified.cmp(&b.modified),
            Some(Sort::Newest) => b.modified.cmp(&a.modified),
            Some(Sort::Index) => match (a.sortindex, b.sortindex) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }

    /// Filters, orders and pages the rows of a table.
    pub(crate) fn select<'t>(&self, table: &'t CollectionTable) -> Vec<&'t Bso> {
        let mut rows: Vec<&Bso> = table.rows().filter(|bso| self.matches(bso)).collect();
        rows.sort_by(|a, b| self.compare(a, b));

        if let Some(limit) = self.limit {
            let offset = self.offset.unwrap_or(0);
            rows = rows.into_iter().skip(offset).take(limit).collect();
        }
        rows
    }

    fn project(&self, rows: Vec<&Bso>) -> QueryItems {
        if self.full {
            QueryItems::Full(rows.into_iter().cloned().collect())
        } else {
            QueryItems::Ids(rows.into_iter().map(|bso| bso.id.clone()).collect())
        }
    }
}

/// Items returned by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryItems {
    /// Bare ids.
    Ids(Vec<String>),
    /// Whole records.
    Full(Vec<Bso>),
}

/// The answer to a [`BsoQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// The selected items, in query order.
    pub items: QueryItems,
    /// Number of items.
    pub count: usize,
}

impl QueryResult {
    fn new(items: QueryItems) -> Self {
        let count = match &items {
            QueryItems::Ids(ids) => ids.len(),
            QueryItems::Full(records) => records.len(),
        };
        Self { items, count }
    }

    /// The ids of the selected items, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        match &self.items {
            QueryItems::Ids(ids) => ids.iter().map(String::as_str).collect(),
            QueryItems::Full(records) => records.iter().map(|bso| bso.id.as_str()).collect(),
        }
    }

    /// The items as JSON values, ready for a codec.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if a record fails to serialize.
    pub fn to_values(&self) -> CoreResult<Vec<Value>> {
        match &self.items {
            QueryItems::Ids(ids) => Ok(ids.iter().map(|id| Value::String(id.clone())).collect()),
            QueryItems::Full(records) => records
                .iter()
                .map(|bso| serde_json::to_value(bso).map_err(|e| CoreError::encoding(e.to_string())))
                .collect(),
        }
    }
}

impl RecordStore {
    /// Runs a list query against one collection.
    ///
    /// A missing collection yields an empty result.
    pub fn find(&self, collection: &CollectionName, query: &BsoQuery) -> CoreResult<QueryResult> {
        let items = self
            .with_swept_table(collection, |table, _| Ok(query.project(query.select(table))))?
            .unwrap_or_else(|| query.project(Vec::new()));
        Ok(QueryResult::new(items))
    }
}

//! Basic storage objects.

use crate::error::{CoreError, CoreResult};
use crate::types::{is_valid_bso_id, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored record.
///
/// `id` and `modified` are always present. `payload_size` is maintained by
/// the store and never appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bso {
    /// Client-assigned id, unique within its collection.
    pub id: String,
    /// Server-assigned time of the last write.
    pub modified: Timestamp,
    /// Ordering hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sortindex: Option<i64>,
    /// Opaque client data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Byte length of `payload`.
    #[serde(skip)]
    pub payload_size: u64,
    /// Loose reference to a parent record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parentid: Option<String>,
    /// Loose reference to a predecessor record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessorid: Option<String>,
    /// Seconds after `modified` at which the record expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl Bso {
    /// Creates a record with only the mandatory fields set.
    #[must_use]
    pub fn new(id: impl Into<String>, modified: Timestamp) -> Self {
        Self {
            id: id.into(),
            modified,
            sortindex: None,
            payload: None,
            payload_size: 0,
            parentid: None,
            predecessorid: None,
            ttl: None,
        }
    }

    /// Returns true if the record's ttl has elapsed at `now`.
    ///
    /// Records without a ttl never expire.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.ttl {
            Some(ttl) => now.centis_since(self.modified) > ttl.saturating_mul(100),
            None => false,
        }
    }

    /// Recomputes `payload_size` from `payload`.
    pub fn refresh_payload_size(&mut self) {
        self.payload_size = self.payload.as_ref().map_or(0, |p| p.len() as u64);
    }
}

/// A validated client write for one record.
///
/// `None` means the field was not supplied and keeps its stored value on
/// update. A JSON `null` counts as not supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BsoPatch {
    /// Target record id.
    pub id: String,
    /// New sortindex, if supplied.
    pub sortindex: Option<i64>,
    /// New payload, if supplied.
    pub payload: Option<String>,
    /// New parent reference, if supplied.
    pub parentid: Option<String>,
    /// New predecessor reference, if supplied.
    pub predecessorid: Option<String>,
    /// New ttl, if supplied.
    pub ttl: Option<u64>,
}

impl BsoPatch {
    /// Validates a JSON object as a record write.
    ///
    /// When `path_id` is given (single-record PUT) it names the record and
    /// a differing `id` in the body is rejected. Any client `modified`
    /// value is ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` if the value is not an object, the id is
    /// missing or invalid, `sortindex`/`ttl` are not integers, or a string
    /// field has another type.
    pub fn from_value(value: &Value, path_id: Option<&str>) -> CoreResult<Self> {
        let Value::Object(fields) = value else {
            return Err(CoreError::invalid_record("record must be a JSON object"));
        };

        let body_id = string_field(fields, "id")?;
        let id = match (path_id, body_id) {
            (Some(path), Some(body)) if path != body => {
                return Err(CoreError::invalid_record(format!(
                    "record id {body:?} does not match {path:?}"
                )));
            }
            (Some(path), _) => path.to_owned(),
            (None, Some(body)) => body,
            (None, None) => return Err(CoreError::invalid_record("record has no id")),
        };
        if !is_valid_bso_id(&id) {
            return Err(CoreError::invalid_record(format!("invalid record id {id:?}")));
        }

        let ttl = match integer_field(fields, "ttl")? {
            Some(ttl) => Some(
                u64::try_from(ttl)
                    .map_err(|_| CoreError::invalid_record("ttl must not be negative"))?,
            ),
            None => None,
        };

        Ok(Self {
            id,
            sortindex: integer_field(fields, "sortindex")?,
            payload: string_field(fields, "payload")?,
            parentid: string_field(fields, "parentid")?,
            predecessorid: string_field(fields, "predecessorid")?,
            ttl,
        })
    }

    /// Returns the id a failed record should be reported under.
    ///
    /// Records without a string id are reported under the empty string.
    #[must_use]
    pub fn reported_id(value: &Value) -> String {
        value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    }
}

fn string_field(fields: &Map<String, Value>, name: &str) -> CoreResult<Option<String>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CoreError::invalid_record(format!("{name} must be a string"))),
    }
}

fn integer_field(fields: &Map<String, Value>, name: &str) -> CoreResult<Option<i64>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| CoreError::invalid_record(format!("{name} must be an integer"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CoreError::invalid_record(format!("{name} must be an integer"))),
        Some(_) => Err(CoreError::invalid_record(format!("{name} must be an integer"))),
    }
}

//! Core type definitions for BSOStore.
//!
//! Every identifier that ends up naming or addressing storage goes through
//! an allow-list validator here before it is used.

use crate::error::{CoreError, CoreResult};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;

/// Maximum length of a collection name.
pub const MAX_COLLECTION_NAME_LEN: usize = 32;

/// Maximum length of an account identifier.
pub const MAX_ACCOUNT_ID_LEN: usize = 64;

/// Maximum length of a record id.
pub const MAX_BSO_ID_LEN: usize = 64;

/// A server timestamp with two decimal digits of precision.
///
/// Stored as hundredths of a second since the Unix epoch and rendered on
/// the wire as a float number of seconds (`1700000000.25`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from hundredths of a second.
    #[must_use]
    pub const fn from_centis(centis: u64) -> Self {
        Self(centis)
    }

    /// Creates a timestamp from whole seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(100))
    }

    /// Creates a timestamp from fractional seconds, rounding to 2 decimals.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` for negative, infinite or NaN values.
    pub fn from_secs_f64(secs: f64) -> CoreResult<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(CoreError::malformed(format!("invalid timestamp: {secs}")));
        }
        Ok(Self((secs * 100.0).round() as u64))
    }

    /// Parses a timestamp from its textual float form.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` if the text is not a non-negative number.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let secs: f64 = text
            .trim()
            .parse()
            .map_err(|_| CoreError::malformed(format!("invalid timestamp: {text:?}")))?;
        Self::from_secs_f64(secs)
    }

    /// Returns the raw value in hundredths of a second.
    #[must_use]
    pub const fn as_centis(self) -> u64 {
        self.0
    }

    /// Returns the value in fractional seconds.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns the smallest timestamp strictly after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Hundredths of a second elapsed from `earlier` to `self`, zero if negative.
    #[must_use]
    pub const fn centis_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Self::from_secs_f64(secs).map_err(D::Error::custom)
    }
}

fn is_safe_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn validate_name(kind: &str, value: &str, max_len: usize) -> CoreResult<()> {
    if value.is_empty() || value.len() > max_len {
        return Err(CoreError::malformed(format!(
            "{kind} must be 1 to {max_len} characters"
        )));
    }
    if !value.chars().all(is_safe_name_char) {
        return Err(CoreError::malformed(format!(
            "{kind} may only contain letters, digits, '.', '_' and '-'"
        )));
    }
    Ok(())
}

/// Returns true if `id` is an acceptable record id.
///
/// Record ids are 1 to [`MAX_BSO_ID_LEN`] printable ASCII characters and
/// never contain `,` (the `ids` filter separator).
#[must_use]
pub fn is_valid_bso_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_BSO_ID_LEN
        && id.bytes().all(|b| b.is_ascii_graphic() && b != b',')
}

/// A validated collection name.
///
/// Names are restricted to [`MAX_COLLECTION_NAME_LEN`] characters from
/// `[A-Za-z0-9._-]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionName(String);

impl CollectionName {
    /// Validates and wraps a collection name.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` if the name is empty, too long or contains
    /// characters outside the allow-list.
    pub fn parse(name: &str) -> CoreResult<Self> {
        validate_name("collection name", name, MAX_COLLECTION_NAME_LEN)?;
        Ok(Self(name.to_owned()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CollectionName {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        validate_name("collection name", &value, MAX_COLLECTION_NAME_LEN)?;
        Ok(Self(value))
    }
}

impl From<CollectionName> for String {
    fn from(name: CollectionName) -> Self {
        name.0
    }
}

impl Borrow<str> for CollectionName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated, stable account identifier.
///
/// The account id names the account's storage directory, so it is never
/// derived from a credential.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(String);

impl AccountId {
    /// Validates and wraps an account id.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` if the id is empty, too long or contains
    /// characters outside `[A-Za-z0-9._-]`, or is a relative path component.
    pub fn parse(id: &str) -> CoreResult<Self> {
        validate_name("account id", id, MAX_ACCOUNT_ID_LEN)?;
        if id == "." || id == ".." {
            return Err(CoreError::malformed("account id may not be a path component"));
        }
        Ok(Self(id.to_owned()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_display_has_two_decimals() {
        assert_eq!(Timestamp::from_centis(170_000_000_025).to_string(), "1700000000.25");
        assert_eq!(Timestamp::from_secs(3).to_string(), "3.00");
        assert_eq!(Timestamp::from_centis(7).to_string(), "0.07");
    }

    #[test]
    fn timestamp_parse_rounds_to_centis() {
        assert_eq!(Timestamp::parse("12.34").unwrap(), Timestamp::from_centis(1234));
        assert_eq!(Timestamp::parse("0.1").unwrap(), Timestamp::from_centis(10));
        assert_eq!(Timestamp::parse(" 5 ").unwrap(), Timestamp::from_secs(5));
        assert!(Timestamp::parse("soon").is_err());
        assert!(Timestamp::parse("-1").is_err());
        assert!(Timestamp::parse("inf").is_err());
    }

    #[test]
    fn timestamp_json_is_float_seconds() {
        let ts = Timestamp::from_centis(123_456);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "1234.56");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn timestamp_next_is_strictly_greater() {
        let ts = Timestamp::from_secs(10);
        assert!(ts.next() > ts);
        assert_eq!(ts.next().centis_since(ts), 1);
        assert_eq!(ts.centis_since(ts.next()), 0);
    }

    #[test]
    fn collection_names_are_allow_listed() {
        assert!(CollectionName::parse("bookmarks").is_ok());
        assert!(CollectionName::parse("tabs-v2.old_1").is_ok());
        assert!(CollectionName::parse("").is_err());
        assert!(CollectionName::parse(&"x".repeat(33)).is_err());
        assert!(CollectionName::parse("a b").is_err());
        assert!(CollectionName::parse("x'; DROP TABLE y").is_err());
        assert!(CollectionName::parse("../etc").is_err());
    }

    #[test]
    fn collection_name_deserialize_validates() {
        let ok: CollectionName = serde_json::from_str("\"history\"").unwrap();
        assert_eq!(ok.as_str(), "history");
        assert!(serde_json::from_str::<CollectionName>("\"his tory\"").is_err());
    }

    #[test]
    fn account_ids_reject_path_components() {
        assert!(AccountId::parse("user-42").is_ok());
        assert!(AccountId::parse("..").is_err());
        assert!(AccountId::parse("a/b").is_err());
    }

    #[test]
    fn bso_ids() {
        assert!(is_valid_bso_id("abc{123}=="));
        assert!(!is_valid_bso_id(""));
        assert!(!is_valid_bso_id("a,b"));
        assert!(!is_valid_bso_id("has space"));
        assert!(!is_valid_bso_id(&"i".repeat(65)));
    }
}

//! Wire encodings for record lists.
//!
//! | Format | Layout |
//! |--------|--------|
//! | `Json` | one JSON array |
//! | `Newlines` | one JSON document per line, no trailing newline |
//! | `Whoisi` | `u32` big-endian length + JSON document, repeated |

use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use serde_json::Value;

const NEWLINES_TYPE: &str = "application/newlines";
const WHOISI_TYPE: &str = "application/whoisi";
const JSON_TYPE: &str = "application/json";

/// A list encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// A JSON array.
    #[default]
    Json,
    /// Newline-separated JSON documents.
    Newlines,
    /// Length-prefixed JSON documents.
    Whoisi,
}

fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

impl OutputFormat {
    /// Negotiates a response format from an `Accept` value.
    ///
    /// Anything other than the two special types selects JSON.
    #[must_use]
    pub fn from_accept(accept: Option<&str>) -> Self {
        let Some(accept) = accept else {
            return Self::Json;
        };
        for candidate in accept.split(',').map(media_type) {
            match candidate.as_str() {
                NEWLINES_TYPE => return Self::Newlines,
                WHOISI_TYPE => return Self::Whoisi,
                _ => {}
            }
        }
        Self::Json
    }

    /// Picks the decoder for a request body from its `Content-Type`.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type.map(media_type).as_deref() {
            Some(NEWLINES_TYPE) => Self::Newlines,
            Some(WHOISI_TYPE) => Self::Whoisi,
            _ => Self::Json,
        }
    }

    /// The `Content-Type` of data in this format.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Json => JSON_TYPE,
            Self::Newlines => NEWLINES_TYPE,
            Self::Whoisi => WHOISI_TYPE,
        }
    }

    /// Encodes a list of items.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if an item fails to serialize or a whoisi element
    /// is longer than `u32::MAX` bytes.
    pub fn encode<T: Serialize>(self, items: &[T]) -> CoreResult<Vec<u8>> {
        match self {
            Self::Json => serde_json::to_vec(items).map_err(encoding_error),
            Self::Newlines => {
                let mut out = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b'\n');
                    }
                    let line = serde_json::to_string(item).map_err(encoding_error)?;
                    out.extend_from_slice(line.replace('\n', "\\u000a").as_bytes());
                }
                Ok(out)
            }
            Self::Whoisi => {
                let mut out = Vec::new();
                for item in items {
                    let element = serde_json::to_vec(item).map_err(encoding_error)?;
                    let len = u32::try_from(element.len())
                        .map_err(|_| CoreError::encoding("whoisi element too large"))?;
                    out.extend_from_slice(&len.to_be_bytes());
                    out.extend_from_slice(&element);
                }
                Ok(out)
            }
        }
    }

    /// Decodes a list of items.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` if the body is not a well-formed list in
    /// this format.
    pub fn decode(self, body: &[u8]) -> CoreResult<Vec<Value>> {
        match self {
            Self::Json => match serde_json::from_slice(body).map_err(malformed_body)? {
                Value::Array(items) => Ok(items),
                _ => Err(CoreError::malformed("request body must be a JSON array")),
            },
            Self::Newlines => body
                .split(|b| *b == b'\n')
                .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
                .map(|line| serde_json::from_slice(line).map_err(malformed_body))
                .collect(),
            Self::Whoisi => {
                let mut items = Vec::new();
                let mut rest = body;
                while !rest.is_empty() {
                    let (len, tail) = rest
                        .split_first_chunk::<4>()
                        .ok_or_else(|| CoreError::malformed("truncated whoisi length"))?;
                    let len = u32::from_be_bytes(*len) as usize;
                    if tail.len() < len {
                        return Err(CoreError::malformed("truncated whoisi element"));
                    }
                    let (element, tail) = tail.split_at(len);
                    items.push(serde_json::from_slice(element).map_err(malformed_body)?);
                    rest = tail;
                }
                Ok(items)
            }
        }
    }
}

fn encoding_error(err: serde_json::Error) -> CoreError {
    CoreError::encoding(err.to_string())
}

fn malformed_body(err: serde_json::Error) -> CoreError {
    CoreError::malformed(format!("invalid request body: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bso::Bso;
    use crate::error::ErrorKind;
    use crate::types::Timestamp;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn negotiation() {
        assert_eq!(OutputFormat::from_accept(None), OutputFormat::Json);
        assert_eq!(OutputFormat::from_accept(Some("text/html")), OutputFormat::Json);
        assert_eq!(
            OutputFormat::from_accept(Some("application/newlines")),
            OutputFormat::Newlines
        );
        assert_eq!(
            OutputFormat::from_accept(Some("text/plain, Application/Whoisi;q=0.5")),
            OutputFormat::Whoisi
        );
        assert_eq!(
            OutputFormat::from_content_type(Some("application/newlines; charset=utf-8")),
            OutputFormat::Newlines
        );
        assert_eq!(OutputFormat::from_content_type(None), OutputFormat::Json);
        assert_eq!(OutputFormat::Whoisi.content_type(), "application/whoisi");
    }

    #[test]
    fn json_is_one_array() {
        let body = OutputFormat::Json.encode(&["a", "b"]).unwrap();
        assert_eq!(body, br#"["a","b"]"#);
    }

    #[test]
    fn newlines_has_no_trailing_separator() {
        let body = OutputFormat::Newlines.encode(&[json!({"id": "a"}), json!({"id": "b"})]).unwrap();
        assert_eq!(body, b"{\"id\":\"a\"}\n{\"id\":\"b\"}");
        assert!(OutputFormat::Newlines.encode::<Value>(&[]).unwrap().is_empty());
    }

    #[test]
    fn newline_in_payload_stays_on_one_line() {
        let body = OutputFormat::Newlines
            .encode(&[json!({"payload": "line one\nline two"})])
            .unwrap();
        assert!(!body.contains(&b'\n'));
        let decoded = OutputFormat::Newlines.decode(&body).unwrap();
        assert_eq!(decoded, vec![json!({"payload": "line one\nline two"})]);
    }

    #[test]
    fn whoisi_length_prefix_is_big_endian() {
        let body = OutputFormat::Whoisi.encode(&["ab"]).unwrap();
        assert_eq!(&body[..4], &[0, 0, 0, 4]);
        assert_eq!(&body[4..], br#""ab""#);
    }

    #[test]
    fn decode_rejects_malformed_bodies() {
        let cases: [(OutputFormat, &[u8]); 5] = [
            (OutputFormat::Json, b"{\"id\": 1}"),
            (OutputFormat::Json, b"[1, 2"),
            (OutputFormat::Newlines, b"{\"id\":1}\nnot json"),
            (OutputFormat::Whoisi, &[0, 0, 1]),
            (OutputFormat::Whoisi, &[0, 0, 0, 9, b'1']),
        ];
        for (format, body) in cases {
            let err = format.decode(body).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedRequest, "{format:?}");
        }
    }

    fn arb_bso() -> impl Strategy<Value = Bso> {
        (
            "[a-z0-9]{1,12}",
            0u64..1_000_000_000,
            proptest::option::of(any::<i64>()),
            proptest::option::of(".{0,40}"),
            proptest::option::of("[a-z]{1,8}"),
            proptest::option::of(0u64..100_000),
        )
            .prop_map(|(id, centis, sortindex, payload, parentid, ttl)| {
                let mut bso = Bso::new(id, Timestamp::from_centis(centis));
                bso.sortindex = sortindex;
                bso.payload = payload;
                bso.parentid = parentid;
                bso.ttl = ttl;
                bso
            })
    }

    fn arb_format() -> impl Strategy<Value = OutputFormat> {
        prop_oneof![
            Just(OutputFormat::Json),
            Just(OutputFormat::Newlines),
            Just(OutputFormat::Whoisi),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            format in arb_format(),
            records in proptest::collection::vec(arb_bso(), 0..8),
            extra_line in "[ -~]{0,10}",
        ) {
            let mut records = records;
            if let Some(first) = records.first_mut() {
                first.payload = Some(format!("{extra_line}\n{extra_line}\r\n"));
            }
            let body = format.encode(&records).unwrap();
            let decoded = format.decode(&body).unwrap();
            let expected: Vec<Value> = records.iter().map(|b| serde_json::to_value(b).unwrap()).collect();
            prop_assert_eq!(decoded, expected);
        }
    }
}

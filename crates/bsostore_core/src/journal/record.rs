//! Journal entries and frame encoding.

use crate::bso::Bso;
use crate::error::{CoreError, CoreResult};
use crate::types::{CollectionName, Timestamp};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a journal frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"BSOJ";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
pub(crate) const HEADER_SIZE: usize = 10;

pub(crate) const CRC_SIZE: usize = 4;

/// One durable mutation of an account store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntry {
    /// The full row of a record after a write.
    Put {
        /// Collection holding the record.
        collection: CollectionName,
        /// The record as stored.
        bso: Bso,
    },

    /// Removal of records.
    Delete {
        /// Collection holding the records.
        collection: CollectionName,
        /// Removed record ids.
        ids: Vec<String>,
        /// Write timestamp of a client delete; `None` for expiry sweeps,
        /// which do not advance the collection's last-modified.
        at: Option<Timestamp>,
    },
}

impl JournalEntry {
    /// Returns the collection the entry touches.
    #[must_use]
    pub fn collection(&self) -> &CollectionName {
        match self {
            Self::Put { collection, .. } | Self::Delete { collection, .. } => collection,
        }
    }
}

/// Encodes an entry as a framed, checksummed byte sequence.
///
/// ```text
/// | magic (4) | version (2) | length (4) | CBOR payload (N) | crc32 (4) |
/// ```
pub fn encode_frame(entry: &JournalEntry) -> CoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::ser::into_writer(entry, &mut payload)
        .map_err(|e| CoreError::encoding(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::encoding("journal entry too large"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);

    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Result of scanning journal bytes.
#[derive(Debug)]
pub struct DecodedFrames {
    /// Entries of every complete frame, in order.
    pub entries: Vec<JournalEntry>,
    /// Length of the prefix made of complete frames.
    pub valid_len: usize,
}

/// Decodes every complete frame in `data`.
///
/// A truncated header or payload at the end is a torn write and ends the
/// scan cleanly. Bad magic, an unknown version, a CRC mismatch or an
/// undecodable payload is corruption and fails the scan.
pub fn decode_frames(data: &[u8]) -> CoreResult<DecodedFrames> {
    let mut entries = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let rest = &data[offset..];
        if rest.len() < HEADER_SIZE {
            break;
        }

        if rest[0..4] != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(format!(
                "invalid magic at offset {offset}"
            )));
        }

        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version != JOURNAL_VERSION {
            return Err(CoreError::journal_corruption(format!(
                "unsupported journal version {version} at offset {offset}"
            )));
        }

        let len = u32::from_le_bytes([rest[6], rest[7], rest[8], rest[9]]) as usize;
        let frame_len = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < frame_len {
            break;
        }

        let body_end = HEADER_SIZE + len;
        let stored = u32::from_le_bytes([
            rest[body_end],
            rest[body_end + 1],
            rest[body_end + 2],
            rest[body_end + 3],
        ]);
        let computed = compute_crc32(&rest[..body_end]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let entry: JournalEntry = ciborium::de::from_reader(&rest[HEADER_SIZE..body_end])
            .map_err(|e| {
                CoreError::journal_corruption(format!("undecodable entry at offset {offset}: {e}"))
            })?;
        entries.push(entry);
        offset += frame_len;
    }

    Ok(DecodedFrames {
        entries,
        valid_len: offset,
    })
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

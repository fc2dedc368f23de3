//! Append-only journal backing one account store.
//!
//! Every record write is one checksummed frame appended to the journal
//! before it becomes visible, so a crash never leaves a record
//! half-written. Opening a store replays the journal into memory.
//!
//! ## Recovery Policy
//!
//! - **Torn tail** (truncated header or payload at the end): treated as a
//!   clean end of log; the partial frame is truncated away.
//! - **CRC mismatch, bad magic, unknown version**: fatal. The store does
//!   not open.
//!
//! ## Invariants
//!
//! - Frames are never modified after being written
//! - Replay is idempotent
//! - `rewrite` replaces the whole journal atomically

mod backend;
mod record;

pub use backend::{FileJournal, JournalBackend, MemoryJournal};
pub use record::{
    compute_crc32, decode_frames, encode_frame, DecodedFrames, JournalEntry, JOURNAL_MAGIC,
    JOURNAL_VERSION,
};

use crate::error::CoreResult;

/// Writer and reader of journal frames over a backend.
pub struct Journal {
    backend: Box<dyn JournalBackend>,
    sync_on_write: bool,
}

impl Journal {
    /// Creates a journal over `backend`.
    pub fn new(backend: Box<dyn JournalBackend>, sync_on_write: bool) -> Self {
        Self {
            backend,
            sync_on_write,
        }
    }

    /// Appends one entry and returns its offset.
    pub fn append(&mut self, entry: &JournalEntry) -> CoreResult<u64> {
        let frame = encode_frame(entry)?;
        let offset = self.backend.append(&frame)?;
        if self.sync_on_write {
            self.backend.sync()?;
        }
        Ok(offset)
    }

    /// Reads every complete entry, truncating a torn tail.
    ///
    /// # Errors
    ///
    /// Returns an error on checksum mismatch or any other corruption.
    pub fn replay(&mut self) -> CoreResult<Vec<JournalEntry>> {
        let data = self.backend.read_all()?;
        let decoded = decode_frames(&data)?;

        if decoded.valid_len < data.len() {
            tracing::warn!(
                valid = decoded.valid_len,
                total = data.len(),
                "discarding torn journal tail"
            );
            self.backend.truncate(decoded.valid_len as u64)?;
        }

        Ok(decoded.entries)
    }

    /// Replaces the journal with exactly `entries`.
    pub fn rewrite(&mut self, entries: &[JournalEntry]) -> CoreResult<()> {
        let mut data = Vec::new();
        for entry in entries {
            data.extend(encode_frame(entry)?);
        }
        self.backend.replace(&data)
    }

    /// Returns the journal size in bytes.
    pub fn size(&self) -> u64 {
        self.backend.size()
    }
}

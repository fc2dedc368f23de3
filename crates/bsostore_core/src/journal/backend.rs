//! Journal storage backends.

use crate::error::{CoreError, CoreResult};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Byte storage underneath a [`super::Journal`].
///
/// Backends are opaque append-only byte stores; framing and recovery
/// belong to the journal.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_all` returns every byte appended since the last `replace`
/// - after `sync` returns, appended data survives process termination
/// - `replace` swaps the whole content atomically
pub trait JournalBackend: Send + Sync {
    /// Reads the entire content.
    fn read_all(&self) -> CoreResult<Vec<u8>>;

    /// Appends data and returns the offset where it starts.
    fn append(&mut self, data: &[u8]) -> CoreResult<u64>;

    /// Makes all appended data durable.
    fn sync(&mut self) -> CoreResult<()>;

    /// Discards everything after `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` exceeds the current size.
    fn truncate(&mut self, len: u64) -> CoreResult<()>;

    /// Atomically replaces the whole content with `data`.
    fn replace(&mut self, data: &[u8]) -> CoreResult<()>;

    /// Returns the current size in bytes.
    fn size(&self) -> u64;
}

fn truncate_past_end(len: u64, size: u64) -> CoreError {
    CoreError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("cannot truncate to {len} bytes, journal holds {size}"),
    ))
}

/// A journal kept in memory.
///
/// Used for ephemeral stores and tests.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    data: Vec<u8>,
}

impl MemoryJournal {
    /// Creates an empty in-memory journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory journal with pre-existing bytes.
    ///
    /// Useful for testing recovery.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl JournalBackend for MemoryJournal {
    fn read_all(&self) -> CoreResult<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn append(&mut self, data: &[u8]) -> CoreResult<u64> {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(data);
        Ok(offset)
    }

    fn sync(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> CoreResult<()> {
        let size = self.data.len() as u64;
        if len > size {
            return Err(truncate_past_end(len, size));
        }
        self.data.truncate(len as usize);
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> CoreResult<()> {
        self.data = data.to_vec();
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A journal stored in a single file.
///
/// `replace` writes a sibling temp file, syncs it and renames it over the
/// journal so a crash leaves either the old or the new content.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
    size: u64,
}

impl FileJournal {
    /// Opens or creates the journal file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
        })
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

impl JournalBackend for FileJournal {
    fn read_all(&self) -> CoreResult<Vec<u8>> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut buffer = Vec::with_capacity(self.size as usize);
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> CoreResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn sync(&mut self) -> CoreResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> CoreResult<()> {
        if len > self.size {
            return Err(truncate_past_end(len, self.size));
        }
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.size = len;
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> CoreResult<()> {
        let temp_path = self.temp_path();
        let mut temp = File::create(&temp_path)?;
        temp.write_all(data)?;
        temp.sync_all()?;
        drop(temp);

        fs::rename(&temp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            sync_directory(parent)?;
        }

        *self = Self::open(&self.path)?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> CoreResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> CoreResult<()> {
    Ok(())
}

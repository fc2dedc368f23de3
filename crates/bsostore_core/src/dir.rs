//! Account store directory management.
//!
//! Each account owns one directory under the data root:
//!
//! ```text
//! <data_dir>/<account_id>/
//! ├─ LOCK            # Advisory lock for single-process access
//! └─ journal.log     # Append-only record journal
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::AccountId;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

/// An account's store directory, locked for exclusive use.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct AccountDir {
    path: PathBuf,
    _lock_file: File,
}

impl AccountDir {
    /// Opens (or creates) the directory for `account` under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (`StoreLocked`)
    /// - I/O errors occur
    pub fn open(root: &Path, account: &AccountId, create_if_missing: bool) -> CoreResult<Self> {
        let path = root.join(account.as_str());

        if !path.exists() {
            if !create_if_missing {
                return Err(CoreError::StoreNotFound {
                    account: account.to_string(),
                });
            }
            fs::create_dir_all(&path)?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the journal file path.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }
}

/// Lists the account ids that have a store directory under `root`.
///
/// Entries whose names are not valid account ids are skipped.
pub fn list_accounts(root: &Path) -> CoreResult<Vec<AccountId>> {
    let mut accounts = Vec::new();
    if !root.exists() {
        return Ok(accounts);
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(account) = entry
            .file_name()
            .to_str()
            .and_then(|name| AccountId::parse(name).ok())
        {
            accounts.push(account);
        }
    }
    accounts.sort();
    Ok(accounts)
}

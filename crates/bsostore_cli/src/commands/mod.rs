//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;
pub mod sweep;
pub mod verify;

use bsostore_core::{list_accounts, AccountId, CoreError, RecordStore, StoreConfig, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors specific to the command layer.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The data directory holds no account stores.
    #[error("no account stores found under {0:?}")]
    NoAccounts(PathBuf),

    /// The requested output format is not supported.
    #[error("unknown output format {0:?}")]
    UnknownFormat(String),

    /// Store failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Resolves the accounts a command applies to.
pub fn target_accounts(root: &Path, account: Option<&str>) -> Result<Vec<AccountId>, CommandError> {
    let accounts = match account {
        Some(id) => vec![AccountId::parse(id)?],
        None => list_accounts(root)?,
    };
    if accounts.is_empty() {
        return Err(CommandError::NoAccounts(root.to_path_buf()));
    }
    Ok(accounts)
}

/// Opens an existing account store without creating it.
pub fn open_store(root: &Path, account: &AccountId) -> Result<RecordStore, CommandError> {
    let config = StoreConfig::default().create_if_missing(false);
    Ok(RecordStore::open(
        root,
        account.clone(),
        config,
        Arc::new(SystemClock),
    )?)
}

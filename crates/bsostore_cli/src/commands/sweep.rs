//! Sweep command implementation.

use super::{open_store, target_accounts};
use std::path::Path;

/// Runs the sweep command; returns the number of records removed.
pub fn run(root: &Path, account: Option<&str>) -> Result<usize, Box<dyn std::error::Error>> {
    let mut total = 0;
    for account in target_accounts(root, account)? {
        let store = open_store(root, &account)?;
        let swept = store.sweep_all()?;
        tracing::info!(account = %account, swept, "account swept");
        println!("{}: {} expired records removed", account, swept);
        total += swept;
    }
    Ok(total)
}

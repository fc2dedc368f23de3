//! Compact command implementation.

use super::{open_store, target_accounts};
use bsostore_core::CompactionStats;
use std::path::Path;

/// Runs the compact command.
///
/// With `dry_run` the journals are only measured.
pub fn run(
    root: &Path,
    account: Option<&str>,
    dry_run: bool,
) -> Result<Vec<CompactionStats>, Box<dyn std::error::Error>> {
    println!("Compacting journals under {:?}", root);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let mut results = Vec::new();
    for account in target_accounts(root, account)? {
        let store = open_store(root, &account)?;
        if dry_run {
            println!("  {}: journal {} bytes", account, store.journal_size());
            continue;
        }

        let stats = store.compact()?;
        println!(
            "  {}: {} records, {} -> {} bytes",
            account, stats.records, stats.bytes_before, stats.bytes_after
        );
        results.push(stats);
    }

    Ok(results)
}

//! Inspect command implementation.

use super::{open_store, target_accounts};
use bsostore_core::{CoreResult, RecordStore, Timestamp};
use serde::Serialize;
use std::path::Path;

/// Inspection result for one account.
#[derive(Debug, Serialize)]
pub struct AccountReport {
    /// Account id.
    pub account: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Total payload in KB.
    pub usage_kb: f64,
    /// Per-collection figures.
    pub collections: Vec<CollectionStats>,
}

/// Figures for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of records.
    pub records: usize,
    /// Payload in KB.
    pub usage_kb: f64,
    /// Last write time.
    pub last_modified: Timestamp,
}

/// Collects the figures of an open store.
///
/// Expired records are swept first and do not count.
pub fn report(store: &RecordStore) -> CoreResult<AccountReport> {
    let counts = store.collection_counts()?;
    let usage = store.collection_usage()?;
    let collections = store
        .collections_info()?
        .into_iter()
        .map(|(name, last_modified)| CollectionStats {
            records: counts.get(&name).copied().unwrap_or_default(),
            usage_kb: usage.get(&name).copied().unwrap_or_default(),
            name,
            last_modified,
        })
        .collect();

    Ok(AccountReport {
        account: store.account().to_string(),
        journal_size: store.journal_size(),
        usage_kb: store.quota()?.usage_kb,
        collections,
    })
}

/// Runs the inspect command.
pub fn run(root: &Path, account: Option<&str>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut reports = Vec::new();
    for account in target_accounts(root, account)? {
        let store = open_store(root, &account)?;
        reports.push(report(&store)?);
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => {
            for report in &reports {
                print_text_output(report);
            }
        }
    }

    Ok(())
}

fn print_text_output(report: &AccountReport) {
    println!("Account: {}", report.account);
    println!("  Journal size: {}", format_size(report.journal_size));
    println!("  Payload:      {:.2} KB", report.usage_kb);

    if report.collections.is_empty() {
        println!("  (no collections)");
    }
    for col in &report.collections {
        println!(
            "  [{}] {} records, {:.2} KB, modified {}",
            col.name, col.records, col.usage_kb, col.last_modified
        );
    }
    println!();
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

//! Dump command implementation.

use super::{open_store, CommandError};
use bsostore_core::{AccountId, BsoQuery, CollectionName, OutputFormat, RecordStore};
use std::io::Write;
use std::path::Path;

fn parse_format(format: &str) -> Result<OutputFormat, CommandError> {
    match format {
        "json" => Ok(OutputFormat::Json),
        "newlines" => Ok(OutputFormat::Newlines),
        other => Err(CommandError::UnknownFormat(other.to_owned())),
    }
}

/// Encodes the records of `collection`, oldest first.
pub fn encode_collection(
    store: &RecordStore,
    collection: &CollectionName,
    format: OutputFormat,
    limit: Option<usize>,
) -> Result<Vec<u8>, CommandError> {
    let query = BsoQuery {
        full: true,
        limit,
        ..BsoQuery::from_params(&[("sort", "oldest")])?
    };
    let result = store.find(collection, &query)?;
    Ok(format.encode(&result.to_values()?)?)
}

/// Runs the dump command.
pub fn run(
    root: &Path,
    account: &str,
    collection: &str,
    format: &str,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = parse_format(format)?;
    let account = AccountId::parse(account)?;
    let collection = CollectionName::parse(collection)?;
    let store = open_store(root, &account)?;

    let body = encode_collection(&store, &collection, format, limit)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&body)?;
    writeln!(stdout)?;
    Ok(())
}

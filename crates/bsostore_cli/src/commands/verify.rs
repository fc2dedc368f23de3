//! Verify command implementation.

use super::target_accounts;
use bsostore_core::journal::decode_frames;
use bsostore_core::AccountDir;
use std::fs;
use std::path::Path;

/// Verification outcome for one journal.
#[derive(Debug, PartialEq, Eq)]
pub enum JournalHealth {
    /// Every frame decodes and checks out.
    Clean {
        /// Number of frames.
        frames: usize,
    },
    /// Frames decode but the journal ends in a partial frame.
    TornTail {
        /// Number of complete frames.
        frames: usize,
        /// Bytes after the last complete frame.
        trailing_bytes: usize,
    },
    /// A frame is corrupt; the store will refuse to open.
    Corrupt {
        /// Decoder error.
        error: String,
    },
}

/// Checks the journal bytes of one account.
pub fn check(data: &[u8]) -> JournalHealth {
    match decode_frames(data) {
        Ok(decoded) if decoded.valid_len == data.len() => JournalHealth::Clean {
            frames: decoded.entries.len(),
        },
        Ok(decoded) => JournalHealth::TornTail {
            frames: decoded.entries.len(),
            trailing_bytes: data.len() - decoded.valid_len,
        },
        Err(err) => JournalHealth::Corrupt {
            error: err.to_string(),
        },
    }
}

/// Runs the verify command.
pub fn run(root: &Path, account: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let mut corrupt = 0;
    for account in target_accounts(root, account)? {
        let dir = AccountDir::open(root, &account, false)?;
        let path = dir.journal_path();
        let data = if path.exists() { fs::read(&path)? } else { Vec::new() };

        match check(&data) {
            JournalHealth::Clean { frames } => {
                println!("✓ {}: {} frames", account, frames);
            }
            JournalHealth::TornTail {
                frames,
                trailing_bytes,
            } => {
                println!(
                    "! {}: {} frames, {} trailing bytes (discarded on next open)",
                    account, frames, trailing_bytes
                );
            }
            JournalHealth::Corrupt { error } => {
                println!("✗ {}: {}", account, error);
                corrupt += 1;
            }
        }
    }

    if corrupt > 0 {
        return Err(format!("{} corrupt journal(s)", corrupt).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsostore_core::journal::{encode_frame, JournalEntry};
    use bsostore_core::{Bso, CollectionName, Timestamp};

    fn frame(id: &str) -> Vec<u8> {
        encode_frame(&JournalEntry::Put {
            collection: CollectionName::parse("tabs").unwrap(),
            bso: Bso::new(id, Timestamp::from_secs(1)),
        })
        .unwrap()
    }

    #[test]
    fn clean_and_torn_journals() {
        let mut data = frame("a");
        data.extend(frame("b"));
        assert_eq!(check(&data), JournalHealth::Clean { frames: 2 });

        data.extend_from_slice(&frame("c")[..5]);
        assert_eq!(
            check(&data),
            JournalHealth::TornTail {
                frames: 2,
                trailing_bytes: 5
            }
        );
        assert_eq!(check(&[]), JournalHealth::Clean { frames: 0 });
    }

    #[test]
    fn flipped_byte_is_corrupt() {
        let mut data = frame("a");
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        assert!(matches!(check(&data), JournalHealth::Corrupt { .. }));
    }
}

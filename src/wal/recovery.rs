//! Log recovery
//!
//! Replays the log on open and repairs a torn tail.

use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::Path;

use super::{ReadOutcome, Record, WalReader};
use crate::error::Result;

/// Handles log replay after a restart or crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records successfully replayed
    pub records_recovered: u64,

    /// Length of the intact prefix of the log
    pub valid_len: u64,

    /// Bytes of torn trailing record that were dropped
    pub truncated_bytes: u64,

    /// Whether the log had a torn trailing record
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Replay every record of the log at `path` through `apply`, in file order
    ///
    /// A torn final record is dropped and the file is cut back to the last
    /// whole record. Any other malformed content is a `Corruption` error and
    /// the file is left untouched.
    pub fn recover<F>(path: &Path, apply: F) -> Result<RecoveryResult>
    where
        F: FnMut(Record),
    {
        let result = Self::scan(path, apply)?;

        if result.was_truncated {
            tracing::warn!(
                path = %path.display(),
                valid_len = result.valid_len,
                dropped = result.truncated_bytes,
                "log ends with a torn record, truncating"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_len)?;
            file.sync_all()?;
        }

        Ok(result)
    }

    /// Check a log without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path, |_| {})
    }

    fn scan<F>(path: &Path, mut apply: F) -> Result<RecoveryResult>
    where
        F: FnMut(Record),
    {
        let file = File::open(path)?;
        let total = file.metadata()?.len();
        let mut reader = WalReader::new(BufReader::new(file));
        let mut result = RecoveryResult::default();

        loop {
            match reader.next_record()? {
                ReadOutcome::Record(record) => {
                    apply(record);
                    result.records_recovered += 1;
                }
                ReadOutcome::End => break,
                ReadOutcome::Torn => {
                    result.was_truncated = true;
                    break;
                }
            }
        }

        result.valid_len = reader.offset();
        result.truncated_bytes = total - result.valid_len;
        Ok(result)
    }
}

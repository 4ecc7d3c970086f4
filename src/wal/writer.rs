//! Log writer
//!
//! Appends encoded records to the log file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::SyncPolicy;
use crate::error::Result;

/// Appends records to the log file
pub struct WalWriter {
    file: File,
    path: PathBuf,
    /// Current file length (everything written so far)
    size: u64,
    policy: SyncPolicy,
    /// Written but not yet fsynced
    dirty: bool,
}

impl WalWriter {
    /// Open or create a log file for appending
    pub fn open(path: &Path, policy: SyncPolicy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
            policy,
            dirty: false,
        })
    }

    /// Append a batch of encoded records
    ///
    /// Under `SyncPolicy::Always` the batch is fsynced before returning. On
    /// failure the file is cut back to where the batch started.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let start = self.size;

        if let Err(e) = self.file.write_all(bytes) {
            self.rewind_quietly(start);
            return Err(e.into());
        }
        self.size += bytes.len() as u64;
        self.dirty = true;

        if self.policy == SyncPolicy::Always {
            if let Err(e) = self.sync() {
                self.rewind_quietly(start);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Cut the file back to `len` bytes
    pub fn rewind(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.size = len;
        Ok(())
    }

    /// Force written records to disk
    pub fn sync(&mut self) -> Result<()> {
        if self.dirty {
            self.file.sync_data()?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Current length of the log in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    fn rewind_quietly(&mut self, len: u64) {
        if let Err(e) = self.rewind(len) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to rewind log after write error");
        }
    }
}

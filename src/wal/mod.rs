//! Append-Only Log Module
//!
//! Provides durability by mirroring every committed mutation as a record.
//!
//! ## Responsibilities
//! - Encode committed mutations as records, one per mutation
//! - Append records before a commit is acknowledged
//! - Replay records into an empty keyspace on open
//! - Drop a torn trailing record; reject any other damage
//!
//! ## File Format
//! Records are RESP-style arrays of bulk strings, so the log stays readable
//! with a pager:
//! ```text
//! *3\r\n $3\r\n set\r\n $<n>\r\n <key>\r\n $<n>\r\n <value>\r\n
//! *5\r\n ... set key value ... $4\r\n pxat\r\n $<n>\r\n <unix millis>\r\n
//! *2\r\n $3\r\n del\r\n $<n>\r\n <key>\r\n
//! *1\r\n $7\r\n flushdb\r\n
//! ```
//! (spaces above are for readability only)

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::Record;
pub use reader::{ReadOutcome, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;

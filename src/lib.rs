//! # AtlasDB
//!
//! An embedded, in-process key-value store with:
//! - ACID transactions (single writer, many concurrent readers)
//! - Ordered secondary indexes with pluggable collation
//! - Spatial (R-tree) indexes over rectangles
//! - An append-only, human-readable command log with crash recovery and
//!   online compaction (shrink)
//! - Per-item expiry with a background sweeper
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │          begin / update / view / shrink / save / load        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  RwLock<State>
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Transaction                            │
//! │      (eager apply + undo log, commit appends to the log)     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────────┐
//!          │            │                     │
//!          ▼            ▼                     ▼
//!   ┌─────────────┐ ┌─────────────┐   ┌─────────────┐
//!   │  Keyspace   │ │   Indexes   │   │     Log     │
//!   │ (BTreeMap)  │ │ BTree/RTree │   │  (Append)   │
//!   └─────────────┘ └─────────────┘   └─────────────┘
//!          ▲                                  ▲
//!          └────────── Sweeper ───────────────┘
//!              (expiry, sync, auto-shrink)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use atlasdb::{collate::index_string, Engine, Less};
//!
//! let engine = Engine::open_path("users.db")?;
//! engine.create_index("names", "user:*", &[Less::new(index_string)])?;
//! engine.update(|tx| {
//!     tx.set("user:1", "tom")?;
//!     tx.set("user:2", "Randi")?;
//!     Ok::<_, atlasdb::AtlasError>(())
//! })?;
//! engine.view(|tx| {
//!     for (key, value) in tx.ascend("names")? {
//!         println!("{key} = {value}");
//!     }
//!     Ok::<_, atlasdb::AtlasError>(())
//! })?;
//! # Ok::<(), atlasdb::AtlasError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod pattern;
pub mod collate;
pub mod rect;
pub mod keyspace;
pub mod index;
pub mod wal;
pub mod tx;
pub mod engine;

mod sweeper;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasError, Result};
pub use config::{Config, SyncPolicy};
pub use collate::Less;
pub use engine::Engine;
pub use index::IndexOptions;
pub use rect::Rect;
pub use tx::{Iter, SetOptions, Tx};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Engine Module
//!
//! The embedded database instance that coordinates all components.
//!
//! ## Responsibilities
//! - Replay the log into the keyspace on open
//! - Hand out read and write transactions
//! - Own the background sweeper (expiry, syncing, auto-shrink)
//! - Compact the log (shrink) without blocking writers for long
//! - Close cleanly: stop background work, sync the log

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::BytesMut;
use parking_lot::RwLock;

use crate::collate::Less;
use crate::config::Config;
use crate::error::{AtlasError, Result};
use crate::index::{IndexOptions, IndexSet};
use crate::keyspace::{Item, Keyspace};
use crate::rect::Rect;
use crate::sweeper::Sweeper;
use crate::tx::{snapshot_record, Tx, TxSlot, SNAPSHOT_CHUNK};
use crate::wal::{ReadOutcome, Record, WalReader, WalRecovery, WalWriter};

/// Source of per-process engine ids (used for nested transaction detection)
static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Items written per read-lock hold while shrinking
const SHRINK_BATCH: usize = 1000;

/// Everything guarded by the engine lock
pub(crate) struct State {
    pub(crate) keys: Keyspace,
    pub(crate) indexes: IndexSet,
    /// None for in-memory engines and after close
    pub(crate) wal: Option<WalWriter>,
    pub(crate) closed: bool,
}

impl State {
    fn new(wal: Option<WalWriter>) -> Self {
        Self {
            keys: Keyspace::new(),
            indexes: IndexSet::default(),
            wal,
            closed: false,
        }
    }

    /// Store an item and keep every index in step; returns the replaced item
    pub(crate) fn put(&mut self, key: Arc<str>, item: Item) -> Option<Item> {
        let value = Arc::clone(&item.value);
        let previous = self.keys.insert(Arc::clone(&key), item);
        if let Some(prev) = &previous {
            self.indexes.on_remove(&key, &prev.value);
        }
        self.indexes.on_insert(&key, &value);
        previous
    }

    /// Remove an item and its index entries
    pub(crate) fn take(&mut self, key: &str) -> Option<(Arc<str>, Item)> {
        let (key, item) = self.keys.remove(key)?;
        self.indexes.on_remove(&key, &item.value);
        Some((key, item))
    }

    /// Apply one replayed record
    fn replay(&mut self, record: Record, now: SystemTime) {
        match record {
            Record::Set {
                key,
                value,
                expires_at,
            } => {
                let item = Item { value, expires_at };
                if item.is_expired(now) {
                    self.take(&key);
                } else {
                    self.put(key, item);
                }
            }
            Record::Delete { key } => {
                self.take(&key);
            }
            Record::FlushDb => {
                self.keys.clear();
                self.indexes.clear_entries();
            }
        }
    }
}

/// State shared between the engine handle and its background thread
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) config: Config,
    pub(crate) state: RwLock<State>,
    shrinking: AtomicBool,
    /// Log size right after the last open or shrink
    last_shrink_size: AtomicU64,
}

impl Shared {
    /// Sync the log if anything was written since the last sync
    pub(crate) fn sync_log(&self) -> Result<()> {
        let state = self.state.upgradable_read();
        if !state.wal.as_ref().is_some_and(WalWriter::is_dirty) {
            return Ok(());
        }

        let mut state = parking_lot::RwLockUpgradableReadGuard::upgrade(state);
        if let Some(wal) = state.wal.as_mut() {
            wal.sync()?;
            tracing::debug!(size = wal.size(), "log synced");
        }
        Ok(())
    }

    /// Shrink if the log has outgrown the configured thresholds
    pub(crate) fn maybe_shrink(&self) -> Result<()> {
        if self.config.in_memory || self.config.auto_shrink_disabled {
            return Ok(());
        }

        let size = match self.state.read().wal.as_ref() {
            Some(wal) => wal.size(),
            None => return Ok(()),
        };
        let last = self.last_shrink_size.load(Ordering::Acquire);
        let threshold = last + last * self.config.auto_shrink_percentage / 100;

        if size >= self.config.auto_shrink_min_size && size > threshold {
            tracing::debug!(size, last, "log outgrew threshold, shrinking");
            return self.shrink();
        }
        Ok(())
    }

    /// Rewrite the log as the minimal set of records for the live keyspace
    ///
    /// 1. Note the log end under the write lock
    /// 2. Write the live items to `<path>.tmp` in batches, read-locking per batch
    /// 3. Under the write lock, append whatever reached the log since step 1,
    ///    fsync, rename over the log, reopen the writer
    pub(crate) fn shrink(&self) -> Result<()> {
        if self.config.in_memory {
            return Ok(());
        }
        // A transaction on this thread would deadlock against the write lock
        let _slot = TxSlot::claim(self.id)?;

        if self
            .shrinking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AtlasError::ShrinkInProgress);
        }
        let _running = ShrinkFlag(&self.shrinking);

        // Step 1: Record where the log ends right now
        let (path, start) = {
            let mut state = self.state.write();
            if state.closed {
                return Err(AtlasError::DatabaseClosed);
            }
            let wal = state.wal.as_mut().ok_or(AtlasError::DatabaseClosed)?;
            wal.sync()?;
            (wal.path().to_path_buf(), wal.size())
        };

        let tmp_path = tmp_path(&path);
        let result = self.write_shrunk(&path, &tmp_path, start);
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    fn write_shrunk(&self, path: &Path, tmp_path: &Path, start: u64) -> Result<()> {
        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;

        // Step 2: Snapshot the keyspace in batches
        let mut written = 0u64;
        let mut last: Option<Arc<str>> = None;
        let mut buf = BytesMut::new();
        loop {
            let batch = {
                let state = self.state.read();
                if state.closed {
                    return Err(AtlasError::DatabaseClosed);
                }
                let now = SystemTime::now();
                let resume = last.clone();
                let lower = resume.as_deref().map_or(Bound::Unbounded, Bound::Excluded);
                let mut batch = 0;
                for (key, item) in state.keys.range(lower, Bound::Unbounded).take(SHRINK_BATCH) {
                    batch += 1;
                    last = Some(Arc::clone(key));
                    if !item.is_expired(now) {
                        snapshot_record(key, item).encode(&mut buf);
                        written += 1;
                    }
                }
                batch
            };

            if buf.len() >= SNAPSHOT_CHUNK || batch < SHRINK_BATCH {
                tmp.write_all(&buf)?;
                buf.clear();
            }
            if batch < SHRINK_BATCH {
                break;
            }
        }

        // Step 3: Swap in the new log
        let mut state = self.state.write();
        if state.closed {
            return Err(AtlasError::DatabaseClosed);
        }
        let wal = state.wal.as_mut().ok_or(AtlasError::DatabaseClosed)?;
        let original_size = wal.size();

        let mut source = File::open(path)?;
        source.seek(SeekFrom::Start(start))?;
        io::copy(&mut source.take(original_size - start), &mut tmp)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(tmp_path, path)?;
        sync_parent(path)?;

        let policy = wal.policy();
        *wal = WalWriter::open(path, policy)?;
        let new_size = wal.size();
        self.last_shrink_size.store(new_size, Ordering::Release);

        tracing::info!(
            path = %path.display(),
            original_size,
            new_size,
            items = written,
            "log shrunk"
        );
        Ok(())
    }
}

/// Clears the shrinking flag when a shrink ends, however it ends
struct ShrinkFlag<'a>(&'a AtomicBool);

impl Drop for ShrinkFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn sync_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if parent.exists() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}

/// The main database handle
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes**: one writable `Tx` at a time holds the write side of the
///   state lock from `begin` until commit/rollback
/// - **Reads**: any number of read-only `Tx`s share the read side and see
///   the state as of their `begin`
/// - **Background**: the sweeper takes the lock only for one sweep, one
///   sync, or one shrink batch at a time
///
/// `Engine` is `Send + Sync`; share it between threads with `Arc` or scoped
/// threads. A `Tx` stays on the thread that began it.
pub struct Engine {
    shared: Arc<Shared>,
    sweeper: Option<Sweeper>,
}

impl Engine {
    /// Open or create a database with the given config
    ///
    /// On startup:
    /// 1. Replay the log (truncating a torn tail) into the keyspace
    /// 2. Open the log for appending
    /// 3. Start the background sweeper
    pub fn open(config: Config) -> Result<Self> {
        let state = if config.in_memory {
            State::new(None)
        } else {
            Self::recover(&config)?
        };

        let initial_size = state.wal.as_ref().map_or(0, WalWriter::size);
        let shared = Arc::new(Shared {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            config,
            state: RwLock::new(state),
            shrinking: AtomicBool::new(false),
            last_shrink_size: AtomicU64::new(initial_size),
        });

        let sweeper = Sweeper::spawn(Arc::clone(&shared))?;

        Ok(Self {
            shared,
            sweeper: Some(sweeper),
        })
    }

    fn recover(config: &Config) -> Result<State> {
        // Step 1: Make sure the parent directory exists
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Step 2: Replay the log if one exists
        let mut state = State::new(None);
        if config.path.exists() {
            let now = SystemTime::now();
            let result = WalRecovery::recover(&config.path, |record| state.replay(record, now))?;
            tracing::info!(
                path = %config.path.display(),
                records = result.records_recovered,
                items = state.keys.len(),
                truncated = result.was_truncated,
                "log replayed"
            );
        }

        // Step 3: Open for appending
        state.wal = Some(WalWriter::open(&config.path, config.sync_policy)?);
        Ok(state)
    }

    /// Open with a path and default settings; `":memory:"` opens in memory
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::for_path(path))
    }

    /// Open a database with no backing file
    pub fn memory() -> Result<Self> {
        Self::open(Config::builder().in_memory(true).build())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Begin a transaction
    ///
    /// A writable transaction waits for the current writer (and readers) to
    /// finish. Fails with `TxAlreadyOpen` if this thread already holds a
    /// transaction on this engine.
    pub fn begin(&self, writable: bool) -> Result<Tx<'_>> {
        Tx::begin(&self.shared, writable)
    }

    /// Run `f` in a writable transaction: commit on `Ok`, roll back on `Err`
    pub fn update<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Tx<'_>) -> std::result::Result<T, E>,
        E: From<AtlasError>,
    {
        let mut tx = self.begin(true)?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    /// Run `f` in a read-only transaction
    pub fn view<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Tx<'_>) -> std::result::Result<T, E>,
        E: From<AtlasError>,
    {
        let tx = self.begin(false)?;
        let result = f(&tx);
        tx.rollback();
        result
    }

    // =========================================================================
    // Index Management
    // =========================================================================

    /// Create an ordered index in its own transaction
    pub fn create_index(&self, name: &str, pattern: &str, less: &[Less]) -> Result<()> {
        self.update(|tx| tx.create_index(name, pattern, less))
    }

    pub fn create_index_with(
        &self,
        name: &str,
        pattern: &str,
        less: &[Less],
        options: IndexOptions,
    ) -> Result<()> {
        self.update(|tx| tx.create_index_with(name, pattern, less, options))
    }

    /// Create a spatial index in its own transaction
    pub fn create_spatial_index<F>(&self, name: &str, pattern: &str, extract: F) -> Result<()>
    where
        F: Fn(&str) -> Option<Rect> + Send + Sync + 'static,
    {
        self.update(|tx| tx.create_spatial_index(name, pattern, extract))
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.update(|tx| tx.drop_index(name))
    }

    pub fn indexes(&self) -> Result<Vec<String>> {
        self.view(|tx| tx.indexes())
    }

    // =========================================================================
    // Log Maintenance
    // =========================================================================

    /// Compact the log; a no-op for in-memory engines
    pub fn shrink(&self) -> Result<()> {
        self.shared.shrink()
    }

    /// Write every live item to `out` in log format; returns the item count
    pub fn save<W: Write>(&self, mut out: W) -> Result<u64> {
        let written = self.view(|tx| tx.write_snapshot(&mut out))?;
        out.flush()?;
        Ok(written)
    }

    /// Apply a stream of log records in one transaction; returns the record count
    ///
    /// The records go through the normal commit path, so they are logged
    /// and indexed like any other write.
    pub fn load<R: Read>(&self, input: R) -> Result<u64> {
        let mut reader = WalReader::new(BufReader::new(input));
        let now = SystemTime::now();

        self.update(|tx| {
            let mut applied = 0;
            loop {
                match reader.next_record()? {
                    ReadOutcome::Record(Record::Set {
                        key,
                        value,
                        expires_at,
                    }) => {
                        if expires_at.is_some_and(|at| at <= now) {
                            tx.remove(&key)?;
                        } else {
                            tx.put(key, value, expires_at)?;
                        }
                    }
                    ReadOutcome::Record(Record::Delete { key }) => {
                        tx.remove(&key)?;
                    }
                    ReadOutcome::Record(Record::FlushDb) => tx.delete_all()?,
                    ReadOutcome::End => break,
                    ReadOutcome::Torn => {
                        return Err(AtlasError::corruption(
                            reader.offset(),
                            "input ends inside a record",
                        ))
                    }
                }
                applied += 1;
            }
            Ok(applied)
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the database: stop background work and sync the log
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }

        let mut state = self.shared.state.write();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        if let Some(mut wal) = state.wal.take() {
            wal.sync()?;
        }
        tracing::debug!(path = %self.shared.config.path.display(), "database closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Path of the log file (meaningless for in-memory engines)
    pub fn path(&self) -> &Path {
        &self.shared.config.path
    }

    /// Current size of the log in bytes (0 in memory)
    pub fn log_size(&self) -> u64 {
        self.shared
            .state
            .read()
            .wal
            .as_ref()
            .map_or(0, WalWriter::size)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "error closing database");
        }
    }
}

//! Transactions
//!
//! A `Tx` holds one side of the engine's state lock for its whole life:
//! read-only transactions share the read side, the single writer owns the
//! write side. Writes are applied to the locked state immediately and the
//! original of every touched key is remembered, so rollback (explicit, on a
//! failed commit, or when the transaction is dropped during a panic) puts
//! the keyspace and every index back exactly as they were.
//!
//! ## Commit protocol
//! 1. Encode the pending records
//! 2. Append them to the log (fsync under `SyncPolicy::Always`)
//! 3. On failure: the log is cut back, every mutation is undone
//! 4. Release the lock
//!
//! ## Iteration
//! Every scan returns a lazy `Iter` borrowing the transaction; stop early by
//! dropping it. The index name `""` scans the keyspace in raw key order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::ops::{Bound, Deref};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::collate::Less;
use crate::engine::{Shared, State};
use crate::error::{AtlasError, Result};
use crate::index::{map_bound, Edge, Index, IndexKind, IndexOptions};
use crate::keyspace::{Item, Keyspace};
use crate::pattern;
use crate::rect::Rect;
use crate::wal::Record;

thread_local! {
    /// Engines this thread currently holds a transaction on
    static OPEN_TXS: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Options for `Tx::set_with`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Expire the item this long after the write
    pub ttl: Option<Duration>,
}

impl SetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// A read-only or read-write view of the engine
pub struct Tx<'db> {
    guard: Guard<'db>,
    undo: Undo,
    pending: Vec<Record>,
    finished: bool,
    _slot: TxSlot,
}

enum Guard<'db> {
    Read(RwLockReadGuard<'db, State>),
    Write(RwLockWriteGuard<'db, State>),
}

impl Deref for Guard<'_> {
    type Target = State;

    fn deref(&self) -> &State {
        match self {
            Guard::Read(state) => state,
            Guard::Write(state) => state,
        }
    }
}

/// What a write transaction needs to restore on rollback
#[derive(Default)]
struct Undo {
    /// Original item (None = absent) of every key touched
    items: HashMap<Arc<str>, Option<Item>>,
    /// Indexes created in this transaction
    created: Vec<String>,
    /// Indexes dropped in this transaction
    dropped: Vec<Index>,
}

/// Marks this thread as holding a transaction on one engine
pub(crate) struct TxSlot {
    engine: u64,
}

impl TxSlot {
    pub(crate) fn claim(engine: u64) -> Result<Self> {
        OPEN_TXS.with(|open| {
            let mut open = open.borrow_mut();
            if open.contains(&engine) {
                return Err(AtlasError::TxAlreadyOpen);
            }
            open.push(engine);
            Ok(TxSlot { engine })
        })
    }
}

impl Drop for TxSlot {
    fn drop(&mut self) {
        let engine = self.engine;
        let _ = OPEN_TXS.try_with(|open| open.borrow_mut().retain(|&id| id != engine));
    }
}

impl<'db> Tx<'db> {
    /// Begin a transaction; blocks while a writer holds the lock
    pub(crate) fn begin(shared: &'db Shared, writable: bool) -> Result<Self> {
        // Claim before blocking so a nested begin fails instead of deadlocking
        let slot = TxSlot::claim(shared.id)?;

        let guard = if writable {
            Guard::Write(shared.state.write())
        } else {
            Guard::Read(shared.state.read())
        };
        if guard.closed {
            return Err(AtlasError::DatabaseClosed);
        }

        Ok(Self {
            guard,
            undo: Undo::default(),
            pending: Vec::new(),
            finished: false,
            _slot: slot,
        })
    }

    pub fn writable(&self) -> bool {
        matches!(self.guard, Guard::Write(_))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Make every mutation of this transaction durable and visible
    ///
    /// If the log write fails, everything is rolled back and the error is
    /// returned; the engine remains usable.
    pub fn commit(mut self) -> Result<()> {
        if !self.writable() {
            return Err(AtlasError::TxNotWritable);
        }

        match self.persist() {
            Ok(()) => {
                self.undo = Undo::default();
                self.finished = true;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, records = self.pending.len(), "commit failed, rolling back");
                self.undo_all();
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Discard every mutation of this transaction
    pub fn rollback(mut self) {
        self.undo_all();
        self.finished = true;
    }

    fn persist(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut buf = BytesMut::new();
        for record in &self.pending {
            record.encode(&mut buf);
        }

        if let Guard::Write(state) = &mut self.guard {
            if let Some(wal) = state.wal.as_mut() {
                wal.append(&buf)?;
            }
        }
        Ok(())
    }

    fn undo_all(&mut self) {
        let undo = std::mem::take(&mut self.undo);
        self.pending.clear();

        let state = match &mut self.guard {
            Guard::Write(state) => &mut **state,
            Guard::Read(_) => return,
        };

        for (key, original) in undo.items {
            state.take(&key);
            if let Some(item) = original {
                state.put(key, item);
            }
        }
        for name in &undo.created {
            state.indexes.remove(name);
        }
        for mut index in undo.dropped {
            index.rebuild(&state.keys);
            state.indexes.insert(index);
        }
    }

    fn state(&self) -> &State {
        &self.guard
    }

    /// Mutable state plus the undo and pending logs; writers only
    fn parts(&mut self) -> Result<(&mut State, &mut Undo, &mut Vec<Record>)> {
        match &mut self.guard {
            Guard::Write(state) => Ok((&mut **state, &mut self.undo, &mut self.pending)),
            Guard::Read(_) => Err(AtlasError::TxNotWritable),
        }
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Store a value, clearing any expiry; returns the previous live value
    pub fn set(&mut self, key: &str, value: &str) -> Result<Option<String>> {
        self.set_with(key, value, SetOptions::default())
    }

    /// Store a value with options; returns the previous live value
    pub fn set_with(&mut self, key: &str, value: &str, opts: SetOptions) -> Result<Option<String>> {
        let now = SystemTime::now();
        let expires_at = opts.ttl.map(|ttl| deadline(now, ttl)).transpose()?;
        let previous = self.put(Arc::from(key), Arc::from(value), expires_at)?;
        Ok(previous
            .filter(|item| !item.is_expired(now))
            .map(|item| item.value.to_string()))
    }

    pub(crate) fn put(
        &mut self,
        key: Arc<str>,
        value: Arc<str>,
        expires_at: Option<SystemTime>,
    ) -> Result<Option<Item>> {
        let (state, undo, pending) = self.parts()?;
        let previous = state.put(
            Arc::clone(&key),
            Item {
                value: Arc::clone(&value),
                expires_at,
            },
        );
        undo.items
            .entry(Arc::clone(&key))
            .or_insert_with(|| previous.clone());
        pending.push(Record::Set {
            key,
            value,
            expires_at,
        });
        Ok(previous)
    }

    /// Remove a key; returns its value, or `NotFound` if it was absent or expired
    pub fn delete(&mut self, key: &str) -> Result<String> {
        let now = SystemTime::now();
        match self.remove(key)? {
            Some(item) if !item.is_expired(now) => Ok(item.value.to_string()),
            _ => Err(AtlasError::NotFound),
        }
    }

    /// Remove a key whether or not it has expired
    pub(crate) fn remove(&mut self, key: &str) -> Result<Option<Item>> {
        let (state, undo, pending) = self.parts()?;
        let (key, item) = match state.take(key) {
            Some(removed) => removed,
            None => return Ok(None),
        };
        undo.items
            .entry(Arc::clone(&key))
            .or_insert_with(|| Some(item.clone()));
        pending.push(Record::Delete { key });
        Ok(Some(item))
    }

    /// Remove every item; indexes stay declared but become empty
    pub fn delete_all(&mut self) -> Result<()> {
        let (state, undo, pending) = self.parts()?;
        for (key, item) in state.keys.iter() {
            undo.items
                .entry(Arc::clone(key))
                .or_insert_with(|| Some(item.clone()));
        }
        state.keys.clear();
        state.indexes.clear_entries();
        pending.push(Record::FlushDb);
        Ok(())
    }

    /// Get a live value
    pub fn get(&self, key: &str) -> Result<String> {
        let now = SystemTime::now();
        match self.state().keys.get(key) {
            Some(item) if !item.is_expired(now) => Ok(item.value.to_string()),
            _ => Err(AtlasError::NotFound),
        }
    }

    /// Remaining time to live; `None` for items that never expire
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = SystemTime::now();
        match self.state().keys.get(key) {
            Some(item) if !item.is_expired(now) => Ok(item
                .expires_at
                .map(|at| at.duration_since(now).unwrap_or(Duration::ZERO))),
            _ => Err(AtlasError::NotFound),
        }
    }

    /// Number of live items
    pub fn len(&self) -> Result<usize> {
        Ok(self.state().keys.live_len(SystemTime::now()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // =========================================================================
    // Index Management
    // =========================================================================

    /// Create an ordered index over keys matching `pattern`
    ///
    /// With no `less` functions values are ordered byte-lexicographically.
    pub fn create_index(&mut self, name: &str, pattern: &str, less: &[Less]) -> Result<()> {
        self.create_index_with(name, pattern, less, IndexOptions::default())
    }

    pub fn create_index_with(
        &mut self,
        name: &str,
        pattern: &str,
        less: &[Less],
        options: IndexOptions,
    ) -> Result<()> {
        self.add_index(Index::ordered(name, pattern, less, options))
    }

    /// Create a spatial index over keys matching `pattern`
    pub fn create_spatial_index<F>(&mut self, name: &str, pattern: &str, extract: F) -> Result<()>
    where
        F: Fn(&str) -> Option<Rect> + Send + Sync + 'static,
    {
        self.add_index(Index::spatial(name, pattern, Arc::new(extract)))
    }

    fn add_index(&mut self, mut index: Index) -> Result<()> {
        if index.name().is_empty() {
            return Err(AtlasError::InvalidArgument("index name is empty".into()));
        }
        let (state, undo, _) = self.parts()?;
        if state.indexes.contains(index.name()) {
            return Err(AtlasError::IndexExists(index.name().to_string()));
        }

        index.rebuild(&state.keys);
        undo.created.push(index.name().to_string());
        state.indexes.insert(index);
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(AtlasError::InvalidArgument("index name is empty".into()));
        }
        let (state, undo, _) = self.parts()?;
        let index = state.indexes.remove(name).ok_or(AtlasError::NotFound)?;

        match undo.created.iter().position(|n| n == name) {
            Some(pos) => {
                undo.created.swap_remove(pos);
            }
            None => undo.dropped.push(index),
        }
        Ok(())
    }

    /// Names of all indexes, sorted
    pub fn indexes(&self) -> Result<Vec<String>> {
        Ok(self.state().indexes.names())
    }

    // =========================================================================
    // Ordered Iteration
    // =========================================================================

    /// Every entry, lowest first
    pub fn ascend(&self, index: &str) -> Result<Iter<'_>> {
        self.scan(index, Bound::Unbounded, Bound::Unbounded, false)
    }

    /// Entries with `greater_or_equal <= value < less_than`, lowest first
    pub fn ascend_range(&self, index: &str, greater_or_equal: &str, less_than: &str) -> Result<Iter<'_>> {
        self.scan(
            index,
            Bound::Included((greater_or_equal, Edge::Before)),
            Bound::Excluded((less_than, Edge::Before)),
            false,
        )
    }

    /// Entries with `value >= pivot`, lowest first
    pub fn ascend_greater_or_equal(&self, index: &str, pivot: &str) -> Result<Iter<'_>> {
        self.scan(index, Bound::Included((pivot, Edge::Before)), Bound::Unbounded, false)
    }

    /// Entries with `value < pivot`, lowest first
    pub fn ascend_less_than(&self, index: &str, pivot: &str) -> Result<Iter<'_>> {
        self.scan(index, Bound::Unbounded, Bound::Excluded((pivot, Edge::Before)), false)
    }

    /// Entries whose value collates equal to `pivot`, by key
    pub fn ascend_equal(&self, index: &str, pivot: &str) -> Result<Iter<'_>> {
        self.scan(
            index,
            Bound::Included((pivot, Edge::Before)),
            Bound::Included((pivot, Edge::After)),
            false,
        )
    }

    /// Every entry, highest first
    pub fn descend(&self, index: &str) -> Result<Iter<'_>> {
        self.scan(index, Bound::Unbounded, Bound::Unbounded, true)
    }

    /// Entries with `greater_than < value <= less_or_equal`, highest first
    pub fn descend_range(&self, index: &str, less_or_equal: &str, greater_than: &str) -> Result<Iter<'_>> {
        self.scan(
            index,
            Bound::Excluded((greater_than, Edge::After)),
            Bound::Included((less_or_equal, Edge::After)),
            true,
        )
    }

    /// Entries with `value > pivot`, highest first
    pub fn descend_greater_than(&self, index: &str, pivot: &str) -> Result<Iter<'_>> {
        self.scan(index, Bound::Excluded((pivot, Edge::After)), Bound::Unbounded, true)
    }

    /// Entries with `value <= pivot`, highest first
    pub fn descend_less_or_equal(&self, index: &str, pivot: &str) -> Result<Iter<'_>> {
        self.scan(index, Bound::Unbounded, Bound::Included((pivot, Edge::After)), true)
    }

    /// Entries whose value collates equal to `pivot`, by key descending
    pub fn descend_equal(&self, index: &str, pivot: &str) -> Result<Iter<'_>> {
        self.scan(
            index,
            Bound::Included((pivot, Edge::Before)),
            Bound::Included((pivot, Edge::After)),
            true,
        )
    }

    /// Keys matching a glob pattern, in ascending key order
    pub fn ascend_keys(&self, pattern: &str) -> Result<Iter<'_>> {
        self.scan_keys(pattern, false)
    }

    /// Keys matching a glob pattern, in descending key order
    pub fn descend_keys(&self, pattern: &str) -> Result<Iter<'_>> {
        self.scan_keys(pattern, true)
    }

    fn scan(
        &self,
        index: &str,
        lower: Bound<(&str, Edge)>,
        upper: Bound<(&str, Edge)>,
        reverse: bool,
    ) -> Result<Iter<'_>> {
        let state = self.state();
        let now = SystemTime::now();

        if index.is_empty() {
            let lower = map_bound(lower, |(key, _)| key);
            let upper = map_bound(upper, |(key, _)| key);
            let it = state
                .keys
                .range(lower, upper)
                .filter(move |(_, item)| !item.is_expired(now))
                .map(|(key, item)| (key.as_ref(), item.value.as_ref()));
            return Ok(Iter::new(it, reverse));
        }

        let index = state.indexes.get(index).ok_or(AtlasError::NotFound)?;
        match index.kind() {
            IndexKind::Ordered(ordered) => {
                let keys = &state.keys;
                let it = ordered
                    .range(lower, upper)
                    .filter_map(move |entry| live(keys, entry.key(), now));
                Ok(Iter::new(it, reverse))
            }
            IndexKind::Spatial(_) => Err(AtlasError::InvalidArgument(format!(
                "index {:?} is spatial; use intersects",
                index.name()
            ))),
        }
    }

    fn scan_keys(&self, pattern: &str, reverse: bool) -> Result<Iter<'_>> {
        let keys = &self.state().keys;
        let now = SystemTime::now();

        let prefix = pattern::literal_prefix(pattern);
        let upper = pattern::prefix_successor(prefix);
        let upper = upper.as_deref().map_or(Bound::Unbounded, Bound::Excluded);
        let glob = pattern.to_string();

        let it = keys
            .range(Bound::Included(prefix), upper)
            .filter(move |(key, item)| !item.is_expired(now) && pattern::matches(&glob, key))
            .map(|(key, item)| (key.as_ref(), item.value.as_ref()));
        Ok(Iter::new(it, reverse))
    }

    // =========================================================================
    // Spatial Queries
    // =========================================================================

    /// Items whose rectangle overlaps `rect` (e.g. `"[0 0],[15 15]"`), in no
    /// particular order
    pub fn intersects(&self, index: &str, rect: &str) -> Result<Iter<'_>> {
        let query = Rect::parse(rect)?;
        let state = self.state();
        let now = SystemTime::now();

        let index = state.indexes.get(index).ok_or(AtlasError::NotFound)?;
        match index.kind() {
            IndexKind::Spatial(spatial) => {
                let keys = &state.keys;
                let it = spatial
                    .search(query)
                    .filter_map(move |key| live(keys, key, now));
                Ok(Iter {
                    inner: Box::new(it),
                })
            }
            IndexKind::Ordered(_) => Err(AtlasError::InvalidArgument(format!(
                "index {:?} is not spatial",
                index.name()
            ))),
        }
    }

    // =========================================================================
    // Engine Internals
    // =========================================================================

    /// Keys whose deadline has passed
    pub(crate) fn expired_keys(&self, now: SystemTime) -> Vec<Arc<str>> {
        self.state().keys.expired(now)
    }

    /// Write every live item as a log record
    pub(crate) fn write_snapshot<W: Write>(&self, out: &mut W) -> Result<u64> {
        let now = SystemTime::now();
        let mut buf = BytesMut::new();
        let mut written = 0;

        for (key, item) in self.state().keys.iter() {
            if item.is_expired(now) {
                continue;
            }
            snapshot_record(key, item).encode(&mut buf);
            written += 1;
            if buf.len() >= SNAPSHOT_CHUNK {
                out.write_all(&buf)?;
                buf.clear();
            }
        }
        out.write_all(&buf)?;
        Ok(written)
    }

    #[cfg(test)]
    pub(crate) fn index_len(&self, name: &str) -> Option<usize> {
        self.state().indexes.get(name).map(Index::len)
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.undo_all();
        }
    }
}

/// Flush snapshot output in chunks of about this many bytes
pub(crate) const SNAPSHOT_CHUNK: usize = 64 * 1024;

pub(crate) fn snapshot_record(key: &Arc<str>, item: &Item) -> Record {
    Record::Set {
        key: Arc::clone(key),
        value: Arc::clone(&item.value),
        expires_at: item.expires_at,
    }
}

/// Absolute expiry for a ttl, rejected when the log cannot record it
fn deadline(now: SystemTime, ttl: Duration) -> Result<SystemTime> {
    now.checked_add(ttl)
        .filter(|at| {
            at.duration_since(UNIX_EPOCH)
                .is_ok_and(|since| u64::try_from(since.as_millis()).is_ok())
        })
        .ok_or_else(|| AtlasError::InvalidArgument(format!("ttl {ttl:?} is out of range")))
}

fn live<'a>(keys: &'a Keyspace, key: &str, now: SystemTime) -> Option<(&'a str, &'a str)> {
    keys.get_key_value(key)
        .filter(|(_, item)| !item.is_expired(now))
        .map(|(key, item)| (key.as_ref(), item.value.as_ref()))
}

/// Lazy `(key, value)` iterator over a transaction's view
pub struct Iter<'t> {
    inner: Box<dyn Iterator<Item = (&'t str, &'t str)> + 't>,
}

impl<'t> Iter<'t> {
    fn new<I>(it: I, reverse: bool) -> Self
    where
        I: DoubleEndedIterator<Item = (&'t str, &'t str)> + 't,
    {
        if reverse {
            Iter {
                inner: Box::new(it.rev()),
            }
        } else {
            Iter { inner: Box::new(it) }
        }
    }
}

impl<'t> Iterator for Iter<'t> {
    type Item = (&'t str, &'t str);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

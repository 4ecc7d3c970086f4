//! Ordered index container
//!
//! A `BTreeSet` of `(value, key)` entries ordered by the index's collation,
//! ties broken by key. Range queries probe the set with synthetic entries
//! that sort before (`Edge::Before`) or after (`Edge::After`) every real
//! entry holding the same value.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use crate::collate::{Collation, Less};
use crate::keyspace::bounds_ordered;

/// Where a probe sits among entries with an equal value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum EntryKey {
    Min,
    Key(Arc<str>),
    Max,
}

#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    value: Arc<str>,
    key: EntryKey,
    collation: Arc<Collation>,
}

impl IndexEntry {
    pub(crate) fn key(&self) -> &str {
        match &self.key {
            EntryKey::Key(key) => key,
            EntryKey::Min | EntryKey::Max => "",
        }
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.collation
            .compare(&self.value, &other.value)
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexEntry {}

#[derive(Debug)]
pub(crate) struct OrderedIndex {
    collation: Arc<Collation>,
    entries: BTreeSet<IndexEntry>,
}

impl OrderedIndex {
    pub(crate) fn new(less: &[Less]) -> Self {
        Self {
            collation: Arc::new(Collation::new(less)),
            entries: BTreeSet::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn insert(&mut self, key: &Arc<str>, value: &Arc<str>) {
        let entry = self.entry(Arc::clone(value), EntryKey::Key(Arc::clone(key)));
        self.entries.insert(entry);
    }

    pub(crate) fn remove(&mut self, key: &Arc<str>, value: &Arc<str>) -> bool {
        let entry = self.entry(Arc::clone(value), EntryKey::Key(Arc::clone(key)));
        self.entries.remove(&entry)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries between two probes, in collation order
    ///
    /// An inverted range yields nothing.
    pub(crate) fn range(
        &self,
        lower: Bound<(&str, Edge)>,
        upper: Bound<(&str, Edge)>,
    ) -> impl DoubleEndedIterator<Item = &IndexEntry> + '_ {
        let lower = map_bound(lower, |(v, e)| self.probe(v, e));
        let upper = map_bound(upper, |(v, e)| self.probe(v, e));
        bounds_ordered(lower.as_ref(), upper.as_ref())
            .then(|| self.entries.range((lower, upper)))
            .into_iter()
            .flatten()
    }

    fn probe(&self, value: &str, edge: Edge) -> IndexEntry {
        let key = match edge {
            Edge::Before => EntryKey::Min,
            Edge::After => EntryKey::Max,
        };
        self.entry(Arc::from(value), key)
    }

    fn entry(&self, value: Arc<str>, key: EntryKey) -> IndexEntry {
        IndexEntry {
            value,
            key,
            collation: Arc::clone(&self.collation),
        }
    }
}

pub(crate) fn map_bound<T, U>(bound: Bound<T>, f: impl FnOnce(T) -> U) -> Bound<U> {
    match bound {
        Bound::Included(v) => Bound::Included(f(v)),
        Bound::Excluded(v) => Bound::Excluded(f(v)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

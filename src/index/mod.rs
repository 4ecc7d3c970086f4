//! Index Module
//!
//! Secondary indexes derived from the keyspace.
//!
//! ## Responsibilities
//! - Select member keys with a glob pattern
//! - Keep an ordered (collated) or spatial (R-tree) container in step with
//!   every committed set/delete
//! - Rebuild from the keyspace on creation and after a rolled-back drop
//!
//! Indexes are never written to the log; they are pure functions of the
//! keyspace and their declaration.

mod ordered;
mod rtree;
mod spatial;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::collate::Less;
use crate::keyspace::Keyspace;
use crate::pattern;

pub(crate) use ordered::{map_bound, Edge, IndexEntry, OrderedIndex};
pub use rtree::{RTree, Search};
pub use spatial::RectFn;
pub(crate) use spatial::SpatialIndex;

/// Options applied when creating an index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Match keys against the pattern ignoring ASCII case
    pub case_insensitive_keys: bool,
}

#[derive(Debug)]
pub(crate) enum IndexKind {
    Ordered(OrderedIndex),
    Spatial(SpatialIndex),
}

/// A named index: membership pattern plus its container
#[derive(Debug)]
pub(crate) struct Index {
    name: String,
    pattern: String,
    options: IndexOptions,
    kind: IndexKind,
}

impl Index {
    pub(crate) fn ordered(name: &str, pattern: &str, less: &[Less], options: IndexOptions) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            options,
            kind: IndexKind::Ordered(OrderedIndex::new(less)),
        }
    }

    pub(crate) fn spatial(name: &str, pattern: &str, extract: RectFn) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            options: IndexOptions::default(),
            kind: IndexKind::Spatial(SpatialIndex::new(extract)),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> &IndexKind {
        &self.kind
    }

    /// Number of entries in the container
    pub(crate) fn len(&self) -> usize {
        match &self.kind {
            IndexKind::Ordered(index) => index.len(),
            IndexKind::Spatial(index) => index.len(),
        }
    }

    pub(crate) fn matches(&self, key: &str) -> bool {
        if self.options.case_insensitive_keys {
            pattern::matches_ignore_case(&self.pattern, key)
        } else {
            pattern::matches(&self.pattern, key)
        }
    }

    fn insert(&mut self, key: &Arc<str>, value: &Arc<str>) {
        match &mut self.kind {
            IndexKind::Ordered(index) => index.insert(key, value),
            IndexKind::Spatial(index) => index.insert(key, value),
        }
    }

    fn remove(&mut self, key: &Arc<str>, value: &Arc<str>) {
        match &mut self.kind {
            IndexKind::Ordered(index) => {
                index.remove(key, value);
            }
            IndexKind::Spatial(index) => {
                index.remove(key, value);
            }
        }
    }

    fn clear(&mut self) {
        match &mut self.kind {
            IndexKind::Ordered(index) => index.clear(),
            IndexKind::Spatial(index) => index.clear(),
        }
    }

    /// Repopulate from scratch with every matching keyspace item
    pub(crate) fn rebuild(&mut self, keys: &Keyspace) {
        self.clear();
        for (key, item) in keys.iter() {
            if self.matches(key) {
                self.insert(key, &item.value);
            }
        }
    }
}

/// All indexes of one engine, by name
#[derive(Debug, Default)]
pub(crate) struct IndexSet {
    indexes: BTreeMap<String, Index>,
}

impl IndexSet {
    pub(crate) fn get(&self, name: &str) -> Option<&Index> {
        self.indexes.get(name)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    pub(crate) fn insert(&mut self, index: Index) {
        self.indexes.insert(index.name.clone(), index);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Index> {
        self.indexes.remove(name)
    }

    /// Index names in sorted order
    pub(crate) fn names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    /// An item was stored under `key`
    pub(crate) fn on_insert(&mut self, key: &Arc<str>, value: &Arc<str>) {
        for index in self.indexes.values_mut() {
            if index.matches(key) {
                index.insert(key, value);
            }
        }
    }

    /// The item holding `value` left `key`
    pub(crate) fn on_remove(&mut self, key: &Arc<str>, value: &Arc<str>) {
        for index in self.indexes.values_mut() {
            if index.matches(key) {
                index.remove(key, value);
            }
        }
    }

    /// Empty every container, keeping the declarations
    pub(crate) fn clear_entries(&mut self) {
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }
}

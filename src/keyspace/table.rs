//! Keyspace implementation
//!
//! BTreeMap-based item table with a secondary expiry ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use std::time::SystemTime;

use super::{bounds_ordered, Item};

/// Ordered mapping of key → item
#[derive(Debug, Default)]
pub struct Keyspace {
    /// All items, physically present until deleted (expired ones included)
    items: BTreeMap<Arc<str>, Item>,

    /// (deadline, key) for every item with an expiry
    expirations: BTreeSet<(SystemTime, Arc<str>)>,
}

impl Keyspace {
    /// Create a new empty Keyspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically present items (expired ones included)
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items that have not expired at `now`
    pub fn live_len(&self, now: SystemTime) -> usize {
        let expired = self
            .expirations
            .iter()
            .take_while(|(deadline, _)| *deadline <= now)
            .count();
        self.items.len() - expired
    }

    /// Get an item by key, expired or not
    pub fn get(&self, key: &str) -> Option<&Item> {
        self.items.get(key)
    }

    /// Get the shared key together with its item
    pub fn get_key_value(&self, key: &str) -> Option<(&Arc<str>, &Item)> {
        self.items.get_key_value(key)
    }

    /// Insert or replace an item, returning the one it replaced
    pub fn insert(&mut self, key: Arc<str>, item: Item) -> Option<Item> {
        let deadline = item.expires_at;
        let previous = self.items.insert(Arc::clone(&key), item);

        if let Some(old) = previous.as_ref().and_then(|p| p.expires_at) {
            self.expirations.remove(&(old, Arc::clone(&key)));
        }
        if let Some(deadline) = deadline {
            self.expirations.insert((deadline, key));
        }

        previous
    }

    /// Remove an item, returning its shared key and the item
    pub fn remove(&mut self, key: &str) -> Option<(Arc<str>, Item)> {
        let (key, item) = self.items.remove_entry(key)?;
        if let Some(deadline) = item.expires_at {
            self.expirations.remove(&(deadline, Arc::clone(&key)));
        }
        Some((key, item))
    }

    /// Remove every item
    pub fn clear(&mut self) {
        self.items.clear();
        self.expirations.clear();
    }

    /// All items in key order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Arc<str>, &Item)> {
        self.items.iter()
    }

    /// Items whose key falls within `(lower, upper)`, in key order
    ///
    /// An inverted range yields nothing.
    pub fn range<'a>(
        &'a self,
        lower: Bound<&str>,
        upper: Bound<&str>,
    ) -> impl DoubleEndedIterator<Item = (&'a Arc<str>, &'a Item)> + 'a {
        bounds_ordered(lower, upper)
            .then(|| self.items.range::<str, _>((lower, upper)))
            .into_iter()
            .flatten()
    }

    /// Keys of every item whose deadline is at or before `now`, soonest first
    pub fn expired(&self, now: SystemTime) -> Vec<Arc<str>> {
        self.expirations
            .iter()
            .take_while(|(deadline, _)| *deadline <= now)
            .map(|(_, key)| Arc::clone(key))
            .collect()
    }

    /// Deadline-ordered (deadline, key) pairs
    pub fn expirations(&self) -> impl Iterator<Item = &(SystemTime, Arc<str>)> {
        self.expirations.iter()
    }
}

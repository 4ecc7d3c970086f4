//! Keyspace Module
//!
//! The canonical key → item mapping.
//!
//! ## Responsibilities
//! - Exactly one item per key, ordered by raw key bytes
//! - Track items carrying an expiry in a second ordering by deadline
//! - Range traversal in both directions for raw-key scans
//!
//! ## Data Structure Choice
//! `BTreeMap<Arc<str>, Item>`: ordered keys for range scans, and keys/values
//! are reference counted so index entries can share them without copying.

mod table;

use std::ops::Bound;
use std::sync::Arc;
use std::time::SystemTime;

pub use table::Keyspace;

/// A stored value and its optional deadline
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// The value
    pub value: Arc<str>,

    /// When the item stops being visible (None = never)
    pub expires_at: Option<SystemTime>,
}

impl Item {
    pub fn new(value: impl Into<Arc<str>>, expires_at: Option<SystemTime>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Whether the deadline has passed at `now`
    pub fn is_expired(&self, now: SystemTime) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// Whether `(lower, upper)` is a range `BTreeMap::range` accepts
///
/// Inverted or empty-exclusive ranges panic there; callers treat them as empty.
pub(crate) fn bounds_ordered<T: Ord + ?Sized>(lower: Bound<&T>, upper: Bound<&T>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo <= hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo < hi,
        _ => true,
    }
}

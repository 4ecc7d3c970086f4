//! Spatial index container
//!
//! Maps each indexed key to the rectangle its value describes.

use std::fmt;
use std::sync::Arc;

use super::rtree::RTree;
use crate::rect::Rect;

/// Extracts the rectangle a value describes (None = not indexed)
pub type RectFn = Arc<dyn Fn(&str) -> Option<Rect> + Send + Sync>;

pub(crate) struct SpatialIndex {
    extract: RectFn,
    tree: RTree<Arc<str>>,
}

impl SpatialIndex {
    pub(crate) fn new(extract: RectFn) -> Self {
        Self {
            extract,
            tree: RTree::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tree.len()
    }

    /// Extracted rectangle, if it can be stored and found again
    fn rect_of(&self, value: &str) -> Option<Rect> {
        (self.extract)(value).filter(|rect| !rect.has_nan())
    }

    pub(crate) fn insert(&mut self, key: &Arc<str>, value: &str) {
        if let Some(rect) = self.rect_of(value) {
            self.tree.insert(rect, Arc::clone(key));
        }
    }

    pub(crate) fn remove(&mut self, key: &Arc<str>, value: &str) -> bool {
        match self.rect_of(value) {
            Some(rect) => self.tree.remove(&rect, key),
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.tree.clear();
    }

    /// Keys whose rectangle overlaps `query`, in no particular order
    pub(crate) fn search(&self, query: Rect) -> impl Iterator<Item = &Arc<str>> + '_ {
        self.tree.search(query).map(|(_, key)| key)
    }
}

impl fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("len", &self.tree.len())
            .finish()
    }
}

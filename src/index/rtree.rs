//! R-tree
//!
//! Bounding-volume tree over `Rect`s. Each node stores the union of its
//! children's boxes, so an intersection query only descends into subtrees
//! whose box overlaps the query.
//!
//! Insertion follows the classic least-enlargement descent; an overfull node
//! is split in half along the dimension where its children's centers spread
//! the most. Removal drops emptied nodes and shrinks boxes on the way back up.

use std::cmp::Ordering;

use crate::rect::Rect;

/// Maximum number of children per node before it splits
const MAX_ENTRIES: usize = 16;

pub struct RTree<T> {
    root: Node<T>,
    len: usize,
}

struct Node<T> {
    children: Children<T>,
}

enum Children<T> {
    Leaf(Vec<Entry<T>>),
    Branch(Vec<Child<T>>),
}

struct Entry<T> {
    rect: Rect,
    data: T,
}

struct Child<T> {
    rect: Rect,
    node: Box<Node<T>>,
}

trait Bounded {
    fn bounds(&self) -> &Rect;
}

impl<T> Bounded for Entry<T> {
    fn bounds(&self) -> &Rect {
        &self.rect
    }
}

impl<T> Bounded for Child<T> {
    fn bounds(&self) -> &Rect {
        &self.rect
    }
}

impl<T: PartialEq> RTree<T> {
    pub fn new() -> Self {
        Self {
            root: Node::leaf(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, rect: Rect, data: T) {
        if let Some(sibling) = self.root.insert(Entry { rect, data }) {
            let old_root = std::mem::replace(&mut self.root, Node::leaf());
            self.root = Node {
                children: Children::Branch(vec![Child::new(old_root), sibling]),
            };
        }
        self.len += 1;
    }

    /// Remove the entry with exactly this box and data; false if absent
    pub fn remove(&mut self, rect: &Rect, data: &T) -> bool {
        if !self.root.remove(rect, data) {
            return false;
        }
        self.len -= 1;

        // Collapse single-child roots
        loop {
            match &mut self.root.children {
                Children::Branch(children) if children.len() == 1 => {
                    if let Some(only) = children.pop() {
                        self.root = *only.node;
                    }
                }
                Children::Branch(children) if children.is_empty() => {
                    self.root = Node::leaf();
                }
                _ => break,
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.root = Node::leaf();
        self.len = 0;
    }

    /// Lazily visit every entry whose box intersects `query`
    pub fn search(&self, query: Rect) -> Search<'_, T> {
        Search {
            query: Some(query),
            stack: vec![&self.root],
            entries: no_entries(),
        }
    }

    /// Lazily visit every entry
    pub fn iter(&self) -> Search<'_, T> {
        Search {
            query: None,
            stack: vec![&self.root],
            entries: no_entries(),
        }
    }

    /// Box covering every entry (empty when the tree is)
    pub fn bounds(&self) -> Rect {
        self.root.bounds()
    }
}

impl<T: PartialEq> Default for RTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> Node<T> {
    fn leaf() -> Self {
        Node {
            children: Children::Leaf(Vec::new()),
        }
    }

    fn is_empty(&self) -> bool {
        match &self.children {
            Children::Leaf(entries) => entries.is_empty(),
            Children::Branch(children) => children.is_empty(),
        }
    }

    fn bounds(&self) -> Rect {
        match &self.children {
            Children::Leaf(entries) => union_all(entries),
            Children::Branch(children) => union_all(children),
        }
    }

    /// Insert below this node; returns a new sibling if this node split
    fn insert(&mut self, entry: Entry<T>) -> Option<Child<T>> {
        match &mut self.children {
            Children::Leaf(entries) => {
                entries.push(entry);
                if entries.len() > MAX_ENTRIES {
                    let right = split(entries);
                    return Some(Child::new(Node {
                        children: Children::Leaf(right),
                    }));
                }
                None
            }
            Children::Branch(children) => {
                let idx = choose_subtree(children, &entry.rect);
                let child = &mut children[idx];
                child.rect = child.rect.union(&entry.rect);

                if let Some(sibling) = child.node.insert(entry) {
                    child.rect = child.node.bounds();
                    children.push(sibling);
                    if children.len() > MAX_ENTRIES {
                        let right = split(children);
                        return Some(Child::new(Node {
                            children: Children::Branch(right),
                        }));
                    }
                }
                None
            }
        }
    }

    fn remove(&mut self, rect: &Rect, data: &T) -> bool {
        match &mut self.children {
            Children::Leaf(entries) => {
                match entries
                    .iter()
                    .position(|e| e.data == *data && e.rect == *rect)
                {
                    Some(pos) => {
                        entries.swap_remove(pos);
                        true
                    }
                    None => false,
                }
            }
            Children::Branch(children) => {
                for i in 0..children.len() {
                    if !children[i].rect.contains(rect) {
                        continue;
                    }
                    if children[i].node.remove(rect, data) {
                        if children[i].node.is_empty() {
                            children.swap_remove(i);
                        } else {
                            children[i].rect = children[i].node.bounds();
                        }
                        return true;
                    }
                }
                false
            }
        }
    }
}

impl<T: PartialEq> Child<T> {
    fn new(node: Node<T>) -> Self {
        Child {
            rect: node.bounds(),
            node: Box::new(node),
        }
    }
}

/// Lazy intersection traversal over an `RTree`
pub struct Search<'a, T> {
    query: Option<Rect>,
    stack: Vec<&'a Node<T>>,
    entries: std::slice::Iter<'a, Entry<T>>,
}

impl<'a, T> Search<'a, T> {
    fn hits(&self, rect: &Rect) -> bool {
        self.query.as_ref().map_or(true, |q| q.intersects(rect))
    }
}

impl<'a, T> Iterator for Search<'a, T> {
    type Item = (&'a Rect, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            while let Some(entry) = self.entries.next() {
                if self.hits(&entry.rect) {
                    return Some((&entry.rect, &entry.data));
                }
            }

            let node = self.stack.pop()?;
            match &node.children {
                Children::Leaf(entries) => self.entries = entries.iter(),
                Children::Branch(children) => {
                    for child in children {
                        if self.hits(&child.rect) {
                            self.stack.push(&child.node);
                        }
                    }
                }
            }
        }
    }
}

fn no_entries<'a, T>() -> std::slice::Iter<'a, Entry<T>> {
    let empty: &'a [Entry<T>] = &[];
    empty.iter()
}

fn union_all<B: Bounded>(items: &[B]) -> Rect {
    let mut iter = items.iter();
    let first = match iter.next() {
        Some(first) => first.bounds().clone(),
        None => return Rect::default(),
    };
    iter.fold(first, |acc, item| acc.union(item.bounds()))
}

/// Pick the child needing the least enlargement to cover `rect`
fn choose_subtree<T>(children: &[Child<T>], rect: &Rect) -> usize {
    let mut best = 0;
    let mut best_cost = (f64::INFINITY, f64::INFINITY);
    for (i, child) in children.iter().enumerate() {
        let area = child.rect.area();
        let enlargement = child.rect.union(rect).area() - area;
        let cost = (enlargement, area);
        if i == 0 || compare_cost(cost, best_cost) == Ordering::Less {
            best = i;
            best_cost = cost;
        }
    }
    best
}

fn compare_cost(a: (f64, f64), b: (f64, f64)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1))
}

/// Split an overfull node in two halves; returns the upper half
fn split<B: Bounded>(items: &mut Vec<B>) -> Vec<B> {
    let dims = items.iter().map(|i| i.bounds().dims()).max().unwrap_or(0);

    let mut axis = 0;
    let mut widest = f64::NEG_INFINITY;
    for dim in 0..dims {
        let (lo, hi) = items.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), i| {
            let c = i.bounds().center(dim);
            (lo.min(c), hi.max(c))
        });
        let spread = hi - lo;
        if spread > widest {
            widest = spread;
            axis = dim;
        }
    }

    items.sort_by(|a, b| a.bounds().center(axis).total_cmp(&b.bounds().center(axis)));
    let half = items.len() / 2;
    items.split_off(half)
}

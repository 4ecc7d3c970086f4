//! Collation
//!
//! Ordering functions for secondary indexes. An index orders its entries by a
//! list of `Less` functions applied in turn; the first one that tells two
//! values apart decides, and the key breaks any remaining tie.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A strict "a sorts before b" predicate over item values
#[derive(Clone)]
pub struct Less(Arc<dyn Fn(&str, &str) -> bool + Send + Sync>);

impl Less {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        Less(Arc::new(f))
    }

    pub fn less(&self, a: &str, b: &str) -> bool {
        (self.0)(a, b)
    }
}

impl fmt::Debug for Less {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Less(..)")
    }
}

/// Case-insensitive (ASCII) string order
pub fn index_string(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    for (ca, cb) in a.iter().zip(b.iter()) {
        let (ca, cb) = (ca.to_ascii_lowercase(), cb.to_ascii_lowercase());
        if ca != cb {
            return ca < cb;
        }
    }
    a.len() < b.len()
}

/// Byte-lexicographic order; the default when an index has no `Less`
pub fn index_binary(a: &str, b: &str) -> bool {
    a < b
}

/// Signed integer order; unparsable values count as zero
pub fn index_int(a: &str, b: &str) -> bool {
    let parse = |s: &str| s.trim().parse::<i64>().unwrap_or(0);
    parse(a) < parse(b)
}

/// Unsigned integer order; unparsable values count as zero
pub fn index_uint(a: &str, b: &str) -> bool {
    let parse = |s: &str| s.trim().parse::<u64>().unwrap_or(0);
    parse(a) < parse(b)
}

/// Floating point order; unparsable values count as zero
pub fn index_float(a: &str, b: &str) -> bool {
    let parse = |s: &str| s.trim().parse::<f64>().unwrap_or(0.0);
    parse(a) < parse(b)
}

/// Reverse another ordering
pub fn desc(less: Less) -> Less {
    Less::new(move |a, b| less.less(b, a))
}

/// The composed ordering of one index
#[derive(Debug, Default)]
pub(crate) struct Collation {
    less: Vec<Less>,
}

impl Collation {
    pub(crate) fn new(less: &[Less]) -> Self {
        Self {
            less: less.to_vec(),
        }
    }

    /// Total order over values (keys are not considered here)
    pub(crate) fn compare(&self, a: &str, b: &str) -> Ordering {
        if self.less.is_empty() {
            return a.cmp(b);
        }
        for less in &self.less {
            if less.less(a, b) {
                return Ordering::Less;
            }
            if less.less(b, a) {
                return Ordering::Greater;
            }
        }
        Ordering::Equal
    }
}

//! Rectangles
//!
//! N-dimensional bounding boxes used by spatial indexes, plus the text form
//! that spatial values and `intersects` queries are written in:
//!
//! ```text
//! [10 10]              a point
//! [10 10],[20 20]      min corner, max corner
//! [-inf 0],[inf 5]     unbounded sides
//! ```

use std::fmt;

use crate::error::{AtlasError, Result};

/// An axis-aligned box with inclusive bounds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rect {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl Rect {
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Self {
        Self { min, max }
    }

    /// A zero-size box at `coords`
    pub fn point(coords: Vec<f64>) -> Self {
        Self {
            max: coords.clone(),
            min: coords,
        }
    }

    /// Parse the `[x y ...]` / `[x y ...],[x y ...]` form
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: &str| AtlasError::InvalidArgument(format!("rect {text:?}: {reason}"));

        let (min, rest) = parse_corner(text.trim_start()).ok_or_else(|| invalid("bad min corner"))?;
        let rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(Self::point(min));
        }

        let rest = rest
            .strip_prefix(',')
            .ok_or_else(|| invalid("expected ',' between corners"))?;
        let (max, rest) = parse_corner(rest.trim_start()).ok_or_else(|| invalid("bad max corner"))?;
        if !rest.trim().is_empty() {
            return Err(invalid("trailing characters"));
        }
        if min.len() != max.len() {
            return Err(invalid("corners differ in dimensions"));
        }
        Ok(Self { min, max })
    }

    pub fn dims(&self) -> usize {
        self.min.len().max(self.max.len())
    }

    /// Overlap test over the dimensions both boxes have (bounds inclusive)
    pub fn intersects(&self, other: &Rect) -> bool {
        let dims = self.min.len().min(other.min.len());
        (0..dims).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    /// Whether `other` lies entirely inside `self`
    pub fn contains(&self, other: &Rect) -> bool {
        let dims = self.min.len().min(other.min.len());
        (0..dims).all(|i| self.min[i] <= other.min[i] && other.max[i] <= self.max[i])
    }

    /// The smallest box covering both
    pub fn union(&self, other: &Rect) -> Rect {
        let dims = self.dims().max(other.dims());
        let mut min = Vec::with_capacity(dims);
        let mut max = Vec::with_capacity(dims);
        for i in 0..dims {
            min.push(pick(self.min.get(i), other.min.get(i), f64::min));
            max.push(pick(self.max.get(i), other.max.get(i), f64::max));
        }
        Rect { min, max }
    }

    /// Product of the side lengths
    pub fn area(&self) -> f64 {
        self.min
            .iter()
            .zip(self.max.iter())
            .map(|(lo, hi)| hi - lo)
            .product()
    }

    /// Whether any bound is NaN (such a box compares unequal to itself)
    pub(crate) fn has_nan(&self) -> bool {
        self.min.iter().chain(self.max.iter()).any(|c| c.is_nan())
    }

    /// Midpoint along one dimension
    pub(crate) fn center(&self, dim: usize) -> f64 {
        match (self.min.get(dim), self.max.get(dim)) {
            (Some(lo), Some(hi)) => (lo + hi) / 2.0,
            _ => 0.0,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_corner(f, &self.min)?;
        if self.min != self.max {
            f.write_str(",")?;
            write_corner(f, &self.max)?;
        }
        Ok(())
    }
}

/// Rectangle extractor for values stored in the `Rect` text form
///
/// Values that do not parse are left out of the index.
pub fn index_rect(value: &str) -> Option<Rect> {
    Rect::parse(value).ok()
}

fn parse_corner(s: &str) -> Option<(Vec<f64>, &str)> {
    let body = s.strip_prefix('[')?;
    let end = body.find(']')?;
    let coords = body[..end]
        .split_whitespace()
        .map(|n| n.parse::<f64>().ok().filter(|c| !c.is_nan()))
        .collect::<Option<Vec<f64>>>()?;
    if coords.is_empty() {
        return None;
    }
    Some((coords, &body[end + 1..]))
}

fn write_corner(f: &mut fmt::Formatter<'_>, coords: &[f64]) -> fmt::Result {
    f.write_str("[")?;
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("]")
}

fn pick(a: Option<&f64>, b: Option<&f64>, choose: fn(f64, f64) -> f64) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => choose(*a, *b),
        (Some(v), None) | (None, Some(v)) => *v,
        (None, None) => 0.0,
    }
}

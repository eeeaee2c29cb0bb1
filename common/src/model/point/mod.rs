//! Point and batch models

use serde::{Deserialize, Serialize};

/// A single (x, y) sample
///
/// Points are plain values: once decoded they are only ever copied, never
/// updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Point {
    /// Create a new point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Ordered points produced by one producer-side encode
///
/// On the wire a batch is a bare JSON array of points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch(Vec<Point>);

impl Batch {
    /// Create a new batch
    pub fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Points in producer order
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the batch holds no points
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Point>> for Batch {
    fn from(points: Vec<Point>) -> Self {
        Self(points)
    }
}

impl FromIterator<Point> for Batch {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

//! Bounded, append-only point series

use std::collections::VecDeque;
use std::sync::RwLock;

use common::Point;

/// Points accumulated across batches, oldest first
///
/// Appends and evictions happen under one write lock and snapshots copy under
/// the read lock, so a reader only ever sees lengths the writer passed through.
#[derive(Debug)]
pub struct Series {
    points: RwLock<VecDeque<Point>>,
    max_len: usize,
}

impl Series {
    /// Create a series retaining at most `max_len` points (at least one)
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            points: RwLock::new(VecDeque::with_capacity(max_len.min(4096))),
            max_len,
        }
    }

    /// Retention bound
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Append points in order, evicting from the front past the bound.
    /// Returns the number of evicted points.
    pub fn append(&self, batch: &[Point]) -> usize {
        let mut points = self.points.write().unwrap_or_else(|e| e.into_inner());

        // Only the tail of an oversized batch can survive
        let incoming = &batch[batch.len().saturating_sub(self.max_len)..];
        let overflow = (points.len() + incoming.len()).saturating_sub(self.max_len);
        let evict = overflow.min(points.len());
        points.drain(..evict);
        points.extend(incoming.iter().copied());

        overflow + (batch.len() - incoming.len())
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> Vec<Point> {
        let points = self.points.read().unwrap_or_else(|e| e.into_inner());
        points.iter().copied().collect()
    }

    /// Current length
    pub fn len(&self) -> usize {
        self.points.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the series is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all points
    pub fn clear(&self) {
        self.points.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

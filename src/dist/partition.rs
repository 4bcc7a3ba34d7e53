use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::Pos;

/// A contiguous range of rows, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition {
    pub start: i32,
    pub end: i32,
}

impl Partition {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Splits `width` rows into at most `count` partitions.
    ///
    /// Every partition but the last holds `ceil(width / count)` rows, so the
    /// result tiles `0..width` exactly and holds fewer than `count` partitions
    /// when the remainder cannot feed them all.
    pub fn split(width: i32, count: usize) -> Vec<Self> {
        let count = count.max(1) as i32;
        let chunk = (width + count - 1) / count;
        (0..count)
            .map(|index| index * chunk)
            .take_while(|start| *start < width)
            .map(|start| Self::new(start, (start + chunk).min(width)))
            .collect()
    }

    pub fn rows(&self) -> Range<i32> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_row(&self, x: i32) -> bool {
        self.rows().contains(&x)
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.contains_row(pos.x)
    }

    /// rows just outside of the partition on a torus of `width` rows, the ones
    /// that fall back inside of it are left out.
    pub fn edge_rows(&self, width: i32) -> Vec<i32> {
        let left = (self.start - 1).rem_euclid(width);
        let right = self.end.rem_euclid(width);
        let mut rows = vec![];
        if !self.contains_row(left) {
            rows.push(left);
        }
        if !self.contains_row(right) && right != left {
            rows.push(right);
        }
        rows
    }
}

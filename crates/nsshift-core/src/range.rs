//! Closed id ranges tagged by axis.
//!
//! Persisted map forms are inclusive-inclusive, so the range type is too;
//! arithmetic that needs half-open semantics widens to `u64` internally.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// The id axis a range or map entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// User ids.
    Uid,
    /// Group ids.
    Gid,
}

/// A closed interval of ids on a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    /// Axis the range applies to.
    pub axis: Axis,
    /// First id in the range.
    pub start_id: u32,
    /// Last id in the range (inclusive).
    pub end_id: u32,
}

impl IdRange {
    /// Creates a range covering `[start_id, end_id]`.
    #[must_use]
    pub fn new(axis: Axis, start_id: u32, end_id: u32) -> Self {
        debug_assert!(start_id <= end_id);
        Self {
            axis,
            start_id,
            end_id,
        }
    }

    /// Number of ids covered.
    #[must_use]
    pub fn count(&self) -> u64 {
        u64::from(self.end_id) - u64::from(self.start_id) + 1
    }

    /// Whether `id` falls inside the range.
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        id >= self.start_id && id <= self.end_id
    }

    /// Whether two ranges on the same axis share any id. Ranges on
    /// different axes never overlap.
    #[must_use]
    pub fn overlaps(&self, other: &IdRange) -> bool {
        self.axis == other.axis && self.start_id <= other.end_id && other.start_id <= self.end_id
    }

    /// Subtracts `other` from this range, returning the up-to-two
    /// remainders. Used to strip delegated ranges from a candidate range.
    #[must_use]
    pub fn split_around(&self, other: &IdRange) -> Vec<IdRange> {
        if !self.overlaps(other) {
            return vec![*self];
        }

        let mut parts = Vec::with_capacity(2);
        if self.start_id < other.start_id {
            parts.push(IdRange::new(self.axis, self.start_id, other.start_id - 1));
        }
        if self.end_id > other.end_id {
            parts.push(IdRange::new(self.axis, other.end_id + 1, self.end_id));
        }
        parts
    }
}

impl Ord for IdRange {
    fn cmp(&self, other: &Self) -> Ordering {
        // Uid before gid, ascending start; equal starts put the longer
        // range first so consolidated output is deterministic.
        axis_rank(self.axis)
            .cmp(&axis_rank(other.axis))
            .then(self.start_id.cmp(&other.start_id))
            .then(other.end_id.cmp(&self.end_id))
    }
}

impl PartialOrd for IdRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn axis_rank(axis: Axis) -> u8 {
    match axis {
        Axis::Uid => 0,
        Axis::Gid => 1,
    }
}

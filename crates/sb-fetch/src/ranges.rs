//! Byte coverage bookkeeping.

use std::ops::Range;

use rangemap::RangeSet;
use serde::{Deserialize, Serialize};

/// Disjoint, non-adjacent byte intervals that are already available.
///
/// Inserting overlapping or touching intervals merges them, so the stored set
/// is always normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedRange {
    ranges: RangeSet<u64>,
    total_size: Option<u64>,
}

impl CachedRange {
    pub fn new(total_size: Option<u64>) -> Self {
        Self {
            ranges: RangeSet::new(),
            total_size,
        }
    }

    /// Record `range` as available. Empty ranges are ignored.
    pub fn insert(&mut self, range: Range<u64>) {
        if range.start < range.end {
            self.ranges.insert(range);
        }
    }

    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    pub fn set_total_size(&mut self, total: u64) {
        self.total_size = Some(total);
    }

    /// Clip `range` to the known total size.
    pub fn clip(&self, range: Range<u64>) -> Range<u64> {
        match self.total_size {
            Some(total) => range.start.min(total)..range.end.min(total),
            None => range,
        }
    }

    /// Whether every byte of `range` is available.
    pub fn covers(&self, range: &Range<u64>) -> bool {
        range.start >= range.end || self.ranges.gaps(range).next().is_none()
    }

    /// Whether data for `range` is ready to be served.
    ///
    /// True once the clipped range is covered, or once it is known to lie
    /// entirely past the end of the resource.
    pub fn satisfies(&self, range: &Range<u64>) -> bool {
        let clipped = self.clip(range.clone());
        clipped.start >= clipped.end || self.covers(&clipped)
    }

    /// Sub-ranges of `range` that are not yet available.
    pub fn gaps(&self, range: &Range<u64>) -> Vec<Range<u64>> {
        if range.start >= range.end {
            return Vec::new();
        }
        self.ranges.gaps(range).collect()
    }

    /// End of the contiguous available run starting at `offset`, if any.
    pub fn contiguous_end(&self, offset: u64) -> Option<u64> {
        self.ranges.get(&offset).map(|r| r.end)
    }

    /// True once the whole resource is available.
    pub fn is_complete(&self) -> bool {
        match self.total_size {
            Some(0) => true,
            Some(total) => self.covers(&(0..total)),
            None => false,
        }
    }

    pub fn covered_bytes(&self) -> u64 {
        self.ranges.iter().map(|r| r.end - r.start).sum()
    }

    pub fn intervals(&self) -> impl Iterator<Item = &Range<u64>> {
        self.ranges.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Serializable snapshot, as persisted in a transfer's metadata file.
    pub fn to_meta(&self) -> CoverageMeta {
        CoverageMeta {
            total_size: self.total_size,
            ranges: self.ranges.iter().map(|r| [r.start, r.end]).collect(),
        }
    }

    pub fn from_meta(meta: &CoverageMeta) -> Self {
        let mut coverage = Self::new(meta.total_size);
        for [start, end] in &meta.ranges {
            coverage.insert(*start..*end);
        }
        coverage
    }
}

/// On-disk form of a [`CachedRange`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageMeta {
    pub total_size: Option<u64>,
    pub ranges: Vec<[u64; 2]>,
}

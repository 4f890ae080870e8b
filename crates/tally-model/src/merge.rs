use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CellRef, Range};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("merge region {new} overlaps existing region {existing}")]
    Overlap { new: Range, existing: Range },
}

/// Non-overlapping merged regions of a worksheet, kept in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRegions {
    regions: Vec<Range>,
}

impl MergeRegions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region. Single-cell ranges are ignored; overlapping ranges are rejected.
    pub fn add(&mut self, range: Range) -> Result<(), MergeError> {
        if range.is_single_cell() {
            return Ok(());
        }
        if let Some(existing) = self.regions.iter().find(|r| r.intersects(&range)) {
            return Err(MergeError::Overlap {
                new: range,
                existing: *existing,
            });
        }
        self.regions.push(range);
        Ok(())
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Range> + '_ {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region containing `cell`, if any.
    pub fn containing(&self, cell: CellRef) -> Option<Range> {
        self.regions.iter().copied().find(|r| r.contains(cell))
    }

    /// Cell that holds the value for `cell`: the top-left of its merge region, or `cell` itself.
    pub fn anchor(&self, cell: CellRef) -> CellRef {
        self.containing(cell).map_or(cell, |r| r.start)
    }

    /// Re-anchor every region for `count` rows inserted before row `at`.
    ///
    /// Regions wholly at or below `at` move down, regions spanning `at` grow, regions above it are
    /// untouched. Relative order and disjointness are preserved.
    pub fn insert_rows(&mut self, at: u32, count: u32) {
        if count == 0 {
            return;
        }
        for region in &mut self.regions {
            *region = region.shifted_for_insert(at, count);
        }
    }
}

impl<'a> IntoIterator for &'a MergeRegions {
    type Item = &'a Range;
    type IntoIter = std::slice::Iter<'a, Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::formula_rewrite::shift_rows_in_formula;
use thiserror::Error;

use crate::{Cell, CellRef, CellValue, MergeError, MergeRegions, Range, MAX_ROWS};

/// Row-level formatting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowProperties {
    /// Height in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default)]
    pub custom_height: bool,
    #[serde(default)]
    pub hidden: bool,
    /// Row-level default style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_id: Option<u32>,
    /// Attributes the model does not interpret, kept in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub cells: BTreeMap<u32, Cell>,
    #[serde(default)]
    pub props: RowProperties,
}

/// Why [`Worksheet::insert_rows`] refused an insertion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertRowsError {
    #[error("inserting {count} rows would move content to row {}, past the last sheet row", .bottom + 1)]
    PastLastRow { bottom: u64, count: u32 },
    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl Row {
    pub fn is_blank(&self) -> bool {
        self.cells
            .values()
            .all(|c| c.value.is_empty() && c.formula.is_none())
    }
}

/// A block of rows inserted by [`Worksheet::insert_rows`], recorded so writers can re-anchor
/// worksheet content the model does not carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowInsertion {
    /// 0-indexed row the block was inserted before.
    pub at: u32,
    pub count: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub name: String,
    rows: BTreeMap<u32, Row>,
    merges: MergeRegions,
    #[serde(default)]
    insertions: Vec<RowInsertion>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = (u32, &Row)> + '_ {
        self.rows.iter().map(|(idx, row)| (*idx, row))
    }

    pub fn row(&self, row: u32) -> Option<&Row> {
        self.rows.get(&row)
    }

    pub fn row_mut(&mut self, row: u32) -> &mut Row {
        self.rows.entry(row).or_default()
    }

    pub fn cell(&self, cell: CellRef) -> Option<&Cell> {
        self.rows.get(&cell.row)?.cells.get(&cell.col)
    }

    pub fn cell_mut(&mut self, cell: CellRef) -> &mut Cell {
        self.row_mut(cell.row).cells.entry(cell.col).or_default()
    }

    /// Value shown at `cell`, reading through merged regions to their top-left cell.
    pub fn value_at(&self, cell: CellRef) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cell(self.merges.anchor(cell))
            .map_or(&EMPTY, |c| &c.value)
    }

    /// Cell that owns the value for `cell` once merges are taken into account.
    pub fn anchor_of(&self, cell: CellRef) -> CellRef {
        self.merges.anchor(cell)
    }

    /// Write a value at `cell`, redirecting writes inside a merged region to its top-left cell.
    /// Returns the cell actually written.
    pub fn set_value(&mut self, cell: CellRef, value: CellValue) -> CellRef {
        let anchor = self.merges.anchor(cell);
        let target = self.cell_mut(anchor);
        target.value = value;
        target.formula = None;
        anchor
    }

    pub fn merges(&self) -> &MergeRegions {
        &self.merges
    }

    pub fn add_merge(&mut self, range: Range) -> Result<(), MergeError> {
        self.merges.add(range)
    }

    pub fn row_insertions(&self) -> &[RowInsertion] {
        &self.insertions
    }

    /// Insert `count` rows before the 0-indexed row `at`.
    ///
    /// Rows at or below `at` move down, merged regions are shifted or grown, and formula row
    /// references on the sheet are re-anchored. When `template` names a row (by its index before
    /// the insertion) each new row receives that row's properties, its cell styles without values,
    /// and copies of its single-row merges.
    ///
    /// The sheet is left untouched when the insertion would push content past [`MAX_ROWS`] or a
    /// copied merge would overlap a different region.
    pub fn insert_rows(
        &mut self,
        at: u32,
        count: u32,
        template: Option<u32>,
    ) -> Result<(), InsertRowsError> {
        if count == 0 {
            return Ok(());
        }
        let bottom = self
            .used_range()
            .map(|r| r.end.row)
            .filter(|row| *row >= at)
            .map_or(u64::from(at) + u64::from(count) - 1, |row| {
                u64::from(row) + u64::from(count)
            });
        if bottom >= u64::from(MAX_ROWS) {
            return Err(InsertRowsError::PastLastRow { bottom, count });
        }

        let template_row = template.and_then(|t| self.rows.get(&t).cloned());
        let merge_copies = match template {
            Some(t) => self.merge_copies(t, at, count)?,
            None => Vec::new(),
        };

        let moved = self.rows.split_off(&at);
        for (idx, row) in moved {
            self.rows.insert(idx + count, row);
        }

        for row in self.rows.values_mut() {
            for cell in row.cells.values_mut() {
                let Some(formula) = cell.formula.as_mut() else {
                    continue;
                };
                formula.text = shift_rows_in_formula(&formula.text, at, count);
                if let Some(shared) = formula.shared.as_mut() {
                    shared.range = shared.range.map(|r| r.shifted_for_insert(at, count));
                }
                formula.array_range = formula.array_range.map(|r| r.shifted_for_insert(at, count));
            }
        }
        self.merges.insert_rows(at, count);

        if let Some(template_row) = template_row {
            for offset in 0..count {
                let new_row = Row {
                    cells: template_row
                        .cells
                        .iter()
                        .map(|(col, cell)| (*col, cell.clone_style_only()))
                        .collect(),
                    props: template_row.props.clone(),
                };
                self.rows.insert(at + offset, new_row);
            }
        }
        for copy in merge_copies {
            self.merges.add(copy)?;
        }

        self.insertions.push(RowInsertion { at, count });
        Ok(())
    }

    /// Copies of `template`'s single-row merges for each inserted row, checked against where the
    /// existing regions land after the insertion. A copy already covered by a grown region is
    /// dropped.
    fn merge_copies(&self, template: u32, at: u32, count: u32) -> Result<Vec<Range>, MergeError> {
        let shifted: Vec<Range> = self
            .merges
            .iter()
            .map(|m| m.shifted_for_insert(at, count))
            .collect();
        let mut copies = Vec::new();
        for merge in self
            .merges
            .iter()
            .filter(|m| m.start.row == template && m.end.row == template)
        {
            for row in at..at + count {
                let copy = Range::new(
                    CellRef::new(row, merge.start.col),
                    CellRef::new(row, merge.end.col),
                );
                match shifted.iter().find(|r| r.intersects(&copy)) {
                    None => copies.push(copy),
                    Some(existing)
                        if existing.contains(copy.start) && existing.contains(copy.end) => {}
                    Some(existing) => {
                        return Err(MergeError::Overlap {
                            new: copy,
                            existing: *existing,
                        })
                    }
                }
            }
        }
        Ok(copies)
    }

    /// Reset values and formulas in a row, keeping cells, styles and row properties.
    pub fn clear_row_contents(&mut self, row: u32) {
        if let Some(row) = self.rows.get_mut(&row) {
            for cell in row.cells.values_mut() {
                cell.clear_contents();
            }
        }
    }

    /// Smallest range covering every stored cell and merged region.
    pub fn used_range(&self) -> Option<Range> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        let mut include = |row: u32, col: u32| {
            bounds = Some(match bounds {
                None => (row, col, row, col),
                Some((r0, c0, r1, c1)) => (r0.min(row), c0.min(col), r1.max(row), c1.max(col)),
            });
        };
        for (idx, row) in &self.rows {
            for col in row.cells.keys() {
                include(*idx, *col);
            }
        }
        for merge in &self.merges {
            include(merge.start.row, merge.start.col);
            include(merge.end.row, merge.end.col);
        }
        bounds.map(|(r0, c0, r1, c1)| Range::new(CellRef::new(r0, c0), CellRef::new(r1, c1)))
    }
}

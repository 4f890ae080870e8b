use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest row count a worksheet can address (1,048,576).
pub const MAX_ROWS: u32 = 1_048_576;

/// Largest column count a worksheet can address (16,384, column `XFD`).
pub const MAX_COLS: u32 = 16_384;

/// Position of a single cell.
///
/// Both coordinates are **0-indexed**: `CellRef { row: 0, col: 0 }` is `A1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Render as A1 notation (`G38`).
    pub fn to_a1(self) -> String {
        let mut out = column_name(self.col);
        out.push_str(&(self.row + 1).to_string());
        out
    }

    /// Parse A1 notation. `$` markers are accepted and ignored; lowercase letters are accepted.
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(A1ParseError::Empty);
        }

        let rest = s.strip_prefix('$').unwrap_or(s);
        let letters_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        if letters_end == 0 {
            return Err(A1ParseError::MissingColumn);
        }
        let (letters, rest) = rest.split_at(letters_end);
        let digits = rest.strip_prefix('$').unwrap_or(rest);
        if digits.is_empty() {
            return Err(A1ParseError::MissingRow);
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(A1ParseError::TrailingCharacters);
        }

        let col = column_index(letters)?;
        let row: u32 = digits.parse().map_err(|_| A1ParseError::InvalidRow)?;
        if row == 0 || row > MAX_ROWS {
            return Err(A1ParseError::InvalidRow);
        }
        Ok(Self::new(row - 1, col))
    }

    /// Returns this reference moved down by `count` rows when it sits at or below row `at`.
    #[inline]
    pub const fn shifted_for_insert(self, at: u32, count: u32) -> Self {
        if self.row >= at {
            Self::new(self.row + count, self.col)
        } else {
            self
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Inclusive rectangle of cells, always stored with `start <= end` on both axes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

impl Range {
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    #[inline]
    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    #[inline]
    pub fn intersects(&self, other: &Range) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    #[inline]
    pub const fn width(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    #[inline]
    pub const fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    #[inline]
    pub const fn is_single_cell(&self) -> bool {
        self.start.row == self.end.row && self.start.col == self.end.col
    }

    /// Adjust the range for `count` rows inserted before row `at`.
    ///
    /// A range wholly at or below `at` moves down, a range that starts above `at` and reaches
    /// it grows, and a range that ends above `at` is unchanged.
    pub const fn shifted_for_insert(self, at: u32, count: u32) -> Self {
        Self {
            start: self.start.shifted_for_insert(at, count),
            end: self.end.shifted_for_insert(at, count),
        }
    }

    /// Parse `A1:B2`, or a single cell `C3` as a one-cell range.
    pub fn from_a1(a1: &str) -> Result<Self, RangeParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(RangeParseError::Empty);
        }
        let (a, b) = s.split_once(':').unwrap_or((s, s));
        Ok(Self::new(CellRef::from_a1(a)?, CellRef::from_a1(b)?))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum A1ParseError {
    #[error("empty A1 reference")]
    Empty,
    #[error("missing column in A1 reference")]
    MissingColumn,
    #[error("missing row in A1 reference")]
    MissingRow,
    #[error("invalid column in A1 reference")]
    InvalidColumn,
    #[error("invalid row in A1 reference")]
    InvalidRow,
    #[error("trailing characters in A1 reference")]
    TrailingCharacters,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum RangeParseError {
    #[error("empty A1 range")]
    Empty,
    #[error("invalid cell reference in range: {0}")]
    Cell(#[from] A1ParseError),
}

/// Column letters for a 0-indexed column (`0 -> "A"`, `27 -> "AB"`).
pub fn column_name(col: u32) -> String {
    let mut n = col + 1;
    let mut letters = Vec::with_capacity(3);
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(char::from(b'A' + rem));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// 0-indexed column for column letters, case-insensitive (`"g" -> 6`).
pub fn column_index(letters: &str) -> Result<u32, A1ParseError> {
    let letters = letters.trim().trim_start_matches('$');
    if letters.is_empty() {
        return Err(A1ParseError::MissingColumn);
    }
    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(A1ParseError::InvalidColumn);
        }
        let digit = u32::from(b.to_ascii_uppercase() - b'A') + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(digit))
            .ok_or(A1ParseError::InvalidColumn)?;
    }
    if col > MAX_COLS {
        return Err(A1ParseError::InvalidColumn);
    }
    Ok(col - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_prints_a1() {
        assert_eq!(CellRef::from_a1("G38").unwrap(), CellRef::new(37, 6));
        assert_eq!(CellRef::from_a1("$c$4").unwrap(), CellRef::new(3, 2));
        assert_eq!(CellRef::new(31, 54).to_a1(), "BC32");
        assert_eq!(column_name(16_383), "XFD");
        assert_eq!(column_index("xfd").unwrap(), 16_383);
    }

    #[test]
    fn rejects_malformed_references() {
        assert_eq!(CellRef::from_a1(""), Err(A1ParseError::Empty));
        assert_eq!(CellRef::from_a1("12"), Err(A1ParseError::MissingColumn));
        assert_eq!(CellRef::from_a1("G"), Err(A1ParseError::MissingRow));
        assert_eq!(CellRef::from_a1("G0"), Err(A1ParseError::InvalidRow));
        assert_eq!(CellRef::from_a1("G1x"), Err(A1ParseError::TrailingCharacters));
        assert_eq!(CellRef::from_a1("XFE1"), Err(A1ParseError::InvalidColumn));
        assert_eq!(CellRef::from_a1("A1048577"), Err(A1ParseError::InvalidRow));
    }

    #[test]
    fn range_insert_shift_and_grow() {
        let below = Range::from_a1("A11:C12").unwrap();
        assert_eq!(below.shifted_for_insert(9, 4).to_string(), "A15:C16");

        let straddling = Range::from_a1("B5:B10").unwrap();
        assert_eq!(straddling.shifted_for_insert(9, 4).to_string(), "B5:B14");

        let above = Range::from_a1("A1:H2").unwrap();
        assert_eq!(above.shifted_for_insert(9, 4), above);
    }
}

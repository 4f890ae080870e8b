//! `tally-model` holds the in-memory form of an invoice template: one worksheet of cells with
//! shared styles and merged regions.
//!
//! The model is container-agnostic. Loading from and saving to `.xlsx` lives in `tally-xlsx`.

mod address;
mod cell;
pub mod formula_rewrite;
mod merge;
mod style;
mod value;
mod worksheet;

pub use address::{
    column_index, column_name, A1ParseError, CellRef, Range, RangeParseError, MAX_COLS, MAX_ROWS,
};
pub use cell::{Cell, Formula, SharedFormula};
pub use merge::{MergeError, MergeRegions};
pub use style::{
    Alignment, Border, BorderStyle, Color, Fill, Font, HorizontalAlignment, Style, StyleTable,
};
pub use value::CellValue;
pub use worksheet::{InsertRowsError, Row, RowInsertion, RowProperties, Worksheet};

/// A template document: the worksheet being processed plus the style table its cells refer to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub sheet: Worksheet,
    pub styles: StyleTable,
}

impl Document {
    pub fn new(sheet: Worksheet, styles: StyleTable) -> Self {
        Self { sheet, styles }
    }

    /// Style of the cell at `cell`, falling back to the default style.
    pub fn style_at(&self, cell: CellRef) -> &Style {
        static DEFAULT: std::sync::OnceLock<Style> = std::sync::OnceLock::new();
        let id = self.sheet.cell(cell).map_or(0, |c| c.style_id);
        self.styles
            .get(id)
            .unwrap_or_else(|| DEFAULT.get_or_init(Style::default))
    }
}

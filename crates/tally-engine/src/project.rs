//! Read-only projection of a stamped template for previews.

use std::collections::BTreeMap;

use serde::Serialize;
use tally_format::{format_value, Locale};
use tally_model::{CellRef, CellValue, Document};

use crate::distribute::{cents_to_value, value_to_cents};
use crate::template::BandLayout;

/// Tabular snapshot of the bag band plus metadata anchor values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Projection {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Numeric weights as stored in the band.
    pub weights: Vec<f64>,
    pub metadata: ProjectionMetadata,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectionMetadata {
    pub sheet_name: String,
    pub template_type: String,
    pub bag_count: usize,
    pub total: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub average: Option<f64>,
    pub seed: Option<u64>,
    pub total_rows: u32,
    pub total_columns: u32,
    /// Display value of each metadata anchor, keyed by field name.
    pub anchors: BTreeMap<String, String>,
}

/// Display string of the value shown at `at`, formatted with the cell's number format.
pub fn display_value(doc: &Document, at: CellRef, locale: &Locale) -> String {
    let anchor = doc.sheet.anchor_of(at);
    match doc.sheet.value_at(anchor) {
        CellValue::Empty => String::new(),
        CellValue::Number(n) => {
            format_value(*n, doc.style_at(anchor).number_format.as_deref(), locale)
        }
        CellValue::Text(s) => s.clone(),
        CellValue::Boolean(true) => "TRUE".to_string(),
        CellValue::Boolean(false) => "FALSE".to_string(),
        CellValue::Error(e) => e.clone(),
    }
}

pub fn project(
    doc: &Document,
    layout: &BandLayout,
    locale: &Locale,
    seed: Option<u64>,
) -> Projection {
    let used = doc.sheet.used_range();
    let (first_col, last_col) = match (used, layout.weight_column) {
        (Some(r), Some(w)) => (r.start.col.min(w), r.end.col.max(w)),
        (Some(r), None) => (r.start.col, r.end.col),
        (None, Some(w)) => (w, w),
        (None, None) => (0, 0),
    };
    let row_strings = |row: u32| -> Vec<String> {
        (first_col..=last_col)
            .map(|col| display_value(doc, CellRef::new(row, col), locale))
            .collect()
    };

    let headers = layout.header_row.map(row_strings).unwrap_or_default();
    let rows: Vec<Vec<String>> = layout.bag_rows().map(row_strings).collect();

    let weights: Vec<f64> = match layout.weight_column {
        Some(col) => layout
            .bag_rows()
            .filter_map(|row| doc.sheet.value_at(CellRef::new(row, col)).as_number())
            .collect(),
        None => Vec::new(),
    };
    let cents: Vec<i64> = weights.iter().map(|w| value_to_cents(*w)).collect();
    let total_cents: i64 = cents.iter().sum();
    let average = (!cents.is_empty())
        .then(|| (total_cents as f64 / cents.len() as f64).round() / 100.0);

    let anchors = layout
        .metadata_anchors()
        .into_iter()
        .map(|(name, at)| (name, display_value(doc, at, locale)))
        .collect();

    Projection {
        headers,
        rows,
        metadata: ProjectionMetadata {
            sheet_name: doc.sheet.name.clone(),
            template_type: layout.template.clone(),
            bag_count: weights.len(),
            total: cents_to_value(total_cents),
            min: cents.iter().min().map(|c| cents_to_value(*c)),
            max: cents.iter().max().map(|c| cents_to_value(*c)),
            average,
            seed,
            total_rows: used.map_or(0, |r| r.end.row + 1),
            total_columns: used.map_or(0, |r| r.end.col + 1),
            anchors,
        },
        weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateRegistry;
    use pretty_assertions::assert_eq;
    use tally_model::{Style, StyleTable, Worksheet};

    fn at(a1: &str) -> CellRef {
        CellRef::from_a1(a1).unwrap()
    }

    #[test]
    fn projects_band_rows_weights_and_anchor_values() {
        let number = Style {
            number_format: Some("#,##0.00".into()),
            ..Style::default()
        };
        let mut sheet = Worksheet::new("Invoice");
        sheet.set_value(at("A7"), CellValue::from("Bag"));
        sheet.set_value(at("G7"), CellValue::from("Weight"));
        for (i, w) in [1250.5, 1249.5, 1250.0].into_iter().enumerate() {
            let row = 7 + i as u32;
            sheet.set_value(CellRef::new(row, 0), CellValue::Number((i + 1) as f64));
            sheet.set_value(CellRef::new(row, 6), CellValue::Number(w));
            sheet.cell_mut(CellRef::new(row, 6)).style_id = 1;
        }
        sheet.set_value(at("C3"), CellValue::from("ACME Yarns"));
        let doc = Document::new(sheet, StyleTable::from_loaded(vec![Style::default(), number]));

        let registry = TemplateRegistry::builtin();
        let mut layout = BandLayout::resolve("default", registry.get("default").unwrap()).unwrap();
        layout.active_rows = 3;
        let projection = project(&doc, &layout, &Locale::en_us(), Some(7));

        assert_eq!(
            projection.headers,
            vec!["Bag", "", "", "", "", "", "Weight"]
        );
        assert_eq!(projection.rows[0], vec!["1", "", "", "", "", "", "1,250.50"]);
        assert_eq!(projection.weights, vec![1250.5, 1249.5, 1250.0]);
        let meta = &projection.metadata;
        assert_eq!(meta.total, 3750.0);
        assert_eq!(meta.min, Some(1249.5));
        assert_eq!(meta.max, Some(1250.5));
        assert_eq!(meta.average, Some(1250.0));
        assert_eq!(meta.bag_count, 3);
        assert_eq!(meta.seed, Some(7));
        assert_eq!((meta.total_rows, meta.total_columns), (10, 7));
        assert_eq!(meta.anchors["name"], "ACME Yarns");
        assert_eq!(meta.anchors["date"], "");
    }
}

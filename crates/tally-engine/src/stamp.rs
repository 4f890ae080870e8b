//! Writing weights, totals and metadata into a provisioned template.

use std::sync::OnceLock;

use regex::Regex;
use tally_format::{date_to_serial, is_date_format};
use tally_model::{column_name, CellRef, CellValue, Document, Font, Formula, Style};

use crate::config::WeightFont;
use crate::distribute::{cents_to_value, WeightPlan};
use crate::request::Metadata;
use crate::template::BandLayout;
use crate::EngineError;

/// Formatting applied to the cells the stamper writes.
#[derive(Clone, Copy, Debug)]
pub struct StampOptions<'a> {
    pub number_format: &'a str,
    pub date_format: &'a str,
    pub weight_font: &'a WeightFont,
    /// Keep each written cell's wrap flag; when false wrapping is switched off.
    pub preserve_wrapping: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StampReport {
    /// Cells written, in write order.
    pub written: Vec<CellRef>,
    /// Label names with no anchor in the template.
    pub skipped_labels: Vec<String>,
}

pub fn stamp(
    doc: &mut Document,
    layout: &BandLayout,
    plan: &WeightPlan,
    metadata: &Metadata,
    options: &StampOptions<'_>,
) -> Result<StampReport, EngineError> {
    let missing = |anchor| EngineError::AnchorMissing {
        template: layout.template.clone(),
        anchor,
    };
    let weight_col = layout.weight_column.ok_or_else(|| missing("weight_column"))?;
    let totals_cell = layout.totals_cell.ok_or_else(|| missing("totals_cell"))?;
    debug_assert_eq!(plan.len(), layout.active_rows as usize);

    let mut stamper = Stamper {
        doc,
        options,
        report: StampReport::default(),
    };

    let weight_style = |style: &mut Style| {
        style.number_format = Some(options.number_format.to_string());
        apply_weight_font(&mut style.font, options.weight_font);
    };

    for (row, cents) in layout.bag_rows().zip(plan.cents()) {
        let at = CellRef::new(row, weight_col);
        stamper.write(at, CellValue::Number(cents_to_value(*cents)), weight_style);
    }

    let total = CellValue::Number(plan.total());
    let anchor = stamper.doc.sheet.anchor_of(totals_cell);
    let has_formula = stamper
        .doc
        .sheet
        .cell(anchor)
        .is_some_and(|c| c.formula.is_some());
    if has_formula {
        let first = layout.start_row + 1;
        let last = layout.start_row + layout.active_rows;
        let col = column_name(weight_col);
        let cell = stamper.doc.sheet.cell_mut(anchor);
        cell.formula = Some(Formula::new(format!("SUM({col}{first}:{col}{last})")));
        cell.value = total;
        stamper.restyle(anchor, weight_style);
        stamper.report.written.push(anchor);
    } else {
        stamper.write(totals_cell, total, weight_style);
    }

    if let Some(col) = layout.bag_id_column {
        for (i, row) in layout.bag_rows().enumerate() {
            stamper.write(
                CellRef::new(row, col),
                CellValue::Number((i + 1) as f64),
                |_| {},
            );
        }
    }

    if let Some(at) = layout.bag_count_cell {
        let current = stamper.doc.sheet.value_at(at).as_text().map(str::to_string);
        let label = bag_count_label(current.as_deref(), plan.len());
        stamper.write(at, CellValue::Text(label), |_| {});
    }

    if let (Some(date), Some(at)) = (metadata.date, layout.date_cell) {
        let date_format = options.date_format;
        stamper.write(at, CellValue::Number(date_to_serial(date)), |style| {
            if !style.number_format.as_deref().is_some_and(is_date_format) {
                style.number_format = Some(date_format.to_string());
            }
        });
    }

    let text_fields = [
        (&metadata.lot_number, layout.lot_number_cell),
        (&metadata.name, layout.name_cell),
        (&metadata.address, layout.address_cell),
    ];
    for (value, cell) in text_fields {
        if let (Some(value), Some(at)) = (value, cell) {
            stamper.write(at, CellValue::Text(value.clone()), |_| {});
        }
    }

    for (name, value) in &metadata.labels {
        match layout.label_cells.get(name) {
            Some(at) => stamper.write(*at, CellValue::Text(value.clone()), |_| {}),
            None => {
                log::warn!(
                    "template {:?} has no anchor for label {name:?}, skipping it",
                    layout.template
                );
                stamper.report.skipped_labels.push(name.clone());
            }
        }
    }

    Ok(stamper.report)
}

struct Stamper<'d, 'o> {
    doc: &'d mut Document,
    options: &'o StampOptions<'o>,
    report: StampReport,
}

impl Stamper<'_, '_> {
    fn write(&mut self, at: CellRef, value: CellValue, style: impl FnOnce(&mut Style)) {
        let anchor = self.doc.sheet.set_value(at, value);
        self.restyle(anchor, style);
        self.report.written.push(anchor);
    }

    /// Derive a style for `at` from its current one, applying the wrap policy last.
    fn restyle(&mut self, at: CellRef, change: impl FnOnce(&mut Style)) {
        let base = self.doc.sheet.cell(at).map_or(0, |c| c.style_id);
        let mut style = self.doc.style_at(at).clone();
        change(&mut style);
        if !self.options.preserve_wrapping {
            style.alignment.wrap_text = false;
        }
        let id = self.doc.styles.derive(base, style);
        self.doc.sheet.cell_mut(at).style_id = id;
    }
}

fn apply_weight_font(font: &mut Font, weight_font: &WeightFont) {
    font.size_100pt = Some(Font::size_from_pt(weight_font.size));
    if let Some(name) = &weight_font.name {
        font.name = Some(name.clone());
    }
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

/// Label text for `count` bags, keeping the wording of an existing "... Bags" label.
pub fn bag_count_label(current: Option<&str>, count: usize) -> String {
    match current {
        Some(text) if text.to_lowercase().contains("bag") => {
            if digits_re().is_match(text) {
                digits_re().replace(text, count.to_string()).into_owned()
            } else {
                format!("{count} {}", text.trim_start())
            }
        }
        _ => format!("{count} Bags"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribute::distribute;
    use crate::template::TemplateDescriptor;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use tally_model::{Range, StyleTable, Worksheet};

    fn at(a1: &str) -> CellRef {
        CellRef::from_a1(a1).unwrap()
    }

    fn descriptor() -> TemplateDescriptor {
        TemplateDescriptor {
            weight_column: Some("G".into()),
            start_row: 8,
            total_row: 10,
            bag_id_column: Some("A".into()),
            totals_cell: Some("G11".into()),
            bag_count_cell: Some("C11".into()),
            date_cell: Some("A4".into()),
            lot_number_cell: Some("B4".into()),
            name_cell: Some("C3".into()),
            address_cell: Some("C4".into()),
            header_row: None,
            label_cells: [("vessel".to_string(), "E4".to_string())].into(),
        }
    }

    fn document() -> Document {
        let mut wrapped = Style::default();
        wrapped.alignment.wrap_text = true;
        wrapped.font.name = Some("Calibri".into());
        wrapped.font.size_100pt = Some(1100);
        let mut sheet = Worksheet::new("Invoice");
        for row in 7..10 {
            sheet.cell_mut(CellRef::new(row, 6)).style_id = 1;
        }
        sheet.add_merge(Range::from_a1("C3:F3").unwrap()).unwrap();
        sheet.set_value(at("C3"), CellValue::from("NAME"));
        sheet.set_value(at("B4"), CellValue::from("LOT"));
        sheet.set_value(at("C11"), CellValue::from("Total 0 Bags"));
        sheet.cell_mut(at("G11")).formula = Some(Formula::new("SUM(G8:G9)"));
        Document::new(sheet, StyleTable::from_loaded(vec![Style::default(), wrapped]))
    }

    fn options(font: &WeightFont, preserve_wrapping: bool) -> StampOptions<'_> {
        StampOptions {
            number_format: "#,##0.00",
            date_format: "yyyy-mm-dd",
            weight_font: font,
            preserve_wrapping,
        }
    }

    #[test]
    fn writes_weights_totals_and_metadata() {
        let mut doc = document();
        let layout = BandLayout::resolve("fixture", &descriptor()).unwrap();
        let plan = distribute(30.0, 3, -2.0, 2.0, 9).unwrap();
        let metadata = Metadata {
            date: NaiveDate::from_ymd_opt(2024, 3, 15),
            name: Some("ACME Yarns".into()),
            labels: [
                ("vessel".to_string(), "MV Aurora".to_string()),
                ("port".to_string(), "Genoa".to_string()),
            ]
            .into(),
            ..Metadata::default()
        };
        let font = WeightFont::default();
        let report = stamp(&mut doc, &layout, &plan, &metadata, &options(&font, true)).unwrap();

        let sheet = &doc.sheet;
        let weights: Vec<f64> = (7..10)
            .map(|row| sheet.value_at(CellRef::new(row, 6)).as_number().unwrap())
            .collect();
        assert_eq!(weights, plan.values());
        assert_eq!(sheet.value_at(at("G11")), &CellValue::Number(30.0));
        assert_eq!(
            sheet.cell(at("G11")).unwrap().formula.as_ref().unwrap().text,
            "SUM(G8:G10)"
        );
        assert_eq!(sheet.value_at(at("A10")), &CellValue::Number(3.0));
        assert_eq!(sheet.value_at(at("C11")), &CellValue::from("Total 3 Bags"));
        assert_eq!(sheet.value_at(at("E3")), &CellValue::from("ACME Yarns"));
        assert_eq!(sheet.value_at(at("B4")), &CellValue::from("LOT"));
        assert_eq!(sheet.value_at(at("E4")), &CellValue::from("MV Aurora"));
        assert_eq!(sheet.value_at(at("A4")), &CellValue::Number(45366.0));
        assert_eq!(
            doc.style_at(at("A4")).number_format.as_deref(),
            Some("yyyy-mm-dd")
        );
        assert_eq!(report.skipped_labels, vec!["port".to_string()]);

        let weight_style = doc.style_at(at("G8"));
        assert_eq!(weight_style.number_format.as_deref(), Some("#,##0.00"));
        assert_eq!(weight_style.font.size_100pt, Some(900));
        assert_eq!(weight_style.font.name.as_deref(), Some("Calibri"));
        assert!(weight_style.alignment.wrap_text);
        let totals_style = doc.style_at(at("G11"));
        assert_eq!(totals_style.number_format, weight_style.number_format);
        assert_eq!(totals_style.font.size_100pt, weight_style.font.size_100pt);
    }

    #[test]
    fn wrapping_is_switched_off_when_not_preserved() {
        let mut doc = document();
        let layout = BandLayout::resolve("fixture", &descriptor()).unwrap();
        let plan = distribute(30.0, 3, 0.0, 0.0, 0).unwrap();
        let font = WeightFont {
            name: Some("Arial".into()),
            size: 10.0,
        };
        stamp(&mut doc, &layout, &plan, &Metadata::default(), &options(&font, false)).unwrap();
        let style = doc.style_at(at("G9"));
        assert!(!style.alignment.wrap_text);
        assert_eq!(style.font.name.as_deref(), Some("Arial"));
        assert_eq!(style.font.size_100pt, Some(1000));
        assert_eq!(doc.sheet.value_at(at("C3")), &CellValue::from("NAME"));
    }

    #[test]
    fn missing_weight_or_totals_anchor_is_fatal() {
        let plan = distribute(30.0, 3, 0.0, 0.0, 0).unwrap();
        let font = WeightFont::default();
        for field in ["weight_column", "totals_cell"] {
            let mut d = descriptor();
            match field {
                "weight_column" => d.weight_column = None,
                _ => d.totals_cell = None,
            }
            let layout = BandLayout::resolve("fixture", &d).unwrap();
            let mut doc = document();
            let err = stamp(&mut doc, &layout, &plan, &Metadata::default(), &options(&font, true))
                .unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::AnchorMissingError);
            assert_eq!(err.field(), Some(field));
        }
    }

    #[test]
    fn bag_count_labels_keep_their_wording() {
        assert_eq!(bag_count_label(Some("30 Bags"), 12), "12 Bags");
        assert_eq!(bag_count_label(Some("Bags"), 4), "4 Bags");
        assert_eq!(bag_count_label(Some("Total"), 4), "4 Bags");
        assert_eq!(bag_count_label(None, 1), "1 Bags");
    }
}

//! Processing requests and their validation against a loaded template.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tally_model::{CellRef, Worksheet};

use crate::distribute::VariationBand;
use crate::template::BandLayout;
use crate::EngineError;

/// Date layouts accepted for the `date` field.
const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"];

/// What the caller asked for. Every field is optional or defaulted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingRequest {
    pub template_type: String,
    /// Number of bags; inferred from the template when absent.
    pub bag_count: Option<u64>,
    /// Total weight; inferred from pre-filled band weights when absent.
    pub target_weight: Option<f64>,
    pub min_percent: f64,
    pub max_percent: f64,
    pub preserve_wrapping: bool,
    pub date: Option<String>,
    pub lot_number: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    /// Values for the template's extra label anchors.
    pub labels: BTreeMap<String, String>,
    pub seed: Option<u64>,
    /// Name of the uploaded file, used to suggest the output name.
    pub filename: Option<String>,
    /// Also produce the paginated text view.
    pub render_text: bool,
}

impl Default for ProcessingRequest {
    fn default() -> Self {
        Self {
            template_type: "default".to_string(),
            bag_count: None,
            target_weight: None,
            min_percent: -2.0,
            max_percent: 2.0,
            preserve_wrapping: true,
            date: None,
            lot_number: None,
            name: None,
            address: None,
            labels: BTreeMap::new(),
            seed: None,
            filename: None,
            render_text: false,
        }
    }
}

/// Document-level fields written into anchor cells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    pub date: Option<NaiveDate>,
    pub lot_number: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// A request whose numbers are known to be usable.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedRequest {
    pub template_type: String,
    /// Requested bag count; bounds against the configured ceiling are checked when provisioning.
    pub bag_count: u64,
    pub target_weight: f64,
    pub band: VariationBand,
    pub preserve_wrapping: bool,
    pub metadata: Metadata,
    pub seed: Option<u64>,
    pub filename: Option<String>,
}

impl ProcessingRequest {
    /// Check the numeric fields and fill in the ones the template can supply.
    pub fn validate(
        &self,
        sheet: &Worksheet,
        layout: &BandLayout,
    ) -> Result<ValidatedRequest, EngineError> {
        let band = VariationBand::new(self.min_percent, self.max_percent)?;

        let bag_count = match self.bag_count {
            Some(0) => return Err(EngineError::invalid("bag_count", "must be at least 1")),
            Some(n) => n,
            None => infer_bag_count(sheet, layout).ok_or_else(|| {
                EngineError::invalid(
                    "bag_count",
                    "not given and the template has no pre-filled weights or bag count label",
                )
            })?,
        };

        let target_weight = match self.target_weight {
            Some(w) if w.is_finite() && w > 0.0 => w,
            Some(w) => {
                return Err(EngineError::invalid(
                    "target_weight",
                    format!("{w} is not a positive number"),
                ))
            }
            None => infer_target_weight(sheet, layout).ok_or_else(|| {
                EngineError::invalid(
                    "target_weight",
                    "not given and the band has no pre-filled weights to sum",
                )
            })?,
        };

        let date = match non_blank(&self.date) {
            Some(text) => Some(parse_date(&text)?),
            None => None,
        };

        Ok(ValidatedRequest {
            template_type: self.template_type.clone(),
            bag_count,
            target_weight,
            band,
            preserve_wrapping: self.preserve_wrapping,
            metadata: Metadata {
                date,
                lot_number: non_blank(&self.lot_number),
                name: non_blank(&self.name),
                address: non_blank(&self.address),
                labels: self
                    .labels
                    .iter()
                    .filter(|(_, v)| !v.trim().is_empty())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            },
            seed: self.seed,
            filename: self.filename.clone(),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn parse_date(text: &str) -> Result<NaiveDate, EngineError> {
    let text = text.trim();
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
        .ok_or_else(|| {
            EngineError::invalid(
                "date",
                format!("{text:?} is not YYYY-MM-DD, MM/DD/YYYY or DD-MM-YYYY"),
            )
        })
}

fn band_weights<'a>(
    sheet: &'a Worksheet,
    layout: &BandLayout,
) -> impl Iterator<Item = &'a tally_model::CellValue> + 'a {
    let column = layout.weight_column;
    let rows = layout.start_row..=layout.last_row;
    rows.filter_map(move |row| column.map(|col| sheet.value_at(CellRef::new(row, col))))
}

/// Count of non-empty weight cells in the band, else the number in the bag count label.
pub fn infer_bag_count(sheet: &Worksheet, layout: &BandLayout) -> Option<u64> {
    let filled = band_weights(sheet, layout).filter(|v| !v.is_empty()).count() as u64;
    if filled > 0 {
        return Some(filled);
    }
    let label = sheet.value_at(layout.bag_count_cell?);
    bag_count_from_label(label.as_text()?).filter(|n| *n > 0)
}

/// Sum of numeric pre-filled weights in the band.
pub fn infer_target_weight(sheet: &Worksheet, layout: &BandLayout) -> Option<f64> {
    let sum: f64 = band_weights(sheet, layout)
        .filter_map(|v| v.as_number())
        .sum();
    (sum.is_finite() && sum > 0.0).then_some(sum)
}

fn bag_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*[Bb]ags?").expect("valid regex"))
}

/// `"25 Bags"` -> 25.
pub fn bag_count_from_label(text: &str) -> Option<u64> {
    bag_label_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateRegistry;
    use pretty_assertions::assert_eq;
    use tally_model::CellValue;

    fn layout() -> BandLayout {
        let registry = TemplateRegistry::builtin();
        BandLayout::resolve("default", registry.get("default").unwrap()).unwrap()
    }

    fn at(a1: &str) -> CellRef {
        CellRef::from_a1(a1).unwrap()
    }

    #[test]
    fn explicit_values_pass_through() {
        let request = ProcessingRequest {
            bag_count: Some(25),
            target_weight: Some(1000.5),
            date: Some("03/15/2024".into()),
            name: Some("  ".into()),
            lot_number: Some("L-7".into()),
            ..ProcessingRequest::default()
        };
        let valid = request.validate(&Worksheet::new("Invoice"), &layout()).unwrap();
        assert_eq!(valid.bag_count, 25);
        assert_eq!(valid.target_weight, 1000.5);
        assert_eq!(valid.band.min_percent, -2.0);
        assert!(valid.preserve_wrapping);
        assert_eq!(valid.metadata.date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(valid.metadata.name, None);
        assert_eq!(valid.metadata.lot_number.as_deref(), Some("L-7"));
    }

    #[test]
    fn infers_count_and_total_from_prefilled_weights() {
        let mut sheet = Worksheet::new("Invoice");
        sheet.set_value(at("G8"), CellValue::Number(20.25));
        sheet.set_value(at("G9"), CellValue::Number(19.75));
        sheet.set_value(at("G10"), CellValue::from("20"));
        sheet.set_value(at("C38"), CellValue::from("9 Bags"));

        let valid = ProcessingRequest::default()
            .validate(&sheet, &layout())
            .unwrap();
        assert_eq!(valid.bag_count, 3);
        assert_eq!(valid.target_weight, 60.0);
    }

    #[test]
    fn falls_back_to_the_bag_count_label() {
        let mut sheet = Worksheet::new("Invoice");
        sheet.set_value(at("C38"), CellValue::from("Total: 12 bags"));
        let request = ProcessingRequest {
            target_weight: Some(100.0),
            ..ProcessingRequest::default()
        };
        assert_eq!(request.validate(&sheet, &layout()).unwrap().bag_count, 12);
    }

    #[test]
    fn reports_the_offending_field() {
        let sheet = Worksheet::new("Invoice");
        let cases = [
            (
                ProcessingRequest {
                    bag_count: Some(0),
                    target_weight: Some(1.0),
                    ..ProcessingRequest::default()
                },
                "bag_count",
            ),
            (
                ProcessingRequest {
                    target_weight: Some(1.0),
                    ..ProcessingRequest::default()
                },
                "bag_count",
            ),
            (
                ProcessingRequest {
                    bag_count: Some(3),
                    ..ProcessingRequest::default()
                },
                "target_weight",
            ),
            (
                ProcessingRequest {
                    bag_count: Some(3),
                    target_weight: Some(1.0),
                    min_percent: 1.0,
                    ..ProcessingRequest::default()
                },
                "min_percent",
            ),
            (
                ProcessingRequest {
                    bag_count: Some(3),
                    target_weight: Some(1.0),
                    date: Some("15th of March".into()),
                    ..ProcessingRequest::default()
                },
                "date",
            ),
        ];
        for (request, field) in cases {
            let err = request.validate(&sheet, &layout()).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidRangeError);
            assert_eq!(err.field(), Some(field));
        }
    }

    #[test]
    fn accepts_the_three_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        for text in ["2024-03-15", "03/15/2024", "15-03-2024"] {
            assert_eq!(parse_date(text).unwrap(), expected, "{text}");
        }
    }

    #[test]
    fn reads_bag_counts_from_labels() {
        assert_eq!(bag_count_from_label("25 Bags"), Some(25));
        assert_eq!(bag_count_from_label("1 bag"), Some(1));
        assert_eq!(bag_count_from_label("Bags: many"), None);
    }
}

//! Template descriptors and their resolved, 0-indexed form.
//!
//! Descriptors use the coordinates a person sees in the spreadsheet UI (1-based rows, column
//! letters, A1 anchors). [`BandLayout`] resolves them once per request into [`CellRef`]s that the
//! provisioner can shift as rows are inserted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tally_model::{column_index, CellRef};

use crate::EngineError;

/// Where a template keeps its bag band and metadata anchors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateDescriptor {
    /// Column letters of the weight column (`G`).
    #[serde(default)]
    pub weight_column: Option<String>,
    /// First band row, 1-based.
    pub start_row: u32,
    /// Last band row, 1-based.
    pub total_row: u32,
    #[serde(default)]
    pub bag_id_column: Option<String>,
    #[serde(default)]
    pub totals_cell: Option<String>,
    #[serde(default)]
    pub bag_count_cell: Option<String>,
    #[serde(default)]
    pub date_cell: Option<String>,
    #[serde(default)]
    pub lot_number_cell: Option<String>,
    #[serde(default)]
    pub name_cell: Option<String>,
    #[serde(default)]
    pub address_cell: Option<String>,
    /// Row holding column headers, 1-based. Defaults to the row above the band.
    #[serde(default)]
    pub header_row: Option<u32>,
    /// Extra label name -> anchor cell.
    #[serde(default)]
    pub label_cells: BTreeMap<String, String>,
}

impl TemplateDescriptor {
    fn standard(weight: &str, start_row: u32, total_row: u32, bag_count_cell: &str) -> Self {
        Self {
            weight_column: Some(weight.to_string()),
            start_row,
            total_row,
            bag_id_column: None,
            totals_cell: Some(format!("{weight}{}", total_row + 1)),
            bag_count_cell: Some(bag_count_cell.to_string()),
            date_cell: Some("A4".to_string()),
            lot_number_cell: Some("B4".to_string()),
            name_cell: Some("C3".to_string()),
            address_cell: Some("C4".to_string()),
            header_row: None,
            label_cells: BTreeMap::new(),
        }
    }

    fn with_metadata(mut self, date: &str, lot: &str, name: &str, address: &str) -> Self {
        self.date_cell = Some(date.to_string());
        self.lot_number_cell = Some(lot.to_string());
        self.name_cell = Some(name.to_string());
        self.address_cell = Some(address.to_string());
        self
    }
}

/// Descriptors keyed by template type.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, TemplateDescriptor>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateRegistry {
    pub fn builtin() -> Self {
        let templates = [
            ("default", TemplateDescriptor::standard("G", 8, 37, "C38")),
            ("yarn", TemplateDescriptor::standard("G", 10, 41, "C42")),
            ("custom", TemplateDescriptor::standard("G", 10, 39, "C40")),
            (
                "invoice1",
                TemplateDescriptor::standard("F", 10, 39, "B40").with_metadata("A3", "B3", "C2", "C3"),
            ),
            (
                "invoice2",
                TemplateDescriptor::standard("H", 12, 41, "D42").with_metadata("A5", "B5", "C4", "C5"),
            ),
        ]
        .into_iter()
        .map(|(name, descriptor)| (name.to_string(), descriptor))
        .collect();
        Self { templates }
    }

    /// Built-in templates with `overrides` replacing or adding entries by name.
    pub fn with_overrides(overrides: &BTreeMap<String, TemplateDescriptor>) -> Self {
        let mut registry = Self::builtin();
        for (name, descriptor) in overrides {
            registry.templates.insert(name.clone(), descriptor.clone());
        }
        registry
    }

    pub fn get(&self, template_type: &str) -> Result<&TemplateDescriptor, EngineError> {
        self.templates
            .get(template_type)
            .ok_or_else(|| EngineError::UnknownTemplate(template_type.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.templates.keys().map(String::as_str)
    }
}

/// A descriptor resolved to 0-indexed coordinates for one request.
///
/// The band is `start_row..=last_row`; only its first `active_rows` rows carry bags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BandLayout {
    pub template: String,
    pub start_row: u32,
    pub last_row: u32,
    pub active_rows: u32,
    pub weight_column: Option<u32>,
    pub bag_id_column: Option<u32>,
    pub header_row: Option<u32>,
    pub totals_cell: Option<CellRef>,
    pub bag_count_cell: Option<CellRef>,
    pub date_cell: Option<CellRef>,
    pub lot_number_cell: Option<CellRef>,
    pub name_cell: Option<CellRef>,
    pub address_cell: Option<CellRef>,
    pub label_cells: BTreeMap<String, CellRef>,
}

impl BandLayout {
    pub fn resolve(template: &str, descriptor: &TemplateDescriptor) -> Result<Self, EngineError> {
        let broken = |anchor: &'static str| EngineError::AnchorMissing {
            template: template.to_string(),
            anchor,
        };
        let column = |letters: &Option<String>, anchor: &'static str| {
            letters
                .as_deref()
                .map(|l| column_index(l.trim()).map_err(|_| broken(anchor)))
                .transpose()
        };
        let cell = |a1: &Option<String>, anchor: &'static str| {
            a1.as_deref()
                .map(|a| CellRef::from_a1(a).map_err(|_| broken(anchor)))
                .transpose()
        };

        if descriptor.start_row == 0 {
            return Err(broken("start_row"));
        }
        if descriptor.total_row < descriptor.start_row {
            return Err(broken("total_row"));
        }
        let header_row = match descriptor.header_row {
            Some(0) => return Err(broken("header_row")),
            Some(row) => Some(row - 1),
            None => descriptor.start_row.checked_sub(2),
        };

        let mut label_cells = BTreeMap::new();
        for (name, a1) in &descriptor.label_cells {
            let at = CellRef::from_a1(a1).map_err(|_| broken("label"))?;
            label_cells.insert(name.clone(), at);
        }

        Ok(Self {
            template: template.to_string(),
            start_row: descriptor.start_row - 1,
            last_row: descriptor.total_row - 1,
            active_rows: descriptor.total_row - descriptor.start_row + 1,
            weight_column: column(&descriptor.weight_column, "weight_column")?,
            bag_id_column: column(&descriptor.bag_id_column, "bag_id_column")?,
            header_row,
            totals_cell: cell(&descriptor.totals_cell, "totals_cell")?,
            bag_count_cell: cell(&descriptor.bag_count_cell, "bag_count_cell")?,
            date_cell: cell(&descriptor.date_cell, "date_cell")?,
            lot_number_cell: cell(&descriptor.lot_number_cell, "lot_number_cell")?,
            name_cell: cell(&descriptor.name_cell, "name_cell")?,
            address_cell: cell(&descriptor.address_cell, "address_cell")?,
            label_cells,
        })
    }

    /// Physical rows reserved for bags.
    pub fn available(&self) -> u32 {
        self.last_row - self.start_row + 1
    }

    /// Rows carrying bags, in order.
    pub fn bag_rows(&self) -> impl Iterator<Item = u32> {
        self.start_row..self.start_row + self.active_rows
    }

    /// Re-anchor after `count` rows were inserted before the band row `at`.
    ///
    /// The band start stays put and its end grows; anchors at or below `at` move down.
    pub(crate) fn grow_band(&mut self, at: u32, count: u32) {
        self.last_row += count;
        let shift = |cell: &mut Option<CellRef>| {
            if let Some(c) = cell.as_mut() {
                *c = c.shifted_for_insert(at, count);
            }
        };
        shift(&mut self.totals_cell);
        shift(&mut self.bag_count_cell);
        shift(&mut self.date_cell);
        shift(&mut self.lot_number_cell);
        shift(&mut self.name_cell);
        shift(&mut self.address_cell);
        for cell in self.label_cells.values_mut() {
            *cell = cell.shifted_for_insert(at, count);
        }
        if let Some(row) = self.header_row.as_mut() {
            if *row >= at && *row > self.start_row {
                *row += count;
            }
        }
    }

    /// Metadata anchors by field name, for projections.
    pub fn metadata_anchors(&self) -> Vec<(String, CellRef)> {
        let fixed = [
            ("bag_count", self.bag_count_cell),
            ("date", self.date_cell),
            ("lot_number", self.lot_number_cell),
            ("name", self.name_cell),
            ("address", self.address_cell),
        ];
        fixed
            .into_iter()
            .filter_map(|(name, cell)| cell.map(|c| (name.to_string(), c)))
            .chain(
                self.label_cells
                    .iter()
                    .map(|(name, cell)| (format!("label.{name}"), *cell)),
            )
            .collect()
    }
}

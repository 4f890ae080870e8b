//! XLSX loading and saving for invoice templates.
//!
//! - [`XlsxPackage`]: the OPC zip held in memory as part name -> bytes. Parts the engine never
//!   touches are written back byte-for-byte.
//! - [`XlsxDocument`]: the active worksheet of a package loaded into a
//!   [`tally_model::Document`], plus enough of the original package to write the edited sheet,
//!   shared strings and styles back without disturbing anything else.
//! - [`minimal::WorkbookBuilder`]: in-memory fixture workbooks.

mod encrypted;
mod error;
pub mod minimal;
pub mod openxml;
mod package;
pub mod recalc;
pub mod shared_strings;
pub mod styles;
pub mod worksheet;
pub mod xml;
mod zip_util;

pub use error::XlsxError;
pub use package::{SheetEntry, XlsxPackage};
pub use recalc::RecalcPolicy;
pub use zip_util::{PackageLimits, DEFAULT_MAX_PART_BYTES, DEFAULT_MAX_TOTAL_BYTES};

use tally_model::{Document, StyleTable};

use crate::openxml::{find_related_part, REL_TYPE_SHARED_STRINGS, REL_TYPE_STYLES};
use crate::package::WORKBOOK_PART;
use crate::shared_strings::SharedStrings;
use crate::styles::StylesPart;

pub(crate) const XML_DECLARATION: &str =
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";
pub(crate) const SPREADSHEETML_NS: &str =
    "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

const DEFAULT_STYLES_PART: &str = "xl/styles.xml";

/// A workbook package with its active worksheet loaded for editing.
#[derive(Debug, Clone)]
pub struct XlsxDocument {
    package: XlsxPackage,
    sheet_entry: SheetEntry,
    shared_strings: Option<(String, SharedStrings)>,
    /// Part name of the stylesheet, `None` when the package has none yet.
    styles_part: Option<String>,
    styles: StylesPart,
    recalc_policy: RecalcPolicy,
    pub document: Document,
}

impl XlsxDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::load_with_limits(bytes, PackageLimits::default())
    }

    pub fn load_with_limits(bytes: &[u8], limits: PackageLimits) -> Result<Self, XlsxError> {
        let package = XlsxPackage::from_bytes_limited(bytes, limits)?;
        let sheet_entry = package.active_sheet()?;

        let shared_strings = match find_related_part(&package, WORKBOOK_PART, REL_TYPE_SHARED_STRINGS)? {
            Some(part) => match package.part(&part) {
                Some(xml) => Some((part.clone(), SharedStrings::parse(xml)?)),
                None => {
                    log::warn!("shared strings part {part} is referenced but missing");
                    None
                }
            },
            None => None,
        };

        let styles_part = find_related_part(&package, WORKBOOK_PART, REL_TYPE_STYLES)?
            .filter(|part| package.has_part(part));
        let styles = match styles_part.as_deref().and_then(|p| package.part(p)) {
            Some(xml) => StylesPart::parse(xml)?,
            None => StylesPart::default_part()?,
        };

        let sheet_xml = package
            .part(&sheet_entry.part)
            .ok_or_else(|| XlsxError::MissingPart(sheet_entry.part.clone()))?;
        let sheet = worksheet::read_worksheet(
            &sheet_entry.name,
            sheet_xml,
            shared_strings.as_ref().map(|(_, sst)| sst),
        )?;
        let document = Document::new(sheet, StyleTable::from_loaded(styles.cell_styles()));

        log::debug!(
            "loaded sheet {:?} ({}) with {} styles",
            sheet_entry.name,
            sheet_entry.part,
            document.styles.len()
        );

        Ok(Self {
            package,
            sheet_entry,
            shared_strings,
            styles_part,
            styles,
            recalc_policy: RecalcPolicy::default(),
            document,
        })
    }

    pub fn sheet_entry(&self) -> &SheetEntry {
        &self.sheet_entry
    }

    pub fn package(&self) -> &XlsxPackage {
        &self.package
    }

    /// Policy applied on save when the sheet carries formulas.
    pub fn set_recalc_policy(&mut self, policy: RecalcPolicy) {
        self.recalc_policy = policy;
    }

    /// Write the edited sheet back into the package and return the re-zipped workbook.
    pub fn save(&mut self) -> Result<Vec<u8>, XlsxError> {
        let sheet = &self.document.sheet;

        let original = self
            .package
            .part(&self.sheet_entry.part)
            .ok_or_else(|| XlsxError::MissingPart(self.sheet_entry.part.clone()))?
            .to_vec();
        if let Some((_, sst)) = self.shared_strings.as_mut() {
            sst.reset_references();
        }
        let sheet_xml = worksheet::write_worksheet(
            &original,
            sheet,
            self.shared_strings.as_mut().map(|(_, sst)| sst),
        )?;
        self.package.set_part(&self.sheet_entry.part, sheet_xml);

        if let Some((part, sst)) = &self.shared_strings {
            if sst.is_dirty() {
                let updated = sst.write(self.package.part(part))?;
                self.package.set_part(part, updated);
            }
        }

        if self.document.styles.derived_styles().next().is_some() {
            self.styles.apply_derived(&self.document.styles)?;
            let part = match &self.styles_part {
                Some(part) => part.clone(),
                None => {
                    recalc::register_part(
                        &mut self.package,
                        WORKBOOK_PART,
                        DEFAULT_STYLES_PART,
                        REL_TYPE_STYLES,
                        minimal::CT_STYLES,
                    )?;
                    self.styles_part = Some(DEFAULT_STYLES_PART.to_string());
                    DEFAULT_STYLES_PART.to_string()
                }
            };
            self.package.set_part(&part, self.styles.to_bytes());
        }

        let has_formulas = self
            .document
            .sheet
            .rows()
            .any(|(_, row)| row.cells.values().any(|c| c.formula.is_some()));
        if has_formulas || !self.document.sheet.row_insertions().is_empty() {
            recalc::apply_recalc_policy(&mut self.package, self.recalc_policy)?;
        }

        self.package.to_bytes()
    }
}

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use crate::openxml::{parse_relationships, rels_part_name, resolve_target};
use crate::zip_util::{part_names_equivalent, InflateBudget, PackageLimits};
use crate::XlsxError;

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";

/// A `<sheet>` entry from `xl/workbook.xml` with its worksheet part resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub rel_id: String,
    /// Resolved part name, e.g. `xl/worksheets/sheet1.xml`.
    pub part: String,
}

/// Every part of an OPC package held in memory, keyed by part name.
///
/// Parts we never touch are written back byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_bytes_limited(bytes, PackageLimits::default())
    }

    pub fn from_bytes_limited(bytes: &[u8], limits: PackageLimits) -> Result<Self, XlsxError> {
        if crate::encrypted::is_ole_container(bytes) {
            return Err(crate::encrypted::classify_ole_container(bytes));
        }
        if !bytes.starts_with(b"PK") {
            return Err(XlsxError::NotAWorkbook);
        }

        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut budget = InflateBudget::new(limits);
        let mut parts = BTreeMap::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }
            let name = file.name().to_string();
            let size = file.size();
            let data = budget.read_entry(&mut file, &name, size)?;
            parts.insert(name, data);
        }
        Ok(Self { parts })
    }

    /// Look up a part, tolerating leading slashes, `\` separators and case differences.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.resolve_name(name)
            .and_then(|key| self.parts.get(key))
            .map(Vec::as_slice)
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.resolve_name(name).is_some()
    }

    /// Replace a part, keeping the stored spelling of its name when it already exists.
    pub fn set_part(&mut self, name: &str, bytes: Vec<u8>) {
        let key = self
            .resolve_name(name)
            .map_or_else(|| name.trim_start_matches('/').to_string(), str::to_string);
        self.parts.insert(key, bytes);
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        let key = self.resolve_name(name)?.to_string();
        self.parts.remove(&key)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    fn resolve_name(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.parts.get_key_value(name.trim_start_matches('/')) {
            return Some(key);
        }
        self.parts
            .keys()
            .find(|key| part_names_equivalent(key, name))
            .map(String::as_str)
    }

    /// Re-encode the package as a zip archive.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), XlsxError> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        // `[Content_Types].xml` first, as Office itself writes it.
        let ordered = self
            .parts
            .iter()
            .filter(|(name, _)| name.as_str() == "[Content_Types].xml")
            .chain(
                self.parts
                    .iter()
                    .filter(|(name, _)| name.as_str() != "[Content_Types].xml"),
            );
        for (name, bytes) in ordered {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Sheets listed in the workbook, in tab order.
    pub fn sheets(&self) -> Result<Vec<SheetEntry>, XlsxError> {
        let workbook = self
            .part(WORKBOOK_PART)
            .ok_or_else(|| XlsxError::MissingPart(WORKBOOK_PART.to_string()))?;
        let workbook = std::str::from_utf8(workbook)?;
        let doc = roxmltree::Document::parse(workbook)?;

        let rels_name = rels_part_name(WORKBOOK_PART);
        let rels = match self.part(&rels_name) {
            Some(bytes) => parse_relationships(bytes)?,
            None => return Err(XlsxError::MissingPart(rels_name)),
        };

        let mut out = Vec::new();
        for sheet in doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "sheet")
        {
            let name = sheet
                .attribute("name")
                .ok_or(XlsxError::MissingAttr("name"))?;
            let rel_id = sheet
                .attributes()
                .find(|a| a.name() == "id")
                .map(|a| a.value())
                .ok_or(XlsxError::MissingAttr("r:id"))?;
            let rel = rels.iter().find(|r| r.id == rel_id).ok_or_else(|| {
                XlsxError::Invalid(format!("missing relationship {rel_id} for sheet {name}"))
            })?;
            out.push(SheetEntry {
                name: name.to_string(),
                rel_id: rel_id.to_string(),
                part: resolve_target(WORKBOOK_PART, &rel.target),
            });
        }
        Ok(out)
    }

    /// The sheet a spreadsheet application opens on (`workbookView/@activeTab`, default first).
    pub fn active_sheet(&self) -> Result<SheetEntry, XlsxError> {
        let mut sheets = self.sheets()?;
        if sheets.is_empty() {
            return Err(XlsxError::Invalid("workbook has no sheets".to_string()));
        }
        let active = self.active_tab()?.min(sheets.len() - 1);
        Ok(sheets.swap_remove(active))
    }

    fn active_tab(&self) -> Result<usize, XlsxError> {
        let Some(workbook) = self.part(WORKBOOK_PART) else {
            return Ok(0);
        };
        let doc = roxmltree::Document::parse(std::str::from_utf8(workbook)?)?;
        Ok(doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "workbookView")
            .and_then(|n| n.attribute("activeTab"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0))
    }
}

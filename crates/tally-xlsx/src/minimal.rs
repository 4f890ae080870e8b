//! Small in-memory workbooks for tests and fixtures.
//!
//! The builder writes its worksheets through the same serializer the loader round-trips with, so
//! fixtures exercise real `sheetData`, shared strings and merged regions.

use tally_model::{CellRef, CellValue, Formula, Range, Worksheet};

use crate::openxml::{REL_TYPE_CALC_CHAIN, REL_TYPE_SHARED_STRINGS, REL_TYPE_STYLES};
use crate::shared_strings::SharedStrings;
use crate::worksheet::write_worksheet;
use crate::{XlsxError, XlsxPackage, SPREADSHEETML_NS, XML_DECLARATION};

/// `cellXfs` index of the default style in [`FIXTURE_STYLES_XML`].
pub const XF_DEFAULT: u32 = 0;
/// `#,##0.00`, Calibri 11.
pub const XF_NUMBER: u32 = 1;
/// Bold text.
pub const XF_BOLD: u32 = 2;
/// `yyyy-mm-dd` date.
pub const XF_DATE: u32 = 3;
/// General format with a thin border.
pub const XF_BORDERED: u32 = 4;

/// Stylesheet used by fixtures unless one is supplied.
pub const FIXTURE_STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy-mm-dd"/></numFmts><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="2"><border><left/><right/><top/><bottom/><diagonal/></border><border><left style="thin"/><right style="thin"/><top style="thin"/><bottom style="thin"/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="5"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="4" fontId="0" fillId="0" borderId="1" xfId="0" applyNumberFormat="1" applyBorder="1"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="0" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

const CT_WORKBOOK: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const CT_WORKSHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub(crate) const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
const CT_SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
const CT_CALC_CHAIN: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml";
const REL_TYPE_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const REL_TYPE_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

#[derive(Debug)]
struct FixtureSheet {
    sheet: Worksheet,
    /// Raw worksheet children written after `sheetData` (`conditionalFormatting`, `pageMargins`).
    tail: String,
}

/// Builder for a workbook package. Cell calls apply to the most recently added sheet.
#[derive(Debug)]
pub struct WorkbookBuilder {
    sheets: Vec<FixtureSheet>,
    active: usize,
    shared_strings: bool,
    styles_xml: Option<String>,
    calc_chain: bool,
    error: Option<XlsxError>,
}

impl WorkbookBuilder {
    pub fn new(sheet_name: &str) -> Self {
        Self {
            sheets: vec![FixtureSheet {
                sheet: Worksheet::new(sheet_name),
                tail: String::new(),
            }],
            active: 0,
            shared_strings: true,
            styles_xml: Some(FIXTURE_STYLES_XML.to_string()),
            calc_chain: false,
            error: None,
        }
    }

    pub fn add_sheet(mut self, name: &str) -> Self {
        self.sheets.push(FixtureSheet {
            sheet: Worksheet::new(name),
            tail: String::new(),
        });
        self
    }

    /// Tab opened by default (`workbookView/@activeTab`).
    pub fn active_tab(mut self, index: usize) -> Self {
        self.active = index;
        self
    }

    pub fn value(mut self, a1: &str, value: impl Into<CellValue>) -> Self {
        if let Some(at) = self.cell_ref(a1) {
            self.current().set_value(at, value.into());
        }
        self
    }

    /// A formula with its cached value.
    pub fn formula(mut self, a1: &str, text: &str, cached: impl Into<CellValue>) -> Self {
        if let Some(at) = self.cell_ref(a1) {
            let cell = self.current().cell_mut(at);
            cell.value = cached.into();
            cell.formula = Some(Formula::new(text));
        }
        self
    }

    /// Apply `cellXfs` index `xf` to every cell of `range` (`A1` or `A1:B2`).
    pub fn style(mut self, range: &str, xf: u32) -> Self {
        if let Some(range) = self.range(range) {
            let sheet = self.current();
            for row in range.start.row..=range.end.row {
                for col in range.start.col..=range.end.col {
                    sheet.cell_mut(CellRef::new(row, col)).style_id = xf;
                }
            }
        }
        self
    }

    pub fn merge(mut self, range: &str) -> Self {
        if let Some(range) = self.range(range) {
            if let Err(err) = self.current().add_merge(range) {
                self.error.get_or_insert(XlsxError::Invalid(err.to_string()));
            }
        }
        self
    }

    /// Height in points of the 1-based `row`.
    pub fn row_height(mut self, row: u32, height: f64) -> Self {
        let props = &mut self.current().row_mut(row.saturating_sub(1)).props;
        props.height = Some(height);
        props.custom_height = true;
        self
    }

    /// Raw XML placed after the sheet data, e.g. `<pageMargins .../>`.
    pub fn sheet_xml(mut self, xml: &str) -> Self {
        if let Some(sheet) = self.sheets.last_mut() {
            sheet.tail.push_str(xml);
        }
        self
    }

    /// Store text as inline strings and omit `xl/sharedStrings.xml`.
    pub fn inline_strings(mut self) -> Self {
        self.shared_strings = false;
        self
    }

    pub fn styles_xml(mut self, xml: &str) -> Self {
        self.styles_xml = Some(xml.to_string());
        self
    }

    /// Omit `xl/styles.xml`.
    pub fn without_styles(mut self) -> Self {
        self.styles_xml = None;
        self
    }

    pub fn with_calc_chain(mut self) -> Self {
        self.calc_chain = true;
        self
    }

    pub fn build(self) -> Result<Vec<u8>, XlsxError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut pkg = XlsxPackage::default();
        let mut sst = self.shared_strings.then(SharedStrings::default);

        let mut types = String::from(XML_DECLARATION);
        types.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>"#);
        push_override(&mut types, "xl/workbook.xml", CT_WORKBOOK);

        let mut rels = String::from(XML_DECLARATION);
        rels.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);

        let mut workbook = String::from(XML_DECLARATION);
        workbook.push_str(&format!(
            r#"<workbook xmlns="{SPREADSHEETML_NS}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><bookViews><workbookView activeTab="{}"/></bookViews><sheets>"#,
            self.active
        ));

        for (i, fixture) in self.sheets.iter().enumerate() {
            let n = i + 1;
            let part = format!("xl/worksheets/sheet{n}.xml");
            workbook.push_str(&format!(
                r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
                quick_xml::escape::escape(fixture.sheet.name.as_str())
            ));
            push_relationship(&mut rels, n, REL_TYPE_WORKSHEET, &format!("worksheets/sheet{n}.xml"));
            push_override(&mut types, &part, CT_WORKSHEET);

            let shell = format!(
                r#"{XML_DECLARATION}<worksheet xmlns="{SPREADSHEETML_NS}"><dimension ref="A1"/><sheetData/>{}</worksheet>"#,
                fixture.tail
            );
            let xml = write_worksheet(shell.as_bytes(), &fixture.sheet, sst.as_mut())?;
            pkg.set_part(&part, xml);
        }
        workbook.push_str("</sheets></workbook>");

        let mut next_rel = self.sheets.len() + 1;
        if let Some(styles) = &self.styles_xml {
            push_relationship(&mut rels, next_rel, REL_TYPE_STYLES, "styles.xml");
            push_override(&mut types, "xl/styles.xml", CT_STYLES);
            pkg.set_part("xl/styles.xml", styles.as_bytes().to_vec());
            next_rel += 1;
        }
        if let Some(sst) = &sst {
            push_relationship(&mut rels, next_rel, REL_TYPE_SHARED_STRINGS, "sharedStrings.xml");
            push_override(&mut types, "xl/sharedStrings.xml", CT_SHARED_STRINGS);
            pkg.set_part("xl/sharedStrings.xml", sst.write(None)?);
            next_rel += 1;
        }
        if self.calc_chain {
            push_relationship(&mut rels, next_rel, REL_TYPE_CALC_CHAIN, "calcChain.xml");
            push_override(&mut types, "xl/calcChain.xml", CT_CALC_CHAIN);
            pkg.set_part(
                "xl/calcChain.xml",
                format!(r#"{XML_DECLARATION}<calcChain xmlns="{SPREADSHEETML_NS}"><c r="A1" i="1"/></calcChain>"#)
                    .into_bytes(),
            );
        }
        rels.push_str("</Relationships>");
        types.push_str("</Types>");

        pkg.set_part("[Content_Types].xml", types.into_bytes());
        pkg.set_part(
            "_rels/.rels",
            format!(
                r#"{XML_DECLARATION}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_TYPE_OFFICE_DOCUMENT}" Target="xl/workbook.xml"/></Relationships>"#
            )
            .into_bytes(),
        );
        pkg.set_part("xl/workbook.xml", workbook.into_bytes());
        pkg.set_part("xl/_rels/workbook.xml.rels", rels.into_bytes());
        pkg.to_bytes()
    }

    fn current(&mut self) -> &mut Worksheet {
        let last = self.sheets.len() - 1;
        &mut self.sheets[last].sheet
    }

    fn cell_ref(&mut self, a1: &str) -> Option<CellRef> {
        match CellRef::from_a1(a1) {
            Ok(at) => Some(at),
            Err(err) => {
                self.error.get_or_insert(XlsxError::Invalid(err.to_string()));
                None
            }
        }
    }

    fn range(&mut self, a1: &str) -> Option<Range> {
        match Range::from_a1(a1) {
            Ok(range) => Some(range),
            Err(err) => {
                self.error.get_or_insert(XlsxError::Invalid(err.to_string()));
                None
            }
        }
    }
}

fn push_relationship(out: &mut String, n: usize, type_uri: &str, target: &str) {
    out.push_str(&format!(
        r#"<Relationship Id="rId{n}" Type="{type_uri}" Target="{target}"/>"#
    ));
}

fn push_override(out: &mut String, part: &str, content_type: &str) {
    out.push_str(&format!(
        r#"<Override PartName="/{part}" ContentType="{content_type}"/>"#
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worksheet::read_worksheet;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_a_loadable_package() {
        let bytes = WorkbookBuilder::new("Invoice")
            .value("A1", "Invoice")
            .value("G8", 12.5)
            .style("G8:G9", XF_NUMBER)
            .merge("A10:F10")
            .build()
            .unwrap();
        let pkg = XlsxPackage::from_bytes(&bytes).unwrap();
        let sst = SharedStrings::parse(pkg.part("xl/sharedStrings.xml").unwrap()).unwrap();
        let sheet = read_worksheet(
            "Invoice",
            pkg.part("xl/worksheets/sheet1.xml").unwrap(),
            Some(&sst),
        )
        .unwrap();
        assert_eq!(sheet.value_at(CellRef::new(0, 0)), &CellValue::Text("Invoice".into()));
        assert_eq!(sheet.cell(CellRef::new(8, 6)).unwrap().style_id, XF_NUMBER);
        assert_eq!(sheet.merges().len(), 1);
    }

    #[test]
    fn reports_bad_references_at_build() {
        let err = WorkbookBuilder::new("Invoice").value("not-a-cell", 1.0).build();
        assert!(matches!(err, Err(XlsxError::Invalid(_))));
    }
}

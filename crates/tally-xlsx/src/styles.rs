//! `xl/styles.xml`: reading `cellXfs` into model styles and appending derived styles.

use std::collections::BTreeMap;

use tally_model::{
    Alignment, Border, BorderStyle, Color, Fill, Font, HorizontalAlignment, Style, StyleTable,
};

use crate::xml::{XmlDocument, XmlElement, XmlNode};
use crate::XlsxError;

/// Minimal stylesheet used when a package has no styles part.
pub(crate) const DEFAULT_STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

/// First id available to workbook-defined number formats.
const FIRST_CUSTOM_NUM_FMT_ID: u32 = 164;

/// Required order of `styleSheet` children.
const STYLESHEET_ORDER: &[&str] = &[
    "numFmts",
    "fonts",
    "fills",
    "borders",
    "cellStyleXfs",
    "cellXfs",
    "cellStyles",
    "dxfs",
    "tableStyles",
    "colors",
    "extLst",
];

/// Format code of a built-in number format id.
pub fn builtin_num_fmt(id: u32) -> Option<&'static str> {
    Some(match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "m/d/yyyy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yyyy h:mm",
        37 => "#,##0 ;(#,##0)",
        38 => "#,##0 ;[Red](#,##0)",
        39 => "#,##0.00;(#,##0.00)",
        40 => "#,##0.00;[Red](#,##0.00)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mmss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    })
}

/// Parsed stylesheet. The DOM is kept so derived styles can be appended on save.
#[derive(Debug, Clone)]
pub struct StylesPart {
    doc: XmlDocument,
    num_fmts: BTreeMap<u32, String>,
}

impl StylesPart {
    pub fn parse(xml: &[u8]) -> Result<Self, XlsxError> {
        let doc = XmlDocument::parse(xml)?;
        let mut num_fmts = BTreeMap::new();
        if let Some(fmts) = doc.root.child("numFmts") {
            for fmt in fmts.children_by_local("numFmt") {
                let id = fmt
                    .attr("numFmtId")
                    .and_then(|v| v.trim().parse().ok())
                    .ok_or(XlsxError::MissingAttr("numFmtId"))?;
                let code = fmt.attr("formatCode").unwrap_or_default().to_string();
                num_fmts.insert(id, code);
            }
        }
        Ok(Self { doc, num_fmts })
    }

    pub fn default_part() -> Result<Self, XlsxError> {
        Self::parse(DEFAULT_STYLES_XML.as_bytes())
    }

    /// One model style per `cellXfs/xf`, in order.
    pub fn cell_styles(&self) -> Vec<Style> {
        let root = &self.doc.root;
        let fonts: Vec<&XmlElement> = root
            .child("fonts")
            .map(|f| f.children_by_local("font").collect())
            .unwrap_or_default();
        let fills: Vec<&XmlElement> = root
            .child("fills")
            .map(|f| f.children_by_local("fill").collect())
            .unwrap_or_default();
        let borders: Vec<&XmlElement> = root
            .child("borders")
            .map(|b| b.children_by_local("border").collect())
            .unwrap_or_default();

        let Some(xfs) = root.child("cellXfs") else {
            return Vec::new();
        };
        xfs.children_by_local("xf")
            .map(|xf| {
                let index = |attr: &str| -> usize {
                    xf.attr(attr)
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(0)
                };
                let num_fmt_id = index("numFmtId") as u32;
                Style {
                    font: fonts.get(index("fontId")).map(|f| parse_font(f)).unwrap_or_default(),
                    fill: fills.get(index("fillId")).map(|f| parse_fill(f)).unwrap_or_default(),
                    border: borders
                        .get(index("borderId"))
                        .map(|b| parse_border(b))
                        .unwrap_or_default(),
                    alignment: xf.child("alignment").map(parse_alignment).unwrap_or_default(),
                    number_format: self.format_code(num_fmt_id),
                }
            })
            .collect()
    }

    fn format_code(&self, id: u32) -> Option<String> {
        if id == 0 {
            return None;
        }
        self.num_fmts
            .get(&id)
            .cloned()
            .or_else(|| builtin_num_fmt(id).map(str::to_string))
    }

    fn num_fmt_id_for(&mut self, code: Option<&str>) -> u32 {
        let Some(code) = code else {
            return 0;
        };
        if let Some((id, _)) = self.num_fmts.iter().find(|(_, c)| c.as_str() == code) {
            return *id;
        }
        if let Some(id) = (0..=49).find(|id| builtin_num_fmt(*id) == Some(code)) {
            return id;
        }
        let id = self
            .num_fmts
            .keys()
            .next_back()
            .map_or(FIRST_CUSTOM_NUM_FMT_ID, |max| (max + 1).max(FIRST_CUSTOM_NUM_FMT_ID));
        let fmts = ensure_child(&mut self.doc.root, "numFmts");
        let mut el = fmts.sibling_named("numFmt");
        el.set_attr("numFmtId", id.to_string());
        el.set_attr("formatCode", code);
        fmts.push_element(el);
        refresh_count(fmts, "numFmt");
        self.num_fmts.insert(id, code.to_string());
        id
    }

    /// Append an `xf` for every derived style in `table`, cloned from its base `xf`.
    ///
    /// Derived styles are appended in id order, so each lands at the `cellXfs` index equal to its
    /// model id. Only the font name and size, the number format and the alignment are patched.
    pub fn apply_derived(&mut self, table: &StyleTable) -> Result<(), XlsxError> {
        let mut existing = self
            .doc
            .root
            .child("cellXfs")
            .map_or(0, |x| x.children_by_local("xf").count());
        if existing == 0 {
            // The model always has a style 0; give it an xf so derived ids stay aligned.
            let xfs = ensure_child(&mut self.doc.root, "cellXfs");
            let mut xf = xfs.sibling_named("xf");
            for attr in ["numFmtId", "fontId", "fillId", "borderId"] {
                xf.set_attr(attr, "0");
            }
            xfs.push_element(xf);
            refresh_count(xfs, "xf");
            existing = 1;
        }
        let loaded = self.cell_styles();

        for (id, base, style) in table.derived_styles() {
            if (id as usize) < existing {
                continue;
            }
            if id as usize != existing + self.appended_count(existing) {
                return Err(XlsxError::Invalid(format!(
                    "derived style {id} is out of order in cellXfs"
                )));
            }
            let base_style = loaded.get(base as usize).cloned().unwrap_or_default();
            let mut xf = self
                .doc
                .root
                .child("cellXfs")
                .and_then(|x| x.children_by_local("xf").nth(base as usize))
                .cloned()
                .ok_or_else(|| XlsxError::Invalid(format!("missing base xf {base}")))?;

            if style.font != base_style.font {
                let font_id = self.push_font(&xf, &style.font)?;
                xf.set_attr("fontId", font_id.to_string());
                xf.set_attr("applyFont", "1");
            }
            if style.number_format != base_style.number_format {
                let fmt_id = self.num_fmt_id_for(style.number_format.as_deref());
                xf.set_attr("numFmtId", fmt_id.to_string());
                xf.set_attr("applyNumberFormat", "1");
            }
            if style.alignment != base_style.alignment {
                patch_alignment(&mut xf, &style.alignment);
                xf.set_attr("applyAlignment", "1");
            }
            if style.fill != base_style.fill || style.border != base_style.border {
                log::debug!("derived style {id}: fill and border changes are not written");
            }

            let xfs = ensure_child(&mut self.doc.root, "cellXfs");
            xfs.push_element(xf);
            refresh_count(xfs, "xf");
        }
        Ok(())
    }

    fn appended_count(&self, existing: usize) -> usize {
        self.doc
            .root
            .child("cellXfs")
            .map_or(0, |x| x.children_by_local("xf").count())
            .saturating_sub(existing)
    }

    fn push_font(&mut self, xf: &XmlElement, font: &Font) -> Result<usize, XlsxError> {
        let base_id: usize = xf
            .attr("fontId")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        let fonts = ensure_child(&mut self.doc.root, "fonts");
        let mut el = fonts
            .children_by_local("font")
            .nth(base_id)
            .cloned()
            .unwrap_or_else(|| fonts.sibling_named("font"));

        if let Some(size) = font.size_pt() {
            set_val_child(&mut el, "sz", &format_points(size));
        }
        if let Some(name) = &font.name {
            set_val_child(&mut el, "name", name);
        }
        fonts.push_element(el);
        refresh_count(fonts, "font");
        Ok(fonts.children_by_local("font").count() - 1)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.doc.to_bytes()
    }
}

fn parse_font(el: &XmlElement) -> Font {
    let flag = |local: &str| {
        el.child(local)
            .is_some_and(|c| !matches!(c.attr("val"), Some("0" | "false")))
    };
    Font {
        name: el.child("name").and_then(|n| n.attr("val")).map(str::to_string),
        size_100pt: el
            .child("sz")
            .and_then(|s| s.attr("val"))
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(Font::size_from_pt),
        bold: flag("b"),
        italic: flag("i"),
        color: el
            .child("color")
            .and_then(|c| c.attr("rgb"))
            .and_then(Color::from_hex),
    }
}

fn parse_fill(el: &XmlElement) -> Fill {
    let Some(pattern) = el.child("patternFill") else {
        return Fill::default();
    };
    Fill {
        pattern: pattern
            .attr("patternType")
            .filter(|p| *p != "none")
            .map(str::to_string),
        foreground: pattern
            .child("fgColor")
            .and_then(|c| c.attr("rgb"))
            .and_then(Color::from_hex),
    }
}

fn parse_border(el: &XmlElement) -> Border {
    let side = |local: &str| {
        el.child(local)
            .and_then(|s| s.attr("style"))
            .map(BorderStyle::from_ooxml)
            .unwrap_or_default()
    };
    Border {
        left: side("left"),
        right: side("right"),
        top: side("top"),
        bottom: side("bottom"),
    }
}

fn parse_alignment(el: &XmlElement) -> Alignment {
    Alignment {
        horizontal: el.attr("horizontal").and_then(HorizontalAlignment::from_ooxml),
        wrap_text: matches!(el.attr("wrapText"), Some("1" | "true")),
    }
}

fn patch_alignment(xf: &mut XmlElement, alignment: &Alignment) {
    if xf.child("alignment").is_none() {
        // `alignment` precedes `protection` and `extLst`.
        let el = xf.sibling_named("alignment");
        xf.children.insert(0, XmlNode::Element(el));
    }
    let Some(el) = xf.child_mut("alignment") else {
        return;
    };
    if alignment.wrap_text {
        el.set_attr("wrapText", "1");
    } else {
        el.remove_attr("wrapText");
    }
    match alignment.horizontal {
        Some(h) => el.set_attr("horizontal", horizontal_to_ooxml(h)),
        None => el.remove_attr("horizontal"),
    }
}

fn horizontal_to_ooxml(h: HorizontalAlignment) -> &'static str {
    match h {
        HorizontalAlignment::General => "general",
        HorizontalAlignment::Left => "left",
        HorizontalAlignment::Center => "center",
        HorizontalAlignment::Right => "right",
        HorizontalAlignment::Fill => "fill",
        HorizontalAlignment::Justify => "justify",
    }
}

fn set_val_child(el: &mut XmlElement, local: &str, val: &str) {
    match el.child_mut(local) {
        Some(child) => child.set_attr("val", val),
        None => {
            let mut child = el.sibling_named(local);
            child.set_attr("val", val);
            el.push_element(child);
        }
    }
}

fn format_points(pt: f64) -> String {
    if pt.fract() == 0.0 {
        format!("{}", pt as i64)
    } else {
        format!("{pt}")
    }
}

fn refresh_count(el: &mut XmlElement, item: &str) {
    let count = el.children_by_local(item).count();
    el.set_attr("count", count.to_string());
}

/// The `styleSheet` child named `local`, inserted in schema order when missing.
fn ensure_child<'a>(root: &'a mut XmlElement, local: &str) -> &'a mut XmlElement {
    if root.child(local).is_none() {
        let rank = |name: &str| STYLESHEET_ORDER.iter().position(|n| *n == name);
        let own = rank(local).unwrap_or(STYLESHEET_ORDER.len());
        let at = root
            .children
            .iter()
            .position(|c| match c {
                XmlNode::Element(e) => rank(e.local()).is_some_and(|r| r > own),
                _ => false,
            })
            .unwrap_or(root.children.len());
        let el = root.sibling_named(local);
        root.children.insert(at, XmlNode::Element(el));
    }
    let idx = root
        .children
        .iter()
        .position(|c| matches!(c, XmlNode::Element(e) if e.local() == local))
        .unwrap_or_default();
    match &mut root.children[idx] {
        XmlNode::Element(e) => e,
        _ => unreachable!("position matched an element"),
    }
}

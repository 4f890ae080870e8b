//! Worksheet part: reading `sheetData`/`mergeCells` into the model and writing them back.
//!
//! Writing streams the original part and regenerates only `dimension`, `sheetData` and
//! `mergeCells`. Range attributes of other sections are re-anchored for recorded row insertions.

use std::io::Cursor;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tally_model::formula_rewrite::{shift_rows_in_formula, shift_rows_in_ref, shift_rows_in_sqref};
use tally_model::{
    Cell, CellRef, CellValue, Formula, Range, RowInsertion, RowProperties, SharedFormula,
    Worksheet,
};

use crate::openxml::local_name;
use crate::shared_strings::SharedStrings;
use crate::XlsxError;

/// Worksheet children that must follow `mergeCells`.
const AFTER_MERGE_CELLS: &[&[u8]] = &[
    b"phoneticPr",
    b"conditionalFormatting",
    b"dataValidations",
    b"hyperlinks",
    b"printOptions",
    b"pageMargins",
    b"pageSetup",
    b"headerFooter",
    b"rowBreaks",
    b"colBreaks",
    b"customProperties",
    b"cellWatches",
    b"ignoredErrors",
    b"smartTags",
    b"drawing",
    b"legacyDrawing",
    b"legacyDrawingHF",
    b"drawingHF",
    b"picture",
    b"oleObjects",
    b"controls",
    b"webPublishItems",
    b"tableParts",
    b"extLst",
];

pub fn read_worksheet(
    name: &str,
    xml: &[u8],
    shared_strings: Option<&SharedStrings>,
) -> Result<Worksheet, XlsxError> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut sheet = Worksheet::new(name);

    let mut current_row: Option<u32> = None;
    let mut next_row = 0u32;
    let mut next_col = 0u32;
    let mut cell: Option<PendingCell> = None;
    let mut text_target = TextTarget::None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                let (row, props) = parse_row(&e, next_row)?;
                next_row = row + 1;
                next_col = 0;
                sheet.row_mut(row).props = props;
                current_row = Some(row);
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                let row = current_row.unwrap_or(next_row);
                let pending = PendingCell::parse(&e, row, next_col)?;
                next_col = pending.at.col + 1;
                cell = Some(pending);
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let row = current_row.unwrap_or(next_row);
                let pending = PendingCell::parse(&e, row, next_col)?;
                next_col = pending.at.col + 1;
                pending.finish(&mut sheet, shared_strings)?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"c" => {
                if let Some(pending) = cell.take() {
                    pending.finish(&mut sheet, shared_strings)?;
                }
            }
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"f" => {
                if let Some(pending) = cell.as_mut() {
                    pending.formula = Some(parse_formula_attrs(&e)?);
                    text_target = TextTarget::Formula;
                }
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"v" => {
                if cell.is_some() {
                    text_target = TextTarget::Value;
                }
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"t" => {
                if cell.is_some() {
                    text_target = TextTarget::Inline;
                }
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"rPh" => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e)
                if matches!(local_name(e.name().as_ref()), b"f" | b"v" | b"t") =>
            {
                text_target = TextTarget::None;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                current_row = None;
            }
            Event::Text(t) => {
                if let Some(pending) = cell.as_mut() {
                    pending.push_text(text_target, &t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let Some(pending) = cell.as_mut() {
                    pending.push_text(text_target, std::str::from_utf8(t.as_ref())?);
                }
            }
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()) == b"mergeCell" =>
            {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"ref" {
                        let value = attr.unescape_value()?;
                        match Range::from_a1(&value) {
                            Ok(range) => {
                                if let Err(err) = sheet.add_merge(range) {
                                    log::warn!("skipping merged range {value}: {err}");
                                }
                            }
                            Err(err) => log::warn!("skipping merged range {value}: {err}"),
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheet)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TextTarget {
    None,
    Formula,
    Value,
    Inline,
}

struct PendingCell {
    at: CellRef,
    style_id: u32,
    kind: Option<String>,
    formula: Option<Formula>,
    value_text: String,
    inline_text: String,
    has_value: bool,
}

impl PendingCell {
    fn parse(e: &BytesStart<'_>, row: u32, default_col: u32) -> Result<Self, XlsxError> {
        let mut at = CellRef::new(row, default_col);
        let mut style_id = 0;
        let mut kind = None;
        for attr in e.attributes() {
            let attr = attr?;
            let value = attr.unescape_value()?;
            match attr.key.as_ref() {
                b"r" => {
                    at = CellRef::from_a1(&value)
                        .map_err(|err| XlsxError::Invalid(format!("cell reference: {err}")))?;
                }
                b"s" => style_id = value.trim().parse().unwrap_or(0),
                b"t" => kind = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(Self {
            at,
            style_id,
            kind,
            formula: None,
            value_text: String::new(),
            inline_text: String::new(),
            has_value: false,
        })
    }

    fn push_text(&mut self, target: TextTarget, text: &str) {
        match target {
            TextTarget::Formula => {
                if let Some(f) = self.formula.as_mut() {
                    f.text.push_str(text);
                }
            }
            TextTarget::Value => {
                self.value_text.push_str(text);
                self.has_value = true;
            }
            TextTarget::Inline => {
                self.inline_text.push_str(text);
                self.has_value = true;
            }
            TextTarget::None => {}
        }
    }

    fn finish(
        self,
        sheet: &mut Worksheet,
        shared_strings: Option<&SharedStrings>,
    ) -> Result<(), XlsxError> {
        let raw = self.value_text.trim();
        let value = match self.kind.as_deref() {
            _ if !self.has_value => CellValue::Empty,
            Some("s") => {
                let idx: u32 = raw
                    .parse()
                    .map_err(|_| XlsxError::Invalid(format!("shared string index `{raw}`")))?;
                let text = shared_strings.and_then(|sst| sst.get(idx)).ok_or_else(|| {
                    XlsxError::Invalid(format!("shared string {idx} out of range at {}", self.at))
                })?;
                CellValue::Text(text.to_string())
            }
            Some("inlineStr") => CellValue::Text(self.inline_text),
            Some("str") => CellValue::Text(self.value_text),
            Some("b") => CellValue::Boolean(raw == "1" || raw.eq_ignore_ascii_case("true")),
            Some("e") => CellValue::Error(raw.to_string()),
            _ => match raw.parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(raw.to_string()),
            },
        };
        let formula = self.formula.map(|mut f| {
            f.text = f.text.strip_prefix('=').map(str::to_string).unwrap_or(f.text);
            f
        });
        *sheet.cell_mut(self.at) = Cell {
            value,
            formula,
            style_id: self.style_id,
        };
        Ok(())
    }
}

fn parse_row(e: &BytesStart<'_>, default_row: u32) -> Result<(u32, RowProperties), XlsxError> {
    let mut row = default_row;
    let mut props = RowProperties::default();
    let mut custom_format = false;
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"r" => {
                row = value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .and_then(|r| r.checked_sub(1))
                    .ok_or_else(|| XlsxError::Invalid(format!("row number `{value}`")))?;
            }
            b"ht" => props.height = value.trim().parse().ok(),
            b"customHeight" => props.custom_height = is_true(&value),
            b"hidden" => props.hidden = is_true(&value),
            b"s" => props.style_id = value.trim().parse().ok(),
            b"customFormat" => custom_format = is_true(&value),
            key => props.extra.push((
                std::str::from_utf8(key)?.to_string(),
                value.into_owned(),
            )),
        }
    }
    if !custom_format {
        props.style_id = None;
    }
    Ok((row, props))
}

fn parse_formula_attrs(e: &BytesStart<'_>) -> Result<Formula, XlsxError> {
    let mut formula = Formula::new("");
    let (mut kind, mut si, mut range) = (None, None, None);
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"t" => kind = Some(value.into_owned()),
            b"si" => si = value.trim().parse::<u32>().ok(),
            b"ref" => range = Range::from_a1(&value).ok(),
            _ => {}
        }
    }
    match kind.as_deref() {
        Some("shared") => {
            formula.shared = si.map(|index| SharedFormula { index, range });
        }
        Some("array") => formula.array_range = range,
        _ => {}
    }
    Ok(formula)
}

fn is_true(value: &str) -> bool {
    matches!(value.trim(), "1" | "true")
}

/// Rewrite a worksheet part from the model.
///
/// Text values are stored in `shared_strings` when the workbook has a table, and inline otherwise.
pub fn write_worksheet(
    original: &[u8],
    sheet: &Worksheet,
    mut shared_strings: Option<&mut SharedStrings>,
) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(Cursor::new(original));
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + 1024));
    let mut buf = Vec::new();

    let insertions = sheet.row_insertions();
    let mut prefix = String::new();
    let mut depth = 0usize;
    let mut wrote_sheet_data = false;
    let mut wrote_merges = false;
    let mut in_row_breaks = false;
    let mut in_formula_text = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) if depth == 0 => {
                prefix = prefix_of(e.name().as_ref())?;
                let is_start = matches!(event, Event::Start(_));
                if is_start {
                    depth += 1;
                    writer.write_event(Event::Start(e.to_owned()))?;
                } else {
                    // A self-closing root has no sheetData to preserve.
                    writer.write_event(Event::Start(e.to_owned()))?;
                    write_sheet_data(writer.get_mut(), &prefix, sheet, &mut shared_strings);
                    write_merge_cells(writer.get_mut(), &prefix, sheet);
                    writer.write_event(Event::End(e.to_end().into_owned()))?;
                }
            }
            Event::Start(ref e) | Event::Empty(ref e) if depth == 1 => {
                let local = local_name(e.name().as_ref()).to_vec();
                let is_start = matches!(event, Event::Start(_));

                if !wrote_merges && AFTER_MERGE_CELLS.contains(&local.as_slice()) {
                    if !wrote_sheet_data {
                        write_sheet_data(writer.get_mut(), &prefix, sheet, &mut shared_strings);
                        wrote_sheet_data = true;
                    }
                    write_merge_cells(writer.get_mut(), &prefix, sheet);
                    wrote_merges = true;
                }

                match local.as_slice() {
                    b"sheetData" => {
                        if is_start {
                            reader.read_to_end_into(e.name(), &mut Vec::new())?;
                        }
                        write_sheet_data(writer.get_mut(), &prefix, sheet, &mut shared_strings);
                        wrote_sheet_data = true;
                        buf.clear();
                        continue;
                    }
                    b"mergeCells" => {
                        if is_start {
                            reader.read_to_end_into(e.name(), &mut Vec::new())?;
                        }
                        if !wrote_merges {
                            write_merge_cells(writer.get_mut(), &prefix, sheet);
                            wrote_merges = true;
                        }
                        buf.clear();
                        continue;
                    }
                    b"dimension" => {
                        let mut el = BytesStart::new(std::str::from_utf8(e.name().as_ref())?.to_string());
                        let used = sheet
                            .used_range()
                            .map_or_else(|| "A1".to_string(), |r| r.to_string());
                        el.push_attribute(("ref", used.as_str()));
                        if is_start {
                            reader.read_to_end_into(e.name(), &mut Vec::new())?;
                        }
                        writer.write_event(Event::Empty(el))?;
                        buf.clear();
                        continue;
                    }
                    _ => {}
                }

                let shifted = shift_range_attrs(e, &local, false, insertions)?;
                if is_start {
                    depth += 1;
                    in_row_breaks = local == b"rowBreaks";
                    writer.write_event(Event::Start(shifted))?;
                } else {
                    writer.write_event(Event::Empty(shifted))?;
                }
            }
            Event::Start(ref e) | Event::Empty(ref e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                let shifted = shift_range_attrs(e, &local, in_row_breaks, insertions)?;
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                    in_formula_text = matches!(local.as_slice(), b"formula" | b"formula1" | b"formula2");
                    writer.write_event(Event::Start(shifted))?;
                } else {
                    writer.write_event(Event::Empty(shifted))?;
                }
            }
            Event::Text(ref t) if in_formula_text && !insertions.is_empty() => {
                let text = t.unescape()?;
                let shifted = insertions
                    .iter()
                    .fold(text.into_owned(), |f, ins| shift_rows_in_formula(&f, ins.at, ins.count));
                writer.write_event(Event::Text(BytesText::new(&shifted)))?;
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                in_formula_text = false;
                if depth == 1 && local_name(e.name().as_ref()) == b"rowBreaks" {
                    in_row_breaks = false;
                }
                if depth == 0 {
                    if !wrote_sheet_data {
                        write_sheet_data(writer.get_mut(), &prefix, sheet, &mut shared_strings);
                    }
                    if !wrote_merges {
                        write_merge_cells(writer.get_mut(), &prefix, sheet);
                        wrote_merges = true;
                    }
                }
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn prefix_of(qualified: &[u8]) -> Result<String, XlsxError> {
    let name = std::str::from_utf8(qualified)?;
    Ok(name
        .rsplit_once(':')
        .map(|(p, _)| format!("{p}:"))
        .unwrap_or_default())
}

/// Copy of `e` with row-bearing range attributes moved for every recorded insertion.
fn shift_range_attrs(
    e: &BytesStart<'_>,
    local: &[u8],
    in_row_breaks: bool,
    insertions: &[RowInsertion],
) -> Result<BytesStart<'static>, XlsxError> {
    if insertions.is_empty() {
        return Ok(e.to_owned().into_owned());
    }
    let mut out = BytesStart::new(std::str::from_utf8(e.name().as_ref())?.to_string());
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value()?.into_owned();
        let shifted = match (local, key.as_str()) {
            (_, "sqref") => insertions
                .iter()
                .fold(value, |v, ins| shift_rows_in_sqref(&v, ins.at, ins.count)),
            (b"hyperlink" | b"autoFilter" | b"selection", "ref" | "activeCell") => insertions
                .iter()
                .fold(value, |v, ins| shift_rows_in_ref(&v, ins.at, ins.count)),
            (b"brk", "id") if in_row_breaks => shift_break(&value, insertions),
            _ => value,
        };
        out.push_attribute((key.as_str(), shifted.as_str()));
    }
    Ok(out)
}

/// Page breaks are stored as the 0-indexed row the break follows, i.e. the 1-based row above it.
fn shift_break(value: &str, insertions: &[RowInsertion]) -> String {
    let Ok(mut row) = value.trim().parse::<u32>() else {
        return value.to_string();
    };
    for ins in insertions {
        if row > ins.at {
            row += ins.count;
        }
    }
    row.to_string()
}

fn write_sheet_data(
    out: &mut Vec<u8>,
    prefix: &str,
    sheet: &Worksheet,
    shared_strings: &mut Option<&mut SharedStrings>,
) {
    let mut xml = String::new();
    let rows: Vec<_> = sheet
        .rows()
        .filter(|(_, row)| !row.cells.is_empty() || row.props != RowProperties::default())
        .collect();
    if rows.is_empty() {
        xml.push_str(&format!("<{prefix}sheetData/>"));
        out.extend_from_slice(xml.as_bytes());
        return;
    }
    xml.push_str(&format!("<{prefix}sheetData>"));
    for (idx, row) in rows {
        xml.push_str(&format!("<{prefix}row r=\"{}\"", idx + 1));
        for (key, value) in &row.props.extra {
            xml.push_str(&format!(" {key}=\"{}\"", escape(value.as_str())));
        }
        if let Some(s) = row.props.style_id {
            xml.push_str(&format!(" s=\"{s}\" customFormat=\"1\""));
        }
        if let Some(ht) = row.props.height {
            xml.push_str(&format!(" ht=\"{ht}\""));
        }
        if row.props.custom_height {
            xml.push_str(" customHeight=\"1\"");
        }
        if row.props.hidden {
            xml.push_str(" hidden=\"1\"");
        }
        if row.cells.is_empty() {
            xml.push_str("/>");
            continue;
        }
        xml.push('>');
        for (col, cell) in &row.cells {
            write_cell(&mut xml, prefix, CellRef::new(idx, *col), cell, shared_strings);
        }
        xml.push_str(&format!("</{prefix}row>"));
    }
    xml.push_str(&format!("</{prefix}sheetData>"));
    out.extend_from_slice(xml.as_bytes());
}

fn write_cell(
    xml: &mut String,
    prefix: &str,
    at: CellRef,
    cell: &Cell,
    shared_strings: &mut Option<&mut SharedStrings>,
) {
    xml.push_str(&format!("<{prefix}c r=\"{}\"", at.to_a1()));
    if cell.style_id != 0 {
        xml.push_str(&format!(" s=\"{}\"", cell.style_id));
    }
    let has_formula = cell.formula.is_some();
    let body = match &cell.value {
        CellValue::Empty => None,
        CellValue::Number(n) => Some((None, format!("<{prefix}v>{}</{prefix}v>", number_text(*n)))),
        CellValue::Boolean(b) => Some((
            Some("b"),
            format!("<{prefix}v>{}</{prefix}v>", u8::from(*b)),
        )),
        CellValue::Error(e) => Some((
            Some("e"),
            format!("<{prefix}v>{}</{prefix}v>", escape(e.as_str())),
        )),
        CellValue::Text(text) if has_formula => Some((
            Some("str"),
            format!("<{prefix}v>{}</{prefix}v>", escape(text.as_str())),
        )),
        CellValue::Text(text) => match shared_strings.as_deref_mut() {
            Some(sst) => Some((
                Some("s"),
                format!("<{prefix}v>{}</{prefix}v>", sst.get_or_insert(text)),
            )),
            None => {
                let space = if text.starts_with(char::is_whitespace)
                    || text.ends_with(char::is_whitespace)
                {
                    " xml:space=\"preserve\""
                } else {
                    ""
                };
                Some((
                    Some("inlineStr"),
                    format!(
                        "<{prefix}is><{prefix}t{space}>{}</{prefix}t></{prefix}is>",
                        escape(text.as_str())
                    ),
                ))
            }
        },
    };
    if let Some((Some(kind), _)) = &body {
        xml.push_str(&format!(" t=\"{kind}\""));
    }
    if body.is_none() && !has_formula {
        xml.push_str("/>");
        return;
    }
    xml.push('>');
    if let Some(formula) = &cell.formula {
        write_formula(xml, prefix, formula);
    }
    if let Some((_, body)) = body {
        xml.push_str(&body);
    }
    xml.push_str(&format!("</{prefix}c>"));
}

fn write_formula(xml: &mut String, prefix: &str, formula: &Formula) {
    xml.push_str(&format!("<{prefix}f"));
    if let Some(shared) = &formula.shared {
        xml.push_str(" t=\"shared\"");
        if let Some(range) = shared.range {
            xml.push_str(&format!(" ref=\"{range}\""));
        }
        xml.push_str(&format!(" si=\"{}\"", shared.index));
    } else if let Some(range) = formula.array_range {
        xml.push_str(&format!(" t=\"array\" ref=\"{range}\""));
    }
    if formula.text.is_empty() {
        xml.push_str("/>");
    } else {
        xml.push_str(&format!(">{}</{prefix}f>", escape(formula.text.as_str())));
    }
}

fn number_text(n: f64) -> String {
    if n.is_finite() {
        format!("{n}")
    } else {
        "0".to_string()
    }
}

fn write_merge_cells(out: &mut Vec<u8>, prefix: &str, sheet: &Worksheet) {
    let merges = sheet.merges();
    if merges.is_empty() {
        return;
    }
    let mut xml = format!("<{prefix}mergeCells count=\"{}\">", merges.len());
    for range in merges {
        xml.push_str(&format!("<{prefix}mergeCell ref=\"{range}\"/>"));
    }
    xml.push_str(&format!("</{prefix}mergeCells>"));
    out.extend_from_slice(xml.as_bytes());
}

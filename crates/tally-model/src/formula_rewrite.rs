//! Row re-anchoring for formula text and reference lists.

use std::sync::OnceLock;

use regex::Regex;

use crate::{CellRef, Range};

fn cell_ref_re() -> &'static Regex {
    static CELL_REF_RE: OnceLock<Regex> = OnceLock::new();
    CELL_REF_RE.get_or_init(|| Regex::new(r"\$?[A-Za-z]{1,3}\$?[0-9]+").expect("valid regex"))
}

/// Shift same-sheet A1 row references in `formula` for `count` rows inserted before the 0-indexed
/// row `at`.
///
/// String literals, sheet-qualified references (`Other!A1`) and function names that look like
/// references (`LOG10(`) are left alone.
pub fn shift_rows_in_formula(formula: &str, at: u32, count: u32) -> String {
    if count == 0 {
        return formula.to_string();
    }

    let mut out = String::with_capacity(formula.len() + 8);
    let mut rest = formula;
    while let Some(quote) = rest.find('"') {
        out.push_str(&shift_segment(&rest[..quote], at, count));
        let literal = &rest[quote..];
        let end = string_literal_len(literal);
        out.push_str(&literal[..end]);
        rest = &literal[end..];
    }
    out.push_str(&shift_segment(rest, at, count));
    out
}

/// Length of the `"..."` literal at the start of `s`, honoring doubled `""` escapes.
fn string_literal_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn shift_segment(segment: &str, at: u32, count: u32) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut last = 0;
    for m in cell_ref_re().find_iter(segment) {
        let before = segment[..m.start()].chars().next_back();
        let after = segment[m.end()..].chars().next();
        let glued_before = before
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '!' | '\'' | '$'));
        let glued_after =
            after.is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '(' | '!' | '.'));
        if glued_before || glued_after || sheet_qualified_range_end(segment, m.start()) {
            continue;
        }
        out.push_str(&segment[last..m.start()]);
        out.push_str(&shift_reference(m.as_str(), at, count));
        last = m.end();
    }
    out.push_str(&segment[last..]);
    out
}

/// `Sheet2!A1:B5`: the `B5` half belongs to the other sheet as well.
fn sheet_qualified_range_end(segment: &str, start: usize) -> bool {
    let head = &segment[..start];
    let Some(head) = head.strip_suffix(':') else {
        return false;
    };
    let token_start = head
        .rfind(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '$' | '_' | '.' | '!' | '\'')))
        .map_or(0, |i| i + 1);
    head[token_start..].contains('!')
}

fn shift_reference(reference: &str, at: u32, count: u32) -> String {
    let digits_at = reference
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    let (prefix, digits) = reference.split_at(digits_at);
    match digits.parse::<u32>() {
        Ok(row) if row >= 1 && row - 1 >= at => format!("{prefix}{}", row + count),
        _ => reference.to_string(),
    }
}

/// Shift a space-separated reference list (`sqref="A1:B2 D5"`).
pub fn shift_rows_in_sqref(sqref: &str, at: u32, count: u32) -> String {
    sqref
        .split_whitespace()
        .map(|part| match Range::from_a1(part) {
            Ok(range) => {
                let shifted = range.shifted_for_insert(at, count);
                if part.contains(':') && shifted.is_single_cell() {
                    format!("{}:{}", shifted.start, shifted.end)
                } else {
                    shifted.to_string()
                }
            }
            Err(_) => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Shift a single A1 cell or range string, returning it unchanged when it does not parse.
pub fn shift_rows_in_ref(reference: &str, at: u32, count: u32) -> String {
    if reference.contains(':') {
        shift_rows_in_sqref(reference, at, count)
    } else {
        match CellRef::from_a1(reference) {
            Ok(cell) => cell.shifted_for_insert(at, count).to_a1(),
            Err(_) => reference.to_string(),
        }
    }
}

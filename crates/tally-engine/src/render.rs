//! Fixed-width paginated text view of a worksheet.
//!
//! The view covers the sheet's used range. A merged region's text spans the width of all the
//! columns it covers on its first row; the other rows of the region render blank.

use serde::Serialize;
use tally_format::Locale;
use tally_model::{CellRef, CellValue, Document, Range};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::RenderConfig;
use crate::project::display_value;

const COLUMN_GAP: usize = 1;
const MAX_COLUMN_WIDTH: usize = 40;

/// Pages of rendered text, each at most `columns` wide and `lines` tall.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextRendering {
    pub lines_per_page: usize,
    pub columns: usize,
    pub pages: Vec<String>,
}

impl std::fmt::Display for TextRendering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, page) in self.pages.iter().enumerate() {
            if i > 0 {
                f.write_str("\x0c\n")?;
            }
            f.write_str(page)?;
        }
        Ok(())
    }
}

enum Slot {
    Text { text: String, numeric: bool, span: usize },
    Covered,
}

pub fn render_text(doc: &Document, config: &RenderConfig, locale: &Locale) -> TextRendering {
    let page_width = config.page_size.columns();
    let page_lines = config.page_size.lines();

    let body = match doc.sheet.used_range() {
        Some(range) => body_lines(doc, range, locale, page_width),
        None => Vec::new(),
    };

    let header: Vec<String> = if config.include_header {
        vec![fit(&doc.sheet.name, page_width), "=".repeat(page_width)]
    } else {
        Vec::new()
    };
    let footer_lines = usize::from(config.include_footer) * 2;
    let per_page = page_lines.saturating_sub(header.len() + footer_lines).max(1);

    let chunks: Vec<&[String]> = if body.is_empty() {
        vec![&body[..]]
    } else {
        body.chunks(per_page).collect()
    };
    let total = chunks.len();
    let pages = chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut lines = header.clone();
            lines.extend(chunk.iter().cloned());
            if config.include_footer {
                let blank = per_page - chunk.len() + 1;
                lines.extend(std::iter::repeat(String::new()).take(blank));
                lines.push(fit(&format!("Page {} of {total}", i + 1), page_width));
            }
            lines.join("\n")
        })
        .collect();

    TextRendering {
        lines_per_page: page_lines,
        columns: page_width,
        pages,
    }
}

fn body_lines(doc: &Document, range: Range, locale: &Locale, page_width: usize) -> Vec<String> {
    let cols = (range.end.col - range.start.col + 1) as usize;
    let mut grid: Vec<Vec<Slot>> = Vec::new();
    let mut widths = vec![1usize; cols];

    for row in range.start.row..=range.end.row {
        let mut slots = Vec::with_capacity(cols);
        let mut c = 0;
        while c < cols {
            let at = CellRef::new(row, range.start.col + c as u32);
            match doc.sheet.merges().containing(at) {
                Some(merge) if merge.start == at => {
                    let span = ((merge.end.col.min(range.end.col) - at.col) + 1) as usize;
                    slots.push(cell_slot(doc, at, locale, span));
                    slots.extend((1..span).map(|_| Slot::Covered));
                    c += span;
                }
                Some(merge) => {
                    let span = if merge.start.col == at.col {
                        ((merge.end.col.min(range.end.col) - at.col) + 1) as usize
                    } else {
                        1
                    };
                    slots.push(Slot::Text {
                        text: String::new(),
                        numeric: false,
                        span,
                    });
                    slots.extend((1..span).map(|_| Slot::Covered));
                    c += span;
                }
                None => {
                    let slot = cell_slot(doc, at, locale, 1);
                    if let Slot::Text { text, .. } = &slot {
                        widths[c] = widths[c].max(text.width().min(MAX_COLUMN_WIDTH));
                    }
                    slots.push(slot);
                    c += 1;
                }
            }
        }
        grid.push(slots);
    }

    grid.iter()
        .map(|slots| {
            let mut line = String::new();
            for (c, slot) in slots.iter().enumerate() {
                if let Slot::Text {
                    text,
                    numeric,
                    span,
                } = slot
                {
                    let width: usize =
                        widths[c..c + span].iter().sum::<usize>() + COLUMN_GAP * (span - 1);
                    if c > 0 {
                        line.push_str(&" ".repeat(COLUMN_GAP));
                    }
                    line.push_str(&pad(text, width, *numeric));
                }
            }
            fit(line.trim_end(), page_width)
        })
        .collect()
}

fn cell_slot(doc: &Document, at: CellRef, locale: &Locale, span: usize) -> Slot {
    Slot::Text {
        text: display_value(doc, at, locale),
        numeric: matches!(doc.sheet.value_at(at), CellValue::Number(_)),
        span,
    }
}

/// Pad or cut `text` to exactly `width` display columns.
fn pad(text: &str, width: usize, right_align: bool) -> String {
    let text = fit(text, width);
    let fill = " ".repeat(width - text.width());
    if right_align {
        fill + &text
    } else {
        text + &fill
    }
}

/// Cut `text` to at most `width` display columns.
fn fit(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        out.push(ch);
    }
    out
}

use crate::literal::{render, split_sections, tokenize, Piece};
use crate::Locale;

/// Format `value` with a numeric format code such as `#,##0.00`, `0.0%` or `0.00" kg";(0.00)`.
pub fn format_number(value: f64, code: &str, locale: &Locale) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let sections = split_sections(code);
    let (section, signed) = if value > 0.0 {
        (sections[0], false)
    } else if value < 0.0 {
        match sections.get(1) {
            Some(negative) => (*negative, false),
            None => (sections[0], true),
        }
    } else {
        (sections.get(2).copied().unwrap_or(sections[0]), false)
    };

    let text = format_section(value.abs(), &tokenize(section), locale);
    if signed && text.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{text}")
    } else {
        text
    }
}

fn is_placeholder(piece: &Piece) -> bool {
    matches!(piece, Piece::Code('0' | '#' | '?'))
}

fn format_section(value: f64, pieces: &[Piece], locale: &Locale) -> String {
    let Some(first) = pieces.iter().position(is_placeholder) else {
        return render(pieces);
    };
    let mut end = pieces.iter().rposition(is_placeholder).map_or(first, |i| i + 1);
    let mut scale_commas: usize = 0;
    while matches!(pieces.get(end), Some(Piece::Code(','))) {
        scale_commas += 1;
        end += 1;
    }

    let percents = pieces
        .iter()
        .filter(|p| matches!(p, Piece::Code('%')))
        .count();
    let mut value = value * 100f64.powi(percents as i32);
    value /= 1000f64.powi(scale_commas as i32);

    let spec = FixedSpec::from_pieces(&pieces[first..end - scale_commas]);
    let mut out = render(&pieces[..first]);
    out.push_str(&spec.format(value, locale));
    out.push_str(&render(&pieces[end..]));
    out
}

struct FixedSpec {
    min_int: usize,
    min_frac: usize,
    max_frac: usize,
    grouping: bool,
    decimal_point: bool,
}

impl FixedSpec {
    fn from_pieces(pieces: &[Piece]) -> Self {
        let mut spec = FixedSpec {
            min_int: 0,
            min_frac: 0,
            max_frac: 0,
            grouping: false,
            decimal_point: false,
        };
        for piece in pieces {
            match (piece, spec.decimal_point) {
                (Piece::Code('.'), _) => spec.decimal_point = true,
                (Piece::Code(','), false) => spec.grouping = true,
                (Piece::Code('0'), false) => spec.min_int += 1,
                (Piece::Code('0'), true) => {
                    spec.min_frac += 1;
                    spec.max_frac += 1;
                }
                (Piece::Code('#' | '?'), true) => spec.max_frac += 1,
                _ => {}
            }
        }
        spec
    }

    fn format(&self, value: f64, locale: &Locale) -> String {
        let fixed = format!("{:.*}", self.max_frac, round_to(value, self.max_frac));
        let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

        let mut int = if int == "0" && self.min_int == 0 {
            String::new()
        } else {
            int.to_string()
        };
        while int.len() < self.min_int {
            int.insert(0, '0');
        }
        if self.grouping {
            int = group_thousands(&int, locale.thousands_sep);
        }

        let mut frac = frac.to_string();
        while frac.len() > self.min_frac && frac.ends_with('0') {
            frac.pop();
        }

        if self.decimal_point && (!frac.is_empty() || self.max_frac == 0) {
            int.push(locale.decimal_sep);
        }
        int.push_str(&frac);
        int
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn group_thousands(digits: &str, sep: char) -> String {
    let len = digits.chars().count();
    let mut out = String::with_capacity(digits.len() + len / 3 * sep.len_utf8());
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(ch);
    }
    out
}

/// Shortest plain rendering, without binary noise past nine decimals.
pub(crate) fn format_general(value: f64, locale: &Locale) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rounded = round_to(value, 9);
    if rounded == 0.0 {
        return "0".to_string();
    }
    let text = rounded.to_string();
    if locale.decimal_sep == '.' {
        text
    } else {
        text.replace('.', &locale.decimal_sep.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fixed_codes_with_grouping() {
        let en = Locale::en_us();
        assert_eq!(format_number(1000.5, "#,##0.00", &en), "1,000.50");
        assert_eq!(format_number(1234567.891, "#,##0.00", &en), "1,234,567.89");
        assert_eq!(format_number(0.5, "#,##0.00", &en), "0.50");
        assert_eq!(format_number(-24.519, "#,##0.00", &en), "-24.52");
        assert_eq!(format_number(-0.001, "0.00", &en), "0.00");
        assert_eq!(format_number(12.0, "0", &en), "12");
        assert_eq!(format_number(0.25, "#.##", &en), ".25");
    }

    #[test]
    fn locale_separators() {
        assert_eq!(format_number(1000.5, "#,##0.00", &Locale::de_de()), "1.000,50");
        assert_eq!(format_number(1000.5, "#,##0.00", &Locale::fr_fr()), "1\u{a0}000,50");
    }

    #[test]
    fn sections_percent_and_literals() {
        let en = Locale::en_us();
        assert_eq!(format_number(-5.0, "0.00;(0.00)", &en), "(5.00)");
        assert_eq!(format_number(0.0, "0.00;(0.00);\"nil\"", &en), "nil");
        assert_eq!(format_number(0.125, "0.0%", &en), "12.5%");
        assert_eq!(format_number(24.5, "0.00\" kg\"", &en), "24.50 kg");
        assert_eq!(format_number(1_500_000.0, "#,##0.0,,\"M\"", &en), "1.5M");
    }

    #[test]
    fn trailing_commas_scale_by_thousands() {
        let en = Locale::en_us();
        assert_eq!(format_number(12_345.0, "0.0,", &en), "12.3");
        assert_eq!(format_number(2_600.0, "0,\" t\"", &en), "3 t");
    }
}

//! Display formatting for spreadsheet number format codes.
//!
//! Covers what invoice templates use: fixed-point codes with grouping (`#,##0.00`), percents,
//! quoted literals, `positive;negative;zero` sections, and date codes (`yyyy-mm-dd`, `d/m/yy`).
//! Separators come from a [`Locale`].

mod datetime;
mod literal;
mod locale;
mod number;

pub use datetime::{date_from_serial, date_to_serial, format_date, is_date_format};
pub use locale::{normalize_locale_id, Locale};
pub use number::{format_number, round_to};

/// Format a numeric cell value with `code`, choosing date or number rendering.
///
/// `None` or `General` renders the shortest plain representation.
pub fn format_value(value: f64, code: Option<&str>, locale: &Locale) -> String {
    match code.map(str::trim) {
        None | Some("") => number::format_general(value, locale),
        Some(code) if code.eq_ignore_ascii_case("general") => {
            number::format_general(value, locale)
        }
        Some(code) if is_date_format(code) => {
            format_date(value, code, locale).unwrap_or_else(|| number::format_general(value, locale))
        }
        Some(code) => format_number(value, code, locale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dispatches_between_numbers_and_dates() {
        let en = Locale::en_us();
        assert_eq!(format_value(1204.5, Some("#,##0.00"), &en), "1,204.50");
        assert_eq!(format_value(45_000.0, Some("yyyy-mm-dd"), &en), "2023-03-15");
        assert_eq!(format_value(2.5, None, &en), "2.5");
        assert_eq!(format_value(2.5, Some("General"), &Locale::de_de()), "2,5");
    }
}

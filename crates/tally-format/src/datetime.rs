use chrono::{Datelike, Duration, NaiveDate};

use crate::literal::{split_sections, tokenize, Piece};
use crate::Locale;

fn epoch() -> NaiveDate {
    // Serial 0 in the 1900 system; serials above 60 skip the phantom 1900-02-29.
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Calendar date of a 1900-system serial. The time-of-day fraction is ignored.
pub fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let mut days = serial.floor() as i64;
    if days < 61 {
        // Serial 60 is the fictitious 1900-02-29; map it onto the 28th.
        days = if days == 60 { 59 } else { days } + 1;
    }
    epoch().checked_add_signed(Duration::days(days))
}

/// 1900-system serial for a calendar date.
pub fn date_to_serial(date: NaiveDate) -> f64 {
    let days = (date - epoch()).num_days();
    if days < 61 {
        (days - 1) as f64
    } else {
        days as f64
    }
}

/// True when the first section of `code` renders a date or time.
pub fn is_date_format(code: &str) -> bool {
    if code.trim().eq_ignore_ascii_case("general") {
        return false;
    }
    let first = split_sections(code)[0];
    tokenize(first).iter().any(|p| {
        matches!(p, Piece::Code(c) if matches!(c.to_ascii_lowercase(), 'y' | 'd' | 'm' | 'h' | 's'))
    })
}

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];
const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// Render a serial with a date code (`yyyy-mm-dd`, `d/m/yy`, `dd mmm yyyy`, `hh:mm`).
///
/// Returns `None` when the serial is outside the representable date range.
pub fn format_date(serial: f64, code: &str, locale: &Locale) -> Option<String> {
    let date = date_from_serial(serial)?;
    let seconds_of_day = ((serial - serial.floor()) * 86_400.0).round() as u32;
    let (hour, minute, second) = (
        seconds_of_day / 3600 % 24,
        seconds_of_day / 60 % 60,
        seconds_of_day % 60,
    );

    let pieces = tokenize(split_sections(code)[0]);
    let has_hour = pieces
        .iter()
        .any(|p| matches!(p, Piece::Code('h' | 'H')));

    let mut out = String::new();
    let mut i = 0;
    while i < pieces.len() {
        let letter = match &pieces[i] {
            Piece::Literal(text) => {
                out.push_str(text);
                i += 1;
                continue;
            }
            Piece::Code('/') => {
                out.push(locale.date_sep);
                i += 1;
                continue;
            }
            Piece::Code(c) => c.to_ascii_lowercase(),
        };
        let run = pieces[i..]
            .iter()
            .take_while(|p| matches!(p, Piece::Code(c) if c.to_ascii_lowercase() == letter))
            .count();
        let month = date.month0() as usize;
        match (letter, run) {
            ('y', 1 | 2) => out.push_str(&format!("{:02}", date.year() % 100)),
            ('y', _) => out.push_str(&format!("{:04}", date.year())),
            // `m` right after an hour token means minutes.
            ('m', 1 | 2) if has_hour && ends_with_hour(&out) => {
                out.push_str(&pad(minute, run))
            }
            ('m', 1 | 2) => out.push_str(&pad(date.month(), run)),
            ('m', 3) => out.push_str(&MONTHS[month][..3]),
            ('m', _) => out.push_str(MONTHS[month]),
            ('d', 1 | 2) => out.push_str(&pad(date.day(), run)),
            ('d', 3) => out.push_str(&WEEKDAYS[date.weekday().num_days_from_monday() as usize][..3]),
            ('d', _) => out.push_str(WEEKDAYS[date.weekday().num_days_from_monday() as usize]),
            ('h', _) => out.push_str(&pad(hour, run)),
            ('s', _) => out.push_str(&pad(second, run)),
            (other, _) => (0..run).for_each(|_| out.push(other)),
        }
        i += run;
    }
    Some(out)
}

fn pad(n: u32, width: usize) -> String {
    if width >= 2 {
        format!("{n:02}")
    } else {
        n.to_string()
    }
}

fn ends_with_hour(rendered: &str) -> bool {
    rendered.trim_end().ends_with(':')
}

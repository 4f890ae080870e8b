use proptest::prelude::*;
use tally_format::{format_value, Locale};

proptest! {
    #[test]
    fn grouped_two_decimal_rendering_reads_back(cents in -10_000_000_000i64..10_000_000_000i64) {
        let value = cents as f64 / 100.0;
        let text = format_value(value, Some("#,##0.00"), &Locale::de_de());
        let plain: String = text.chars().filter(|c| *c != '.').collect();
        let parsed: f64 = plain.replace(',', ".").parse().unwrap();
        prop_assert_eq!((parsed * 100.0).round() as i64, cents);
        prop_assert_eq!(text.rsplit(',').next().map(str::len), Some(2));
    }
}

#[test]
fn weight_cells_render_per_locale() {
    let cases = [
        ("en-US", "24,512.07"),
        ("de-DE", "24.512,07"),
        ("it-IT", "24.512,07"),
        ("fr-FR", "24\u{a0}512,07"),
    ];
    for (id, expected) in cases {
        let locale = Locale::from_id(id).unwrap();
        assert_eq!(format_value(24_512.07, Some("#,##0.00"), &locale), expected, "{id}");
    }
}

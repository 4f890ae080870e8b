use pretty_assertions::assert_eq;
use tally_model::{Alignment, Font, Style, StyleTable};

fn loaded() -> StyleTable {
    StyleTable::from_loaded(vec![
        Style::default(),
        Style {
            font: Font {
                name: Some("Calibri".to_string()),
                size_100pt: Some(1100),
                ..Font::default()
            },
            alignment: Alignment {
                wrap_text: true,
                ..Alignment::default()
            },
            ..Style::default()
        },
    ])
}

#[test]
fn deriving_an_unchanged_style_returns_the_base() {
    let mut table = loaded();
    let same = table.get(1).cloned().unwrap();
    assert_eq!(table.derive(1, same), 1);
    assert_eq!(table.len(), 2);
}

#[test]
fn derived_styles_are_deduplicated_per_base() {
    let mut table = loaded();
    let mut weight = table.get(1).cloned().unwrap();
    weight.font.size_100pt = Some(900);
    weight.number_format = Some("#,##0.00".to_string());

    let a = table.derive(1, weight.clone());
    let b = table.derive(1, weight.clone());
    assert_eq!(a, b);
    assert_eq!(a, 2);
    assert_eq!(table.base_of(a), Some(1));

    // Deriving from a derived style chains back to the loaded one.
    let mut wrapped_off = weight;
    wrapped_off.alignment.wrap_text = false;
    let c = table.derive(a, wrapped_off);
    assert_eq!(table.base_of(c), Some(1));

    let derived: Vec<(u32, u32)> = table.derived_styles().map(|(id, base, _)| (id, base)).collect();
    assert_eq!(derived, vec![(2, 1), (3, 1)]);
    assert_eq!(table.loaded_len(), 2);
}

#[test]
fn empty_table_still_has_a_default_style() {
    let table = StyleTable::from_loaded(Vec::new());
    assert_eq!(table.get(0), Some(&Style::default()));
}

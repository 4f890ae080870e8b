use proptest::prelude::*;
use tally_model::{CellRef, Range, Worksheet};

const CASES: u32 = 128;

fn disjoint_regions() -> impl Strategy<Value = Vec<Range>> {
    // One region per band of 6 rows so generated regions never overlap.
    prop::collection::vec((0u32..4, 0u32..5, 0u32..3, 1u32..4), 1..8).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(band, (top, height, col, width))| {
                let row = band as u32 * 6 + top;
                Range::new(
                    CellRef::new(row, col),
                    CellRef::new(row + height.min(5 - top), col + width),
                )
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig { cases: CASES, .. ProptestConfig::default() })]

    #[test]
    fn insertion_shifts_or_grows_every_region(
        regions in disjoint_regions(),
        at in 0u32..50,
        count in 1u32..20,
    ) {
        let mut sheet = Worksheet::new("Sheet1");
        for region in &regions {
            sheet.add_merge(*region).unwrap();
        }

        sheet.insert_rows(at, count, None).unwrap();

        let after: Vec<Range> = sheet.merges().iter().copied().collect();
        prop_assert_eq!(after.len(), regions.len());
        for (before, after) in regions.iter().zip(&after) {
            let delta = if before.start.row >= at {
                prop_assert_eq!(after.start.row, before.start.row + count);
                0
            } else if before.end.row >= at {
                prop_assert_eq!(after.start.row, before.start.row);
                count
            } else {
                prop_assert_eq!(after, before);
                0
            };
            prop_assert_eq!(
                after.end.row - after.start.row,
                before.end.row - before.start.row + delta
            );
            prop_assert_eq!((after.start.col, after.end.col), (before.start.col, before.end.col));
        }
        for (i, a) in after.iter().enumerate() {
            for b in &after[i + 1..] {
                prop_assert!(!a.intersects(b), "{a} overlaps {b}");
            }
        }
    }
}

#[test]
fn scenario_a_merge_below_band_moves_with_totals() {
    // Band rows 5..=10, four rows inserted before row 10.
    let mut sheet = Worksheet::new("Invoice");
    sheet.add_merge(Range::from_a1("A11:D12").unwrap()).unwrap();
    sheet.add_merge(Range::from_a1("A1:H2").unwrap()).unwrap();

    sheet.insert_rows(9, 4, Some(9)).unwrap();

    let merges: Vec<String> = sheet.merges().iter().map(ToString::to_string).collect();
    assert_eq!(merges, vec!["A15:D16".to_string(), "A1:H2".to_string()]);
}

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use tally_engine::{distribute, Engine, EngineConfig, ProcessingRequest, TemplateDescriptor};
use tally_model::{CellValue, Range};
use tally_xlsx::minimal::{WorkbookBuilder, XF_NUMBER};
use tally_xlsx::XlsxDocument;

mod common;

use common::at;

/// Bags on rows 5-10, a merged block on rows 11-12 and totals in G13.
fn six_row_band() -> (Engine, Vec<u8>) {
    let descriptor = TemplateDescriptor {
        weight_column: Some("G".into()),
        start_row: 5,
        total_row: 10,
        bag_id_column: Some("A".into()),
        totals_cell: Some("G13".into()),
        bag_count_cell: None,
        date_cell: None,
        lot_number_cell: None,
        name_cell: None,
        address_cell: None,
        header_row: None,
        label_cells: BTreeMap::new(),
    };
    let config = EngineConfig {
        templates: [("six".to_string(), descriptor)].into(),
        ..EngineConfig::default()
    };
    let bytes = WorkbookBuilder::new("Invoice")
        .value("A4", "Bag")
        .value("G4", "Weight")
        .style("G5:G10", XF_NUMBER)
        .value("A11", "Marks and numbers")
        .merge("A11:F12")
        .formula("G13", "SUM(G5:G10)", 0.0)
        .build()
        .unwrap();
    (Engine::new(config), bytes)
}

#[test]
fn scenario_a_grows_the_band_and_shifts_the_merge_below_it() {
    let (engine, bytes) = six_row_band();
    let request = ProcessingRequest {
        template_type: "six".into(),
        bag_count: Some(10),
        target_weight: Some(250.0),
        seed: Some(11),
        ..ProcessingRequest::default()
    };
    let out = engine.process(&bytes, &request).unwrap();

    let doc = XlsxDocument::load(&out.bytes).unwrap();
    let sheet = &doc.document.sheet;
    let merges: Vec<Range> = sheet.merges().iter().copied().collect();
    assert_eq!(merges, vec![Range::from_a1("A15:F16").unwrap()]);
    assert_eq!(
        sheet.value_at(at("A15")),
        &CellValue::Text("Marks and numbers".into())
    );
    assert_eq!(
        sheet.cell(at("G17")).unwrap().formula.as_ref().unwrap().text,
        "SUM(G5:G14)"
    );
    assert_eq!(sheet.value_at(at("G17")), &CellValue::Number(250.0));
    assert_eq!(sheet.value_at(at("A14")), &CellValue::Number(10.0));

    let stored: Vec<f64> = (5..=14)
        .map(|row| sheet.value_at(at(&format!("G{row}"))).as_number().unwrap())
        .collect();
    assert_eq!(stored, out.weights);
}

#[test]
fn scenario_b_sums_exactly_with_the_final_bag_absorbing_the_remainder() {
    for seed in 0..20 {
        let plan = distribute(1000.50, 25, -2.0, 2.0, seed).unwrap();
        assert_eq!(plan.len(), 25);
        assert_eq!(plan.total_cents(), 100_050);
        let mean = 1000.50 / 25.0;
        for value in &plan.values()[..24] {
            assert!(
                (mean * 0.98 - 0.005..=mean * 1.02 + 0.005).contains(value),
                "seed {seed}: {value} outside the band"
            );
        }
    }
}

#[test]
fn scenario_c_single_bag_equals_the_target() {
    let (engine, bytes) = six_row_band();
    let request = ProcessingRequest {
        template_type: "six".into(),
        bag_count: Some(1),
        target_weight: Some(1000.5),
        ..ProcessingRequest::default()
    };
    let out = engine.process(&bytes, &request).unwrap();
    assert_eq!(out.weights, vec![1000.5]);

    let doc = XlsxDocument::load(&out.bytes).unwrap();
    let sheet = &doc.document.sheet;
    assert_eq!(sheet.value_at(at("G5")), &CellValue::Number(1000.5));
    assert!(sheet.value_at(at("G6")).is_empty());
    assert_eq!(sheet.value_at(at("G13")), &CellValue::Number(1000.5));
    assert_eq!(
        sheet.cell(at("G13")).unwrap().formula.as_ref().unwrap().text,
        "SUM(G5:G5)"
    );
}

#[test]
fn scenario_d_zero_band_gives_every_bag_the_mean() {
    let plan = distribute(1000.0, 7, 0.0, 0.0, 3).unwrap();
    assert!(!plan.rebalanced);
    assert_eq!(&plan.cents()[..6], &[14286; 6]);
    assert_eq!(plan.cents()[6], 100_000 - 6 * 14286);
    assert_eq!(plan.total(), 1000.0);
}

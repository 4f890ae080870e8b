use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use tally_engine::{
    project, BandLayout, Engine, EngineConfig, ErrorKind, Mode, Output, PipelineState,
    ProcessingRequest, TemplateDescriptor,
};
use tally_format::Locale;
use tally_model::CellValue;
use tally_xlsx::{XlsxDocument, XlsxPackage};

mod common;

use common::{at, build, default_invoice};

fn request(bag_count: u64, target_weight: f64, seed: u64) -> ProcessingRequest {
    ProcessingRequest {
        bag_count: Some(bag_count),
        target_weight: Some(target_weight),
        seed: Some(seed),
        ..ProcessingRequest::default()
    }
}

#[test]
fn preview_and_process_agree_for_the_same_seed() {
    let engine = Engine::default();
    let bytes = build(default_invoice(&[]));
    let request = request(25, 1000.5, 42);

    let preview = engine.preview(&bytes, &request).unwrap();
    let processed = engine.process(&bytes, &request).unwrap();

    assert_eq!(preview.seed, 42);
    assert_eq!(preview.projection, processed.projection);
    assert_eq!(preview.projection.weights, processed.weights);
    assert_eq!(processed.weights.len(), 25);
    assert_eq!(preview.projection.metadata.total, 1000.5);
}

#[test]
fn saved_workbook_holds_the_reported_weights() {
    let engine = Engine::default();
    let bytes = build(default_invoice(&[]));
    let out = engine.process(&bytes, &request(12, 480.0, 3)).unwrap();
    assert_eq!(out.filename, "invoice_processed.xlsx");

    let doc = XlsxDocument::load(&out.bytes).unwrap();
    let sheet = &doc.document.sheet;
    let stored: Vec<f64> = (8..20)
        .map(|row| sheet.value_at(at(&format!("G{row}"))).as_number().unwrap())
        .collect();
    assert_eq!(stored, out.weights);
    assert!(sheet.value_at(at("G20")).is_empty());
    assert_eq!(sheet.value_at(at("G38")), &CellValue::Number(480.0));
    assert_eq!(
        sheet.cell(at("G38")).unwrap().formula.as_ref().unwrap().text,
        "SUM(G8:G19)"
    );
    assert_eq!(sheet.value_at(at("C38")), &CellValue::Text("12 Bags".into()));
    assert_eq!(doc.document.style_at(at("G8")).number_format.as_deref(), Some("#,##0.00"));
}

#[test]
fn reloaded_output_projects_like_the_in_memory_document() {
    let engine = Engine::default();
    let bytes = build(default_invoice(&[]));
    let out = engine.process(&bytes, &request(12, 480.0, 8)).unwrap();

    let doc = XlsxDocument::load(&out.bytes).unwrap();
    let registry = engine.registry();
    let mut layout = BandLayout::resolve("default", registry.get("default").unwrap()).unwrap();
    layout.active_rows = 12;
    let reloaded = project(&doc.document, &layout, &Locale::en_us(), Some(out.seed));

    assert_eq!(reloaded.weights, out.projection.weights);
    assert_eq!(reloaded.rows, out.projection.rows);
    assert_eq!(reloaded.metadata.total, out.projection.metadata.total);
}

#[test]
fn successful_runs_walk_every_state() {
    let engine = Engine::default();
    let bytes = build(default_invoice(&[]));
    let out = engine.process(&bytes, &request(5, 100.0, 1)).unwrap();
    assert_eq!(
        out.trace,
        vec![
            PipelineState::Received,
            PipelineState::Validated,
            PipelineState::Provisioned,
            PipelineState::Distributed,
            PipelineState::Stamped,
            PipelineState::Serialized,
            PipelineState::Done,
        ]
    );
}

#[test]
fn run_dispatches_on_mode() {
    let engine = Engine::default();
    let bytes = build(default_invoice(&[]));
    let request = request(5, 100.0, 1);
    assert!(matches!(
        engine.run(&bytes, &request, Mode::Preview).unwrap(),
        Output::Preview(_)
    ));
    assert!(matches!(
        engine.run(&bytes, &request, Mode::Process).unwrap(),
        Output::Process(_)
    ));
}

#[test]
fn counts_and_totals_are_inferred_from_prefilled_weights() {
    let engine = Engine::default();
    let bytes = build(default_invoice(&[20.25, 19.75, 20.0]));
    let request = ProcessingRequest {
        seed: Some(9),
        ..ProcessingRequest::default()
    };
    let out = engine.preview(&bytes, &request).unwrap();
    let meta = &out.projection.metadata;
    assert_eq!(meta.bag_count, 3);
    assert_eq!(meta.total, 60.0);
    assert_eq!(meta.anchors["bag_count"], "3 Bags");
}

#[test]
fn metadata_lands_in_its_anchor_cells() {
    let engine = Engine::default();
    let bytes = build(default_invoice(&[]));
    let request = ProcessingRequest {
        date: Some("2024-03-15".into()),
        lot_number: Some("LOT-0042".into()),
        name: Some("Northwind Mills".into()),
        address: Some("12 Dock Road".into()),
        ..request(4, 200.0, 5)
    };
    let out = engine.preview(&bytes, &request).unwrap();
    let anchors = &out.projection.metadata.anchors;
    assert_eq!(anchors["date"], "2024-03-15");
    assert_eq!(anchors["lot_number"], "LOT-0042");
    assert_eq!(anchors["name"], "Northwind Mills");
    assert_eq!(anchors["address"], "12 Dock Road");
}

#[test]
fn saving_drops_the_calc_chain_and_requests_recalculation() {
    let engine = Engine::default();
    let bytes = build(default_invoice(&[]).with_calc_chain());
    assert!(XlsxPackage::from_bytes(&bytes)
        .unwrap()
        .has_part("xl/calcChain.xml"));

    let out = engine.process(&bytes, &request(10, 400.0, 2)).unwrap();
    let package = XlsxPackage::from_bytes(&out.bytes).unwrap();
    assert!(!package.has_part("xl/calcChain.xml"));
    let workbook = String::from_utf8(package.part("xl/workbook.xml").unwrap().to_vec()).unwrap();
    assert!(workbook.contains(r#"fullCalcOnLoad="1""#), "{workbook}");
}

#[test]
fn rendering_is_attached_on_request() {
    let engine = Engine::default();
    let bytes = build(default_invoice(&[]));
    let request = ProcessingRequest {
        render_text: true,
        ..request(3, 90.0, 4)
    };
    let out = engine.preview(&bytes, &request).unwrap();
    let rendering = out.rendering.unwrap();
    assert_eq!(rendering.pages.len(), 1);
    assert!(rendering.pages[0].starts_with("Invoice\n"));
    assert!(rendering.pages[0].contains("PACKING LIST"));
}

#[test]
fn failures_carry_their_kind() {
    let bytes = build(default_invoice(&[]));
    let engine = Engine::default();

    let err = engine.process(&bytes, &request(1001, 10.0, 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityError);

    let unknown = ProcessingRequest {
        template_type: "ledger".into(),
        ..request(3, 10.0, 1)
    };
    let err = engine.process(&bytes, &unknown).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTemplateError);

    let err = engine.preview(b"PK\x03\x04 truncated", &request(3, 10.0, 1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatError);
}

#[test]
fn templates_without_a_weight_column_are_rejected_when_stamping() {
    let descriptor = TemplateDescriptor {
        weight_column: None,
        start_row: 8,
        total_row: 37,
        bag_id_column: None,
        totals_cell: Some("G38".into()),
        bag_count_cell: None,
        date_cell: None,
        lot_number_cell: None,
        name_cell: None,
        address_cell: None,
        header_row: None,
        label_cells: BTreeMap::new(),
    };
    let config = EngineConfig {
        templates: [("bare".to_string(), descriptor)].into(),
        ..EngineConfig::default()
    };
    let engine = Engine::new(config);
    let request = ProcessingRequest {
        template_type: "bare".into(),
        ..request(3, 10.0, 1)
    };
    let err = engine.process(&build(default_invoice(&[])), &request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AnchorMissingError);
}

#![allow(dead_code)]

use tally_model::CellRef;
use tally_xlsx::minimal::{WorkbookBuilder, XF_BOLD, XF_NUMBER};

pub fn at(a1: &str) -> CellRef {
    CellRef::from_a1(a1).unwrap()
}

/// Invoice laid out like the built-in `default` template: bags on rows 8-37, totals in G38 and a
/// merged remarks block below the totals row.
pub fn default_invoice(prefilled: &[f64]) -> WorkbookBuilder {
    let mut builder = WorkbookBuilder::new("Invoice")
        .value("A1", "PACKING LIST")
        .style("A1", XF_BOLD)
        .merge("A1:G1")
        .value("C3", "Customer name")
        .merge("C3:F3")
        .value("A4", "Date")
        .value("B4", "Lot")
        .value("C4", "Customer address")
        .merge("C4:F4")
        .value("A7", "Bag")
        .value("G7", "Weight")
        .style("G8:G37", XF_NUMBER)
        .row_height(37, 15.0);
    for (i, w) in prefilled.iter().enumerate() {
        builder = builder.value(&format!("G{}", 8 + i), *w);
    }
    let sum: f64 = prefilled.iter().sum();
    builder
        .formula("G38", "SUM(G8:G37)", sum)
        .value("C38", "30 Bags")
        .value("A39", "Remarks")
        .merge("A39:F40")
}

pub fn build(builder: WorkbookBuilder) -> Vec<u8> {
    builder.build().unwrap()
}

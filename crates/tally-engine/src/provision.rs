//! Fitting the template's bag band to the requested bag count.

use tally_model::{Document, InsertRowsError, MAX_ROWS};

use crate::template::BandLayout;
use crate::EngineError;

/// What [`provision`] did to the band.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub inserted: u32,
    pub cleared: u32,
}

/// Make the band hold exactly `target` bags.
///
/// Missing rows are inserted before the last band row, cloned from it, which pushes the totals
/// row and everything below it down; `layout` is re-anchored to match. Surplus rows stay in
/// place with their contents cleared.
pub fn provision(
    doc: &mut Document,
    layout: &mut BandLayout,
    target: u64,
    max_bags: u32,
) -> Result<ProvisionOutcome, EngineError> {
    if target < 1 || target > u64::from(max_bags) {
        return Err(EngineError::Capacity {
            requested: target,
            max: max_bags,
        });
    }
    let target = target as u32;
    let available = layout.available();
    let mut outcome = ProvisionOutcome::default();

    if target > available {
        let count = target - available;
        let at = layout.last_row;
        doc.sheet
            .insert_rows(at, count, Some(at))
            .map_err(|err| match err {
                InsertRowsError::PastLastRow { bottom, .. } => {
                    let overflow = bottom + 1 - u64::from(MAX_ROWS);
                    log::debug!("{err}");
                    EngineError::Capacity {
                        requested: u64::from(target),
                        max: (u64::from(target) - overflow) as u32,
                    }
                }
                InsertRowsError::Merge(merge) => EngineError::Format(format!(
                    "cannot grow the band of template {:?}: {merge}",
                    layout.template
                )),
            })?;
        layout.grow_band(at, count);
        outcome.inserted = count;
        log::debug!(
            "inserted {count} rows before row {} for {target} bags",
            at + 1
        );
    } else if target < available {
        for row in layout.start_row + target..=layout.last_row {
            doc.sheet.clear_row_contents(row);
        }
        outcome.cleared = available - target;
        log::debug!(
            "cleared {} surplus band rows for {target} bags",
            outcome.cleared
        );
    }
    layout.active_rows = target;
    Ok(outcome)
}

// ==============================================================================
// assembler.rs - Feature Matrix Assembler
// ==============================================================================
// Description: Left-joins the organ table onto the generic feature matrix
// Author: Matt Barham
// Created: 2026-09-14
// Modified: 2026-10-01
// Version: 1.0.1
// ==============================================================================

use tracing::{debug, info};

use crate::join::{left_join_matrix, JoinError};
use crate::models::{FeatureMatrix, KeyedFeatureTable};

/// One row per registry variant; organ columns null where the position is absent
pub fn assemble(
    mut generic: FeatureMatrix,
    organ: KeyedFeatureTable,
) -> Result<FeatureMatrix, JoinError> {
    let organ = organ.dedup_by_key();
    let matched = left_join_matrix(&mut generic, &organ)?;

    info!(
        "Assembled feature matrix: {} variants x {} columns ({} with organ features)",
        generic.len(),
        generic.columns.len(),
        matched
    );
    for summary in generic.summaries() {
        debug!(
            "{}: non_null={} nulls={} mean={:?} min={:?} max={:?}",
            summary.name, summary.non_null, summary.nulls, summary.mean, summary.min, summary.max
        );
    }

    Ok(generic)
}

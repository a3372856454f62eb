// ==============================================================================
// generic_features.rs - Generic Annotation Joiner
// ==============================================================================
// Description: Joins organ-agnostic annotation indicators and generic signal
//              tracks onto the variant registry
// Author: Matt Barham
// Created: 2026-09-08
// Modified: 2026-10-07
// Version: 1.2.0
// ==============================================================================

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::join::{left_join_matrix, JoinError};
use crate::models::{FeatureColumn, FeatureMatrix, KeyedFeatureTable, Variant, VariantKey};
use crate::parsers::{AnnotationError, AnnotationRecord, GenericIndicator};
use crate::signal_track::{sample_file, SignalTrackError, SignalTrackOpener};

/// Generic DNase signal tracks (`<dnase_dir>/<name>.bw`)
pub const DNASE_SIGNALS: [&str; 5] = [
    "DNase_var",
    "DNase_quantile95",
    "DNase_quantile1",
    "DNase_quantile2",
    "DNase_quantile3",
];

/// Generic ChIP signal tracks (`<chip_dir>/<name>.bw`)
pub const CHIP_SIGNALS: [&str; 5] = [
    "ChIP_var",
    "ChIP_quantile95",
    "ChIP_quantile1",
    "ChIP_quantile2",
    "ChIP_quantile3",
];

#[derive(Error, Debug)]
pub enum GenericFeatureError {
    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error(transparent)]
    SignalTrack(#[from] SignalTrackError),

    #[error(transparent)]
    Join(#[from] JoinError),
}

/// Directories holding the generic signal tracks
#[derive(Debug, Clone)]
pub struct GenericSignalDirs {
    pub dnase_dir: PathBuf,
    pub chip_dir: PathBuf,
}

impl GenericSignalDirs {
    /// (column name, track path) for all ten generic signals
    pub fn tracks(&self) -> Vec<(&'static str, PathBuf)> {
        let dnase = DNASE_SIGNALS.iter().map(|name| (*name, track_path(&self.dnase_dir, name)));
        let chip = CHIP_SIGNALS.iter().map(|name| (*name, track_path(&self.chip_dir, name)));
        dnase.chain(chip).collect()
    }
}

fn track_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.bw", name))
}

/// Build the indicator table: one row per distinct (key, indicators) pair
pub fn indicator_table(records: &[AnnotationRecord]) -> Result<KeyedFeatureTable, AnnotationError> {
    let mut seen: HashSet<(VariantKey, [i64; 9])> = HashSet::new();
    let mut rows: Vec<(VariantKey, [i64; 9])> = Vec::new();

    for record in records {
        let indicators = record.generic_indicators()?;
        let row = (record.key.clone(), indicators);
        if seen.insert(row.clone()) {
            rows.push(row);
        }
    }

    // Distinct rows sharing a key: the join uses the first one
    let mut per_key: HashMap<&VariantKey, usize> = HashMap::new();
    for (key, _) in &rows {
        *per_key.entry(key).or_default() += 1;
    }
    let conflicting = per_key.values().filter(|&&n| n > 1).count();
    if conflicting > 0 {
        warn!(
            "{} positions have conflicting generic annotations; keeping the first record for each",
            conflicting
        );
    }

    debug!(
        "Generic indicator table: {} rows from {} records",
        rows.len(),
        records.len()
    );

    let mut table = KeyedFeatureTable::new(rows.iter().map(|(k, _)| k.clone()).collect());
    for (idx, indicator) in GenericIndicator::ALL.iter().enumerate() {
        table.push_column(FeatureColumn::integer(
            indicator.column(),
            rows.iter().map(|(_, values)| Some(values[idx] as f64)).collect(),
        ));
    }
    Ok(table)
}

/// Registry + indicators (left join) + generic signal samples
pub fn join_generic_features<O: SignalTrackOpener>(
    variants: Vec<Variant>,
    records: &[AnnotationRecord],
    signals: &GenericSignalDirs,
    opener: &O,
) -> Result<FeatureMatrix, GenericFeatureError> {
    let indicators = indicator_table(records)?;

    let mut matrix = FeatureMatrix::new(variants);
    let matched = left_join_matrix(&mut matrix, &indicators)?;
    info!(
        "Generic annotations matched {} of {} variants",
        matched,
        matrix.len()
    );

    let keys: Vec<VariantKey> = matrix.keys().collect();
    for (name, path) in signals.tracks() {
        let values = sample_file(opener, &path, &keys)?;
        debug!(
            "Sampled {}: {} of {} variants have a value",
            name,
            values.iter().filter(|v| v.is_some()).count(),
            keys.len()
        );
        matrix.push_column(FeatureColumn::float(name, values));
    }

    Ok(matrix)
}

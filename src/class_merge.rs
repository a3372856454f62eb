// ==============================================================================
// class_merge.rs - Sequence-Class Merger
// ==============================================================================
// Description: Allele-exact merge of sequence-class scores with run-level mean
//              imputation and per-variant max absolute score
// Author: Matt Barham
// Created: 2026-09-10
// Modified: 2026-10-05
// Version: 1.1.0
// ==============================================================================
// Algorithm:
//   1. Left-merge scores on (chrom, pos, ref, alt)
//   2. Pass 1: mean of each score column over its non-null cells in this run
//   3. Pass 2: fill nulls with that mean (all-null columns follow the policy)
//   4. max_abs_diff = max |score| across the imputed score columns
// ==============================================================================

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{FeatureColumn, FeatureMatrix};
use crate::parsers::sequence_class::AlleleKey;
use crate::parsers::{SequenceClassError, SequenceClassTable};

/// Column holding the per-variant maximum absolute class score
pub const MAX_ABS_DIFF: &str = "max_abs_diff";

/// What to do with a score column that has no values in the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AllNullPolicy {
    /// Abort the run
    #[default]
    Fail,
    /// Impute 0.0
    Zero,
}

/// Merge class scores onto the matrix, impute, and append `max_abs_diff`
pub fn merge_sequence_classes(
    matrix: &mut FeatureMatrix,
    table: &SequenceClassTable,
    policy: AllNullPolicy,
) -> Result<(), SequenceClassError> {
    let n_scores = table.score_columns.len();
    let mut scores: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(matrix.len()); n_scores];
    let mut matched = 0usize;

    for variant in &matrix.variants {
        let key = AlleleKey {
            key: variant.key(),
            ref_allele: variant.ref_allele.clone(),
            alt_allele: variant.alt_allele.clone(),
        };
        match table.get(&key) {
            Some(row) => {
                matched += 1;
                for (column, value) in scores.iter_mut().zip(row) {
                    column.push(*value);
                }
            }
            None => scores.iter_mut().for_each(|column| column.push(None)),
        }
    }
    info!(
        "Sequence classes matched {} of {} variants ({} score columns)",
        matched,
        matrix.len(),
        n_scores
    );

    for (name, column) in table.score_columns.iter().zip(scores.iter_mut()) {
        impute_column_mean(name, column, policy)?;
    }

    let max_abs: Vec<Option<f64>> = (0..matrix.len())
        .map(|row| {
            scores
                .iter()
                .filter_map(|column| column[row])
                .map(f64::abs)
                .reduce(f64::max)
        })
        .collect();

    for (name, values) in table.score_columns.iter().zip(scores) {
        matrix.push_column(FeatureColumn::float(name.clone(), values));
    }
    matrix.push_column(FeatureColumn::float(MAX_ABS_DIFF, max_abs));

    Ok(())
}

/// Two-pass mean imputation of one column; returns the fill value used
pub fn impute_column_mean(
    name: &str,
    values: &mut [Option<f64>],
    policy: AllNullPolicy,
) -> Result<f64, SequenceClassError> {
    // Empty registry: nothing to fill, so the policy does not apply
    if values.is_empty() {
        return Ok(0.0);
    }

    let present: Vec<f64> = values.iter().flatten().copied().collect();

    let fill = if present.is_empty() {
        match policy {
            AllNullPolicy::Fail => return Err(SequenceClassError::AllNullColumn(name.to_string())),
            AllNullPolicy::Zero => {
                warn!("Class-score column '{}' has no values; imputing 0.0", name);
                0.0
            }
        }
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    };

    let filled = values.iter().filter(|v| v.is_none()).count();
    for value in values.iter_mut().filter(|v| v.is_none()) {
        *value = Some(fill);
    }
    if filled > 0 {
        debug!("Imputed {} cells of '{}' with {:.6}", filled, name, fill);
    }

    Ok(fill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Variant, VariantKey};
    use std::collections::HashMap;

    fn variant(end: u64, alt: &str) -> Variant {
        Variant {
            chrom: "chr1".to_string(),
            end,
            id: ".".to_string(),
            ref_allele: "A".to_string(),
            alt_allele: alt.to_string(),
        }
    }

    fn allele(end: u64, alt: &str) -> AlleleKey {
        AlleleKey {
            key: VariantKey::new("chr1", end),
            ref_allele: "A".to_string(),
            alt_allele: alt.to_string(),
        }
    }

    fn table() -> SequenceClassTable {
        let mut rows = HashMap::new();
        rows.insert(allele(1, "G"), vec![Some(0.1), Some(-0.9)]);
        rows.insert(allele(3, "G"), vec![Some(0.3), Some(0.5)]);
        SequenceClassTable {
            score_columns: vec!["PC1".to_string(), "L1".to_string()],
            rows,
        }
    }

    #[test]
    fn test_mean_imputation() {
        let mut values = vec![Some(0.1), None, Some(0.3)];
        let fill = impute_column_mean("PC1", &mut values, AllNullPolicy::Fail).unwrap();

        assert!((fill - 0.2).abs() < 1e-12);
        assert!((values[1].unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(values[0], Some(0.1));
    }

    #[test]
    fn test_all_null_fail_policy() {
        let mut values = vec![None, None];
        let result = impute_column_mean("L1", &mut values, AllNullPolicy::Fail);

        assert!(matches!(result, Err(SequenceClassError::AllNullColumn(name)) if name == "L1"));
    }

    #[test]
    fn test_all_null_zero_policy() {
        let mut values = vec![None, None];
        let fill = impute_column_mean("L1", &mut values, AllNullPolicy::Zero).unwrap();

        assert_eq!(fill, 0.0);
        assert_eq!(values, vec![Some(0.0), Some(0.0)]);
    }

    #[test]
    fn test_merge_requires_exact_alleles() {
        // Position 1 with alt T has no class row even though 1/G does
        let mut matrix = FeatureMatrix::new(vec![variant(1, "G"), variant(2, "G"), variant(3, "G"), variant(1, "T")]);

        merge_sequence_classes(&mut matrix, &table(), AllNullPolicy::Fail).unwrap();

        let pc1 = &matrix.column("PC1").unwrap().values;
        assert_eq!(pc1[0], Some(0.1));
        assert!((pc1[1].unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(pc1[2], Some(0.3));
        assert!((pc1[3].unwrap() - 0.2).abs() < 1e-12);

        let l1 = &matrix.column("L1").unwrap().values;
        assert!((l1[1].unwrap() - (-0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_max_abs_diff_uses_imputed_values() {
        let mut matrix = FeatureMatrix::new(vec![variant(1, "G"), variant(2, "G"), variant(3, "G")]);

        merge_sequence_classes(&mut matrix, &table(), AllNullPolicy::Fail).unwrap();

        let max_abs = &matrix.column(MAX_ABS_DIFF).unwrap().values;
        assert_eq!(max_abs[0], Some(0.9));
        // Imputed row: PC1 = 0.2, L1 = -0.2
        assert!((max_abs[1].unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(max_abs[2], Some(0.5));
        assert_eq!(matrix.column_names(), vec!["PC1", "L1", MAX_ABS_DIFF]);
    }

    #[test]
    fn test_no_matches_with_fail_policy() {
        let mut matrix = FeatureMatrix::new(vec![variant(7, "C")]);

        let result = merge_sequence_classes(&mut matrix, &table(), AllNullPolicy::Fail);

        assert!(matches!(result, Err(SequenceClassError::AllNullColumn(_))));
    }

    #[test]
    fn test_empty_registry_passes_fail_policy() {
        let mut matrix = FeatureMatrix::new(vec![]);

        merge_sequence_classes(&mut matrix, &table(), AllNullPolicy::Fail).unwrap();

        assert_eq!(matrix.len(), 0);
        assert_eq!(matrix.column_names(), vec!["PC1", "L1", MAX_ABS_DIFF]);
        assert!(matrix.column("PC1").unwrap().values.is_empty());
    }
}

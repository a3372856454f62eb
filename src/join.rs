// ==============================================================================
// join.rs - Position-Keyed Table Joins
// ==============================================================================
// Description: Left and inner joins on (chrom, end) for feature tables
// Author: Matt Barham
// Created: 2026-09-04
// Modified: 2026-10-02
// Version: 1.1.0
// ==============================================================================
// Right-hand rows are matched by first occurrence of their key, so a join never
// produces more rows than its left operand.
// ==============================================================================

use clap::ValueEnum;
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

use crate::models::{FeatureColumn, FeatureMatrix, KeyedFeatureTable, VariantKey};

/// How unmatched left rows are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum JoinKind {
    /// Drop left rows without a match
    #[default]
    Inner,
    /// Keep left rows; right columns become null
    Left,
}

#[derive(Error, Debug, PartialEq)]
pub enum JoinError {
    #[error("Column '{0}' exists on both sides of the join")]
    ColumnCollision(String),
}

/// First row index for every key of the right-hand table
fn index_first(keys: &[VariantKey]) -> HashMap<&VariantKey, usize> {
    let mut index = HashMap::with_capacity(keys.len());
    for (row, key) in keys.iter().enumerate() {
        index.entry(key).or_insert(row);
    }
    index
}

fn check_collisions<'a>(
    left: impl IntoIterator<Item = &'a str>,
    right: &KeyedFeatureTable,
) -> Result<(), JoinError> {
    for name in left {
        if right.column(name).is_some() {
            return Err(JoinError::ColumnCollision(name.to_string()));
        }
    }
    Ok(())
}

/// Gather right-hand column values for each matched row
fn gather(column: &FeatureColumn, matches: &[Option<usize>]) -> FeatureColumn {
    FeatureColumn {
        name: column.name.clone(),
        kind: column.kind,
        values: matches
            .iter()
            .map(|m| m.and_then(|row| column.values[row]))
            .collect(),
    }
}

/// Join two keyed tables on (chrom, end)
pub fn join_tables(
    left: KeyedFeatureTable,
    right: &KeyedFeatureTable,
    kind: JoinKind,
) -> Result<KeyedFeatureTable, JoinError> {
    check_collisions(left.column_names(), right)?;

    let index = index_first(&right.keys);
    let matches: Vec<Option<usize>> = left.keys.iter().map(|k| index.get(k).copied()).collect();

    let left = match kind {
        JoinKind::Left => left,
        JoinKind::Inner => {
            let keep: Vec<bool> = matches.iter().map(Option::is_some).collect();
            let before = left.len();
            let kept = left.retain_rows(&keep);
            if kept.len() < before {
                info!(
                    "Inner join dropped {} of {} rows without a match",
                    before - kept.len(),
                    before
                );
            }
            kept
        }
    };
    let matches: Vec<Option<usize>> = match kind {
        JoinKind::Left => matches,
        JoinKind::Inner => matches.into_iter().filter(Option::is_some).collect(),
    };

    let mut joined = left;
    for column in &right.columns {
        joined.push_column(gather(column, &matches));
    }
    Ok(joined)
}

/// Left-join a keyed table onto the variant matrix, appending its columns
pub fn left_join_matrix(
    matrix: &mut FeatureMatrix,
    right: &KeyedFeatureTable,
) -> Result<usize, JoinError> {
    check_collisions(matrix.column_names(), right)?;

    let index = index_first(&right.keys);
    let matches: Vec<Option<usize>> = matrix
        .variants
        .iter()
        .map(|v| index.get(&v.key()).copied())
        .collect();
    let matched = matches.iter().filter(|m| m.is_some()).count();

    for column in &right.columns {
        matrix.push_column(gather(column, &matches));
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Variant;

    fn table(keys: &[(&str, u64)], name: &str, values: &[f64]) -> KeyedFeatureTable {
        let mut table =
            KeyedFeatureTable::new(keys.iter().map(|(c, e)| VariantKey::new(*c, *e)).collect());
        table.push_column(FeatureColumn::integer(
            name,
            values.iter().map(|v| Some(*v)).collect(),
        ));
        table
    }

    #[test]
    fn test_inner_join_drops_unmatched() {
        let left = table(&[("chr1", 1), ("chr1", 2), ("chr2", 3)], "a", &[1.0, 2.0, 3.0]);
        let right = table(&[("chr2", 3), ("chr1", 1)], "b", &[30.0, 10.0]);

        let joined = join_tables(left, &right, JoinKind::Inner).unwrap();

        assert_eq!(joined.len(), 2);
        assert_eq!(joined.keys[0], VariantKey::new("chr1", 1));
        assert_eq!(joined.column("b").unwrap().values, vec![Some(10.0), Some(30.0)]);
    }

    #[test]
    fn test_inner_join_never_grows() {
        // Duplicate keys on the right match only their first occurrence
        let left = table(&[("chr1", 1)], "a", &[1.0]);
        let right = table(&[("chr1", 1), ("chr1", 1)], "b", &[5.0, 6.0]);

        let joined = join_tables(left, &right, JoinKind::Inner).unwrap();

        assert_eq!(joined.len(), 1);
        assert_eq!(joined.column("b").unwrap().values, vec![Some(5.0)]);
    }

    #[test]
    fn test_left_join_keeps_all_rows() {
        let left = table(&[("chr1", 1), ("chr1", 2)], "a", &[1.0, 2.0]);
        let right = table(&[("chr1", 2)], "b", &[20.0]);

        let joined = join_tables(left, &right, JoinKind::Left).unwrap();

        assert_eq!(joined.len(), 2);
        assert_eq!(joined.column("b").unwrap().values, vec![None, Some(20.0)]);
    }

    #[test]
    fn test_column_collision() {
        let left = table(&[("chr1", 1)], "a", &[1.0]);
        let right = table(&[("chr1", 1)], "a", &[2.0]);

        assert_eq!(
            join_tables(left, &right, JoinKind::Left).unwrap_err(),
            JoinError::ColumnCollision("a".to_string())
        );
    }

    #[test]
    fn test_left_join_matrix() {
        let variants = vec![
            Variant {
                chrom: "chr1".to_string(),
                end: 100,
                id: "rs1".to_string(),
                ref_allele: "A".to_string(),
                alt_allele: "G".to_string(),
            },
            Variant {
                chrom: "chr1".to_string(),
                end: 200,
                id: "rs2".to_string(),
                ref_allele: "C".to_string(),
                alt_allele: "T".to_string(),
            },
        ];
        let mut matrix = FeatureMatrix::new(variants);
        let right = table(&[("chr1", 200)], "b", &[7.0]);

        let matched = left_join_matrix(&mut matrix, &right).unwrap();

        assert_eq!(matched, 1);
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.column("b").unwrap().values, vec![None, Some(7.0)]);
    }
}

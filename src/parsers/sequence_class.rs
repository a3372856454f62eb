// ==============================================================================
// parsers/sequence_class.rs - Sequence-Class Effect Table Parser
// ==============================================================================
// Description: Parser for precomputed sequence-class effect scores per allele
// Author: Matt Barham
// Created: 2026-09-05
// Modified: 2026-09-29
// Version: 1.0.2
// ==============================================================================
// Format: tab-delimited with header
// Example:
//   chrom  pos   id   ref  alt  strand  seqclass_max_absdiff  PC1   L1    ...
//   chr1   1000  rs1  A    G    +       0.31                  0.12  -0.31 ...
// `pos` is the 1-based position; `id`, `strand` and `seqclass_max_absdiff` are
// dropped. Every other column is a class score.
// ==============================================================================

use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::VariantKey;
use crate::parsers::open_text;

/// Columns that are read but not merged
pub const DROPPED_COLUMNS: [&str; 3] = ["seqclass_max_absdiff", "strand", "id"];

const KEY_COLUMNS: [&str; 4] = ["chrom", "pos", "ref", "alt"];

#[derive(Error, Debug)]
pub enum SequenceClassError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Sequence-class table is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("Invalid value '{value}' in column '{column}' at line {line}")]
    InvalidValue {
        line: u64,
        column: String,
        value: String,
    },

    #[error("Class-score column '{0}' has no values in this run; mean imputation is undefined")]
    AllNullColumn(String),
}

/// Allele-level join key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlleleKey {
    pub key: VariantKey,
    pub ref_allele: String,
    pub alt_allele: String,
}

/// Class scores keyed by (chrom, pos, ref, alt)
#[derive(Debug, Clone, Default)]
pub struct SequenceClassTable {
    /// Score column names in file order
    pub score_columns: Vec<String>,
    pub rows: HashMap<AlleleKey, Vec<Option<f64>>>,
}

impl SequenceClassTable {
    pub fn parse(path: impl AsRef<Path>) -> Result<Self, SequenceClassError> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(open_text(path)?);

        let headers = reader.headers()?.clone();
        let position_of = |name: &'static str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or(SequenceClassError::MissingColumn(name))
        };
        let [chrom_idx, pos_idx, ref_idx, alt_idx] = [
            position_of(KEY_COLUMNS[0])?,
            position_of(KEY_COLUMNS[1])?,
            position_of(KEY_COLUMNS[2])?,
            position_of(KEY_COLUMNS[3])?,
        ];

        let score_indices: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| is_score_column(h))
            .map(|(idx, _)| idx)
            .collect();
        let score_columns: Vec<String> = score_indices
            .iter()
            .map(|&idx| headers[idx].to_string())
            .collect();

        let mut rows = HashMap::new();
        let mut duplicates = 0usize;

        for result in reader.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();

            let end = record[pos_idx]
                .trim()
                .parse::<u64>()
                .map_err(|_| SequenceClassError::InvalidValue {
                    line,
                    column: "pos".to_string(),
                    value: record[pos_idx].to_string(),
                })?;

            let scores = score_indices
                .iter()
                .map(|&idx| {
                    parse_score(&record[idx]).ok_or_else(|| SequenceClassError::InvalidValue {
                        line,
                        column: headers[idx].to_string(),
                        value: record[idx].to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let key = AlleleKey {
                key: VariantKey::new(&record[chrom_idx], end),
                ref_allele: record[ref_idx].to_string(),
                alt_allele: record[alt_idx].to_string(),
            };

            if rows.contains_key(&key) {
                duplicates += 1;
            } else {
                rows.insert(key, scores);
            }
        }

        if duplicates > 0 {
            warn!("Ignored {} duplicate sequence-class rows (first kept)", duplicates);
        }
        info!(
            "Loaded {} sequence-class rows with {} score columns from {:?}",
            rows.len(),
            score_columns.len(),
            path
        );

        Ok(Self {
            score_columns,
            rows,
        })
    }

    pub fn get(&self, key: &AlleleKey) -> Option<&[Option<f64>]> {
        self.rows.get(key).map(Vec::as_slice)
    }
}

fn is_score_column(name: &str) -> bool {
    !KEY_COLUMNS.iter().chain(DROPPED_COLUMNS.iter()).any(|c| *c == name)
}

/// Empty, `NA` and `nan` cells are missing; anything else must be a number
fn parse_score(raw: &str) -> Option<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan") {
        return Some(None);
    }
    raw.parse::<f64>().ok().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classes.tsv");
        std::fs::write(
            &path,
            "chrom\tpos\tid\tref\talt\tstrand\tseqclass_max_absdiff\tPC1\tL1\n\
             chr1\t100\trs1\tA\tG\t+\t0.5\t0.1\t-0.5\n\
             chr1\t100\trs1\tA\tT\t+\t0.2\tNA\t0.2\n\
             chr1\t100\trs1\tA\tG\t+\t0.9\t9.0\t9.0\n",
        )
        .unwrap();

        let table = SequenceClassTable::parse(&path).unwrap();

        assert_eq!(table.score_columns, vec!["PC1", "L1"]);
        assert_eq!(table.rows.len(), 2);

        let key = AlleleKey {
            key: VariantKey::new("chr1", 100),
            ref_allele: "A".to_string(),
            alt_allele: "G".to_string(),
        };
        assert_eq!(table.get(&key).unwrap(), &[Some(0.1), Some(-0.5)]);

        let key = AlleleKey {
            alt_allele: "T".to_string(),
            ..key
        };
        assert_eq!(table.get(&key).unwrap(), &[None, Some(0.2)]);
    }

    #[test]
    fn test_missing_key_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classes.tsv");
        std::fs::write(&path, "chrom\tposition\tref\talt\tPC1\nchr1\t1\tA\tG\t0.1\n").unwrap();

        assert!(matches!(
            SequenceClassTable::parse(&path),
            Err(SequenceClassError::MissingColumn("pos"))
        ));
    }

    #[test]
    fn test_invalid_score() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classes.tsv");
        std::fs::write(&path, "chrom\tpos\tref\talt\tPC1\nchr1\t1\tA\tG\thigh\n").unwrap();

        assert!(matches!(
            SequenceClassTable::parse(&path),
            Err(SequenceClassError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_score_missing_markers() {
        assert_eq!(parse_score(""), Some(None));
        assert_eq!(parse_score("NaN"), Some(None));
        assert_eq!(parse_score("-1.5"), Some(Some(-1.5)));
        assert_eq!(parse_score("x"), None);
    }
}

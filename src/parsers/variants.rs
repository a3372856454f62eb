// ==============================================================================
// parsers/variants.rs - Variant Registry Parser
// ==============================================================================
// Description: Loads the canonical variant list that anchors every join
// Author: Matt Barham
// Created: 2026-09-02
// Modified: 2026-09-18
// Version: 1.0.1
// ==============================================================================
// Format: tab-delimited, first five columns read positionally, no header
// Example:
//   chr1    1000    rs123    A    G
//   chr1    2000    .        C    T    extra    columns    ignored
// Lines starting with '#' (VCF meta and header lines) are skipped.
// ==============================================================================

use csv::ReaderBuilder;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::models::Variant;
use crate::parsers::open_text;

#[derive(Error, Debug)]
pub enum VariantParseError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid line format at line {line}: expected at least 5 columns, found {found}")]
    InvalidFormat { line: u64, found: usize },

    #[error("Invalid position value at line {line}: {value}")]
    InvalidPosition { line: u64, value: String },
}

/// Reader for the variant registry
pub struct VariantParser;

impl VariantParser {
    /// Parse the variant file (plain or gzip-compressed)
    pub fn parse(path: impl AsRef<Path>) -> Result<Vec<Variant>, VariantParseError> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .quoting(false)
            .from_reader(open_text(path)?);

        let mut variants = Vec::new();
        for result in reader.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();

            if record.len() < 5 {
                return Err(VariantParseError::InvalidFormat {
                    line,
                    found: record.len(),
                });
            }

            let end = record[1]
                .trim()
                .parse::<u64>()
                .map_err(|_| VariantParseError::InvalidPosition {
                    line,
                    value: record[1].to_string(),
                })?;

            variants.push(Variant {
                chrom: record[0].to_string(),
                end,
                id: record[2].to_string(),
                ref_allele: record[3].to_string(),
                alt_allele: record[4].to_string(),
            });
        }

        info!("Loaded {} variants from {:?}", variants.len(), path);
        Ok(variants)
    }
}

// ==============================================================================
// parsers/organs.rs - Organ Reference Table Parsers
// ==============================================================================
// Description: Organ totals (normalization denominators) and the organ list
// Author: Matt Barham
// Created: 2026-09-05
// Modified: 2026-10-03
// Version: 1.1.0
// ==============================================================================
// Totals format: `<FAMILY>_totalNum_organ_hg38.txt`, no header
//   brain    1532
//   liver    611
// Organ list format: one organ name per line
// ==============================================================================

use csv::ReaderBuilder;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::FeatureFamily;
use crate::parsers::open_text;

/// Denominator used when an organ has no entry in a totals table
pub const PSEUDO_COUNT: f64 = 2.0;

#[derive(Error, Debug)]
pub enum OrganTotalsError {
    #[error("IO error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TSV parsing error in {path}: {source}")]
    CsvError { path: PathBuf, source: csv::Error },

    #[error("Invalid line in {path} at line {line}: expected organ and count")]
    InvalidFormat { path: PathBuf, line: u64 },

    #[error("Invalid count '{value}' in {path} at line {line}")]
    InvalidCount {
        path: PathBuf,
        line: u64,
        value: String,
    },
}

/// Total possible annotations per organ, per feature family
#[derive(Debug, Clone, Default)]
pub struct OrganTotals {
    families: HashMap<FeatureFamily, HashMap<String, f64>>,
}

impl OrganTotals {
    /// File name of a family's totals table
    pub fn file_name(family: FeatureFamily) -> String {
        format!("{}_totalNum_organ_hg38.txt", family.as_str())
    }

    /// Load every family's totals table from `dir`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, OrganTotalsError> {
        let dir = dir.as_ref();
        let mut totals = Self::default();

        for family in FeatureFamily::all() {
            let path = dir.join(Self::file_name(family));
            let table = Self::parse_table(&path)?;
            debug!("Loaded {} organ totals for {}", table.len(), family.as_str());
            totals.families.insert(family, table);
        }

        info!("Loaded organ totals for {} feature families from {:?}", totals.families.len(), dir);
        Ok(totals)
    }

    fn parse_table(path: &Path) -> Result<HashMap<String, f64>, OrganTotalsError> {
        let io_err = |source| OrganTotalsError::IoError {
            path: path.to_path_buf(),
            source,
        };
        let csv_err = |source| OrganTotalsError::CsvError {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(open_text(path).map_err(io_err)?);

        let mut table = HashMap::new();
        for result in reader.records() {
            let record = result.map_err(csv_err)?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();

            if record.len() < 2 {
                return Err(OrganTotalsError::InvalidFormat {
                    path: path.to_path_buf(),
                    line,
                });
            }

            let count = record[1]
                .trim()
                .parse::<f64>()
                .map_err(|_| OrganTotalsError::InvalidCount {
                    path: path.to_path_buf(),
                    line,
                    value: record[1].to_string(),
                })?;
            table.insert(record[0].to_string(), count);
        }

        Ok(table)
    }

    /// Insert or replace one entry
    pub fn insert(&mut self, family: FeatureFamily, organ: impl Into<String>, count: f64) {
        self.families
            .entry(family)
            .or_default()
            .insert(organ.into(), count);
    }

    pub fn get(&self, family: FeatureFamily, organ: &str) -> Option<f64> {
        self.families.get(&family)?.get(organ).copied()
    }

    /// Normalization denominator: the organ's total, or the pseudo-count when absent
    pub fn denominator(&self, family: FeatureFamily, organ: &str) -> f64 {
        self.get(family, organ).unwrap_or(PSEUDO_COUNT)
    }
}

/// Load the newline-delimited list of organs the models can score
pub fn load_organ_list(path: impl AsRef<Path>) -> std::io::Result<Vec<String>> {
    let path = path.as_ref();
    let mut organs = Vec::new();

    for line in open_text(path)?.lines() {
        let line = line?;
        let organ = line.trim();
        if !organ.is_empty() {
            organs.push(organ.to_string());
        }
    }

    debug!("Loaded {} organs from {:?}", organs.len(), path);
    Ok(organs)
}

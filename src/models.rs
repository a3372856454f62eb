// ==============================================================================
// models.rs - Variant and Feature Table Data Models
// ==============================================================================
// Description: Data structures shared by every stage of the feature pipeline
// Author: Matt Barham
// Created: 2026-09-02
// Modified: 2026-10-09
// Version: 1.2.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Join key used by every position-level join: (contig, 1-based end)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    pub chrom: String,
    pub end: u64,
}

impl VariantKey {
    pub fn new(chrom: impl Into<String>, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            end,
        }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chrom, self.end)
    }
}

/// A variant from the registry that anchors every join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Contig name as written in the input (e.g., "chr1")
    pub chrom: String,

    /// 1-based position ("end" of the single-base interval)
    pub end: u64,

    /// Variant identifier (rsID or ".")
    pub id: String,

    /// Reference allele
    pub ref_allele: String,

    /// Alternate allele
    pub alt_allele: String,
}

impl Variant {
    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.chrom.clone(), self.end)
    }
}

/// Physical type a feature column is stored as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Indicators and counts (Int64 in Parquet)
    Integer,
    /// Signals, scores and ratios (Float64 in Parquet)
    Float,
}

/// One named, nullable feature column
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: ColumnKind,
    pub values: Vec<Option<f64>>,
}

impl FeatureColumn {
    pub fn new(name: impl Into<String>, kind: ColumnKind, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn integer(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnKind::Integer, values)
    }

    pub fn float(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnKind::Float, values)
    }

    /// Summary statistics over the non-null cells
    pub fn summary(&self) -> ColumnSummary {
        let present: Vec<f64> = self.values.iter().flatten().copied().collect();
        let mean = if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        };

        ColumnSummary {
            name: self.name.clone(),
            non_null: present.len(),
            nulls: self.values.len() - present.len(),
            mean,
            min: present.iter().copied().reduce(f64::min),
            max: present.iter().copied().reduce(f64::max),
        }
    }
}

/// Per-column statistics logged after assembly
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub non_null: usize,
    pub nulls: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Per-variant feature matrix: one row per registry variant, column-oriented
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    pub variants: Vec<Variant>,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureMatrix {
    pub fn new(variants: Vec<Variant>) -> Self {
        Self {
            variants,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Append a column; its length must match the row count
    pub fn push_column(&mut self, column: FeatureColumn) {
        assert_eq!(
            column.values.len(),
            self.variants.len(),
            "column '{}' has {} values for {} rows",
            column.name,
            column.values.len(),
            self.variants.len()
        );
        self.columns.push(column);
    }

    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = VariantKey> + '_ {
        self.variants.iter().map(Variant::key)
    }

    pub fn summaries(&self) -> Vec<ColumnSummary> {
        self.columns.iter().map(FeatureColumn::summary).collect()
    }
}

/// Feature table keyed by position only (organ-specific and annotation tables)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyedFeatureTable {
    pub keys: Vec<VariantKey>,
    pub columns: Vec<FeatureColumn>,
}

impl KeyedFeatureTable {
    pub fn new(keys: Vec<VariantKey>) -> Self {
        Self {
            keys,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Append a column; its length must match the row count
    pub fn push_column(&mut self, column: FeatureColumn) {
        assert_eq!(
            column.values.len(),
            self.keys.len(),
            "column '{}' has {} values for {} rows",
            column.name,
            column.values.len(),
            self.keys.len()
        );
        self.columns.push(column);
    }

    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Keep only the first row for each key, preserving order
    pub fn dedup_by_key(self) -> Self {
        let mut seen = std::collections::HashSet::new();
        let keep: Vec<bool> = self.keys.iter().map(|k| seen.insert(k.clone())).collect();
        self.retain_rows(&keep)
    }

    /// Keep rows whose mask entry is true
    pub fn retain_rows(self, keep: &[bool]) -> Self {
        let keys = self
            .keys
            .into_iter()
            .zip(keep)
            .filter_map(|(k, &flag)| flag.then_some(k))
            .collect();
        let columns = self
            .columns
            .into_iter()
            .map(|c| FeatureColumn {
                values: c
                    .values
                    .into_iter()
                    .zip(keep)
                    .filter_map(|(v, &flag)| flag.then_some(v))
                    .collect(),
                ..c
            })
            .collect();

        Self { keys, columns }
    }
}

/// Histone marks emitted as organ-specific features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoneMark {
    H3K27ac,
    H3K36me3,
    H3K4me1,
    H3K4me3,
    H3K27me3,
}

impl HistoneMark {
    pub const ALL: [HistoneMark; 5] = [
        HistoneMark::H3K27ac,
        HistoneMark::H3K36me3,
        HistoneMark::H3K4me1,
        HistoneMark::H3K4me3,
        HistoneMark::H3K27me3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoneMark::H3K27ac => "H3K27ac",
            HistoneMark::H3K36me3 => "H3K36me3",
            HistoneMark::H3K4me1 => "H3K4me1",
            HistoneMark::H3K4me3 => "H3K4me3",
            HistoneMark::H3K27me3 => "H3K27me3",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == label)
    }
}

/// Feature families with an organ totals table (normalization denominators)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFamily {
    Dnase,
    /// Transcription-factor ChIP-seq
    Tf,
    Ctcf,
    Histone(HistoneMark),
}

impl FeatureFamily {
    pub fn all() -> Vec<FeatureFamily> {
        let mut families = vec![FeatureFamily::Dnase, FeatureFamily::Tf, FeatureFamily::Ctcf];
        families.extend(HistoneMark::ALL.into_iter().map(FeatureFamily::Histone));
        families
    }

    /// Name used in the totals file name (`<name>_totalNum_organ_hg38.txt`)
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFamily::Dnase => "DNASE",
            FeatureFamily::Tf => "TF",
            FeatureFamily::Ctcf => "CTCF",
            FeatureFamily::Histone(mark) => mark.as_str(),
        }
    }
}

// ==============================================================================
// config.rs - Pipeline Configuration
// ==============================================================================
// Description: Resolved input paths and policies consumed by the pipeline
// Author: Matt Barham
// Created: 2026-09-20
// Modified: 2026-10-08
// Version: 1.0.1
// ==============================================================================

use std::path::{Path, PathBuf};

use crate::class_merge::AllNullPolicy;
use crate::join::JoinKind;

/// Inputs of the generic (organ-agnostic) feature stage
#[derive(Debug, Clone)]
pub struct GenericInputs {
    pub variants: PathBuf,
    pub sequence_classes: PathBuf,
    pub dnase_dir: PathBuf,
    pub chip_dir: PathBuf,
    pub all_null_policy: AllNullPolicy,
}

/// Inputs of the organ-specific stage
#[derive(Debug, Clone)]
pub struct OrganInputs {
    pub organ_dnase_dir: PathBuf,
    pub totals_dir: PathBuf,
    /// Combines the counts, CTCF and histone tables
    pub join_kind: JoinKind,
}

/// Organ vocabulary and model artifacts
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub organ_list: PathBuf,
    pub models_dir: PathBuf,
    /// Replaces the built-in data-rich organ table
    pub data_rich_organs: Option<PathBuf>,
}

/// Everything a full run needs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub annotations: PathBuf,
    pub generic: GenericInputs,
    pub organ: OrganInputs,
    pub models: ModelInputs,
}

/// Output locations of a run, one set of organ files per organ
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub out_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn features(&self) -> PathBuf {
        self.out_dir.join("features.parquet")
    }

    pub fn organ_features(&self, organ: &str) -> PathBuf {
        self.out_dir.join(format!("organ_{}.parquet", file_stem(organ)))
    }

    pub fn predictions(&self, organ: &str) -> PathBuf {
        self.out_dir.join(format!("predictions_{}.tsv.gz", file_stem(organ)))
    }

    pub fn dir(&self) -> &Path {
        &self.out_dir
    }
}

/// Organ names contain spaces ("bodily fluid")
fn file_stem(organ: &str) -> String {
    organ.replace(|c: char| c.is_whitespace() || c == '/', "_")
}

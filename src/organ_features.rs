// ==============================================================================
// organ_features.rs - Organ-Specific Annotation Aggregator
// ==============================================================================
// Description: Per-organ peak counts, normalized ratios and organ DNase signals
// Author: Matt Barham
// Created: 2026-09-12
// Modified: 2026-10-09
// Version: 1.2.0
// ==============================================================================
// Passes (one row per annotation record each, run concurrently):
//   counts   DNase-seq / footprints / ChIP-seq (POLR* excluded)
//   ctcf     ChIP-seq peaks whose first target is CTCF*
//   histone  Histone ChIP-seq peaks by mark
// The three tables are joined on (chrom, end) with `join_kind`, organ signal
// tracks are sampled onto the result, and duplicate positions are dropped.
// ==============================================================================

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::generic_features::DNASE_SIGNALS;
use crate::join::{join_tables, JoinError, JoinKind};
use crate::models::{FeatureColumn, FeatureFamily, HistoneMark, KeyedFeatureTable, VariantKey};
use crate::parsers::{AnnotationRecord, OrganTotals, PeakMethod, PeakRecord};
use crate::signal_track::{sample_file, SignalTrackError, SignalTrackOpener};

/// Target recorded for a ChIP-seq peak with an empty target list
pub const EMPTY_TARGET: &str = "NA";

#[derive(Error, Debug)]
pub enum OrganFeatureError {
    #[error(transparent)]
    SignalTrack(#[from] SignalTrackError),

    #[error(transparent)]
    Join(#[from] JoinError),
}

/// Counts pass result for one variant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeakCounts {
    pub dnase: u64,
    pub footprint: u64,
    pub chip: u64,
    pub chip_targets: HashSet<String>,
    pub chip_biosamples: HashSet<String>,
    pub dnase_biosamples: HashSet<String>,
}

impl PeakCounts {
    pub fn from_peaks(peaks: &[PeakRecord], organ: &str) -> Self {
        let mut counts = Self::default();

        for peak in peaks {
            match peak.method {
                Some(PeakMethod::DnaseSeq) => {
                    if peak.in_organ(organ) != Some(true) {
                        continue;
                    }
                    counts.dnase += 1;
                    if let Some(biosample) = &peak.biosample_term_name {
                        counts.dnase_biosamples.insert(biosample.clone());
                    }
                }
                Some(PeakMethod::Footprints) => {
                    if peak.in_organ(organ) == Some(true) {
                        counts.footprint += 1;
                    }
                }
                Some(PeakMethod::ChipSeq) => {
                    let Some(targets) = &peak.targets else {
                        continue;
                    };
                    let target = targets.first().map(String::as_str).unwrap_or(EMPTY_TARGET);
                    if target.starts_with("POLR") {
                        continue;
                    }
                    if peak.in_organ(organ) != Some(true) {
                        continue;
                    }
                    counts.chip += 1;
                    counts.chip_targets.insert(target.to_string());
                    // A peak without a biosample still counts; only the biosample set misses it
                    if let Some(biosample) = &peak.biosample_term_name {
                        counts.chip_biosamples.insert(biosample.clone());
                    }
                }
                _ => {}
            }
        }

        counts
    }
}

/// CTCF pass result for one variant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CtcfCounts {
    pub peaks: u64,
    pub biosamples: HashSet<String>,
}

impl CtcfCounts {
    pub fn from_peaks(peaks: &[PeakRecord], organ: &str) -> Self {
        let mut counts = Self::default();

        for peak in peaks {
            if peak.method != Some(PeakMethod::ChipSeq) {
                continue;
            }
            // Empty target lists are skipped here, unlike the counts pass
            let is_ctcf = peak.first_target().is_some_and(|t| t.starts_with("CTCF"));
            if !is_ctcf {
                continue;
            }
            if peak.in_organ(organ) != Some(true) {
                continue;
            }
            counts.peaks += 1;
            if let Some(biosample) = &peak.biosample_term_name {
                counts.biosamples.insert(biosample.clone());
            }
        }

        counts
    }
}

/// Histone pass result for one variant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoneCounts {
    /// Indexed like `HistoneMark::ALL`
    pub marks: [u64; 5],
    /// Peaks with a mark outside the emitted vocabulary
    pub other: u64,
}

impl HistoneCounts {
    pub fn from_peaks(peaks: &[PeakRecord], organ: &str) -> Self {
        let mut counts = Self::default();

        for peak in peaks {
            if peak.method != Some(PeakMethod::HistoneChipSeq) || peak.in_organ(organ) != Some(true) {
                continue;
            }
            let Some(label) = &peak.target_label else {
                continue;
            };
            match HistoneMark::from_label(label) {
                Some(mark) => counts.marks[mark_index(mark)] += 1,
                None => counts.other += 1,
            }
        }

        counts
    }

    pub fn get(&self, mark: HistoneMark) -> u64 {
        self.marks[mark_index(mark)]
    }
}

fn mark_index(mark: HistoneMark) -> usize {
    HistoneMark::ALL.iter().position(|m| *m == mark).unwrap_or_default()
}

fn count_column(name: impl Into<String>, counts: impl Iterator<Item = u64>) -> FeatureColumn {
    FeatureColumn::integer(name, counts.map(|c| Some(c as f64)).collect())
}

/// `<name>_perc` = raw count / organ total (or the pseudo-count)
fn perc_column(raw: &FeatureColumn, denominator: f64) -> FeatureColumn {
    FeatureColumn::float(
        format!("{}_perc", raw.name),
        raw.values.iter().map(|v| v.map(|c| c / denominator)).collect(),
    )
}

fn keys_of(records: &[AnnotationRecord]) -> Vec<VariantKey> {
    records.iter().map(|r| r.key.clone()).collect()
}

/// Organ-specific features for one organ
#[derive(Debug, Clone)]
pub struct OrganAggregator<'a> {
    pub organ: &'a str,
    pub totals: &'a OrganTotals,
    /// How the counts, CTCF and histone tables are combined
    pub join_kind: JoinKind,
}

impl<'a> OrganAggregator<'a> {
    pub fn new(organ: &'a str, totals: &'a OrganTotals) -> Self {
        Self {
            organ,
            totals,
            join_kind: JoinKind::Inner,
        }
    }

    pub fn with_join_kind(mut self, join_kind: JoinKind) -> Self {
        self.join_kind = join_kind;
        self
    }

    fn denominator(&self, family: FeatureFamily) -> f64 {
        self.totals.denominator(family, self.organ)
    }

    pub fn counts_table(&self, records: &[AnnotationRecord]) -> KeyedFeatureTable {
        let counts: Vec<PeakCounts> = records
            .iter()
            .map(|r| PeakCounts::from_peaks(&r.peaks, self.organ))
            .collect();

        let mut table = KeyedFeatureTable::new(keys_of(records));
        table.push_column(count_column("DNASE_organSp", counts.iter().map(|c| c.dnase)));
        table.push_column(count_column("FOOTPRINT_organSp", counts.iter().map(|c| c.footprint)));
        table.push_column(count_column("CHIP_organSp", counts.iter().map(|c| c.chip)));
        table.push_column(count_column(
            "CHIP_organSp_uniq",
            counts.iter().map(|c| c.chip_targets.len() as u64),
        ));
        table.push_column(count_column(
            "CHIP_organSp_biosample_uniq",
            counts.iter().map(|c| c.chip_biosamples.len() as u64),
        ));
        table.push_column(count_column(
            "DNASE_organSp_biosample_uniq",
            counts.iter().map(|c| c.dnase_biosamples.len() as u64),
        ));

        let chip_perc = perc_column(&table.columns[2], self.denominator(FeatureFamily::Tf));
        let dnase_perc = perc_column(&table.columns[0], self.denominator(FeatureFamily::Dnase));
        table.push_column(chip_perc);
        table.push_column(dnase_perc);
        table
    }

    pub fn ctcf_table(&self, records: &[AnnotationRecord]) -> KeyedFeatureTable {
        let counts: Vec<CtcfCounts> = records
            .iter()
            .map(|r| CtcfCounts::from_peaks(&r.peaks, self.organ))
            .collect();

        let mut table = KeyedFeatureTable::new(keys_of(records));
        table.push_column(count_column("CTCF_organSp", counts.iter().map(|c| c.peaks)));
        table.push_column(count_column(
            "CTCF_organSp_biosample_uniq",
            counts.iter().map(|c| c.biosamples.len() as u64),
        ));
        let perc = perc_column(&table.columns[0], self.denominator(FeatureFamily::Ctcf));
        table.push_column(perc);
        table
    }

    pub fn histone_table(&self, records: &[AnnotationRecord]) -> KeyedFeatureTable {
        let counts: Vec<HistoneCounts> = records
            .iter()
            .map(|r| HistoneCounts::from_peaks(&r.peaks, self.organ))
            .collect();

        let mut table = KeyedFeatureTable::new(keys_of(records));
        for mark in HistoneMark::ALL {
            table.push_column(count_column(
                format!("{}_organSp", mark.as_str()),
                counts.iter().map(|c| c.get(mark)),
            ));
        }
        for (idx, mark) in HistoneMark::ALL.into_iter().enumerate() {
            let perc = perc_column(&table.columns[idx], self.denominator(FeatureFamily::Histone(mark)));
            table.push_column(perc);
        }

        let other: u64 = counts.iter().map(|c| c.other).sum();
        if other > 0 {
            debug!("{} histone peaks in {} carry marks that are not emitted", other, self.organ);
        }
        table
    }

    /// Run the three count passes concurrently and join them
    pub fn count_features(&self, records: &[AnnotationRecord]) -> Result<KeyedFeatureTable, JoinError> {
        let (counts, (ctcf, histone)) = rayon::join(
            || self.counts_table(records),
            || rayon::join(|| self.ctcf_table(records), || self.histone_table(records)),
        );

        let joined = join_tables(counts, &ctcf, self.join_kind)?;
        join_tables(joined, &histone, self.join_kind)
    }

    /// Full organ table: counts, ratios, organ DNase signals, one row per position
    pub fn aggregate<O: SignalTrackOpener>(
        &self,
        records: &[AnnotationRecord],
        signal_dir: &Path,
        opener: &O,
    ) -> Result<KeyedFeatureTable, OrganFeatureError> {
        info!("Aggregating organ-specific features for '{}' from {} records", self.organ, records.len());

        let mut table = self.count_features(records)?;

        for feature in DNASE_SIGNALS {
            let path = organ_track_path(signal_dir, feature, self.organ);
            let values = sample_file(opener, &path, &table.keys)?;
            table.push_column(FeatureColumn::float(format!("{}_organSp", feature), values));
        }

        let before = table.len();
        let table = table.dedup_by_key();
        info!(
            "Organ table for '{}': {} positions ({} duplicate rows dropped)",
            self.organ,
            table.len(),
            before - table.len()
        );
        Ok(table)
    }
}

/// `<dir>/<feature>_<organ>.bw`
pub fn organ_track_path(dir: &Path, feature: &str, organ: &str) -> PathBuf {
    dir.join(format!("{}_{}.bw", feature, organ))
}

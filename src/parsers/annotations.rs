// ==============================================================================
// parsers/annotations.rs - Regulatory Annotation Record Parser
// ==============================================================================
// Description: Parser for per-variant JSON Lines annotation records (generic
//              indicators plus nested experimental peaks)
// Author: Matt Barham
// Created: 2026-09-03
// Modified: 2026-10-08
// Version: 1.2.0
// ==============================================================================
// Format: one JSON object per line, blank lines allowed
// Example:
//   {"chrom": "chr1", "end": 1000,
//    "features": {"ChIP": true, "Chromatin_accessibility": false, ...},
//    "peaks": [{"method": "ChIP-seq", "organ_slims": ["brain"],
//               "targets": ["CTCF"], "biosample_term_name": "cortex"}]}
// ==============================================================================

use serde_json::{Map, Value};
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::VariantKey;
use crate::parsers::open_text;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Annotation record at line {line} ({key}) is missing generic indicator '{field}'")]
    MissingIndicator {
        line: usize,
        key: VariantKey,
        field: &'static str,
    },

    #[error("Annotation record at line {line} ({key}) has non-numeric indicator '{field}': {value}")]
    InvalidIndicator {
        line: usize,
        key: VariantKey,
        field: &'static str,
        value: String,
    },
}

/// Generic indicator fields every annotation record must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericIndicator {
    Chip,
    ChromatinAccessibility,
    Pwm,
    Footprint,
    Qtl,
    PwmMatched,
    FootprintMatched,
    IcMatchedMax,
    IcMax,
}

impl GenericIndicator {
    pub const ALL: [GenericIndicator; 9] = [
        GenericIndicator::Chip,
        GenericIndicator::ChromatinAccessibility,
        GenericIndicator::Pwm,
        GenericIndicator::Footprint,
        GenericIndicator::Qtl,
        GenericIndicator::PwmMatched,
        GenericIndicator::FootprintMatched,
        GenericIndicator::IcMatchedMax,
        GenericIndicator::IcMax,
    ];

    /// Key inside the record's `features` object
    pub fn json_key(&self) -> &'static str {
        match self {
            GenericIndicator::Chip => "ChIP",
            GenericIndicator::ChromatinAccessibility => "Chromatin_accessibility",
            GenericIndicator::Pwm => "PWM",
            GenericIndicator::Footprint => "Footprint",
            GenericIndicator::Qtl => "QTL",
            GenericIndicator::PwmMatched => "PWM_matched",
            GenericIndicator::FootprintMatched => "Footprint_matched",
            GenericIndicator::IcMatchedMax => "IC_matched_max",
            GenericIndicator::IcMax => "IC_max",
        }
    }

    /// Feature column name the models were trained with
    pub fn column(&self) -> &'static str {
        match self {
            GenericIndicator::Chip => "CHIP",
            GenericIndicator::ChromatinAccessibility => "DNASE",
            GenericIndicator::Pwm => "PWM",
            GenericIndicator::Footprint => "FOOTPRINT",
            GenericIndicator::Qtl => "EQTL_2",
            GenericIndicator::PwmMatched => "PWM_matched",
            GenericIndicator::FootprintMatched => "FOOTPRINT_matched",
            GenericIndicator::IcMatchedMax => "IC_matched_max",
            GenericIndicator::IcMax => "IC_max",
        }
    }
}

/// Experimental method of a peak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeakMethod {
    DnaseSeq,
    Footprints,
    ChipSeq,
    HistoneChipSeq,
    Other,
}

impl PeakMethod {
    pub fn parse(method: &str) -> Self {
        match method {
            "DNase-seq" => PeakMethod::DnaseSeq,
            "footprints" => PeakMethod::Footprints,
            "ChIP-seq" => PeakMethod::ChipSeq,
            "Histone ChIP-seq" => PeakMethod::HistoneChipSeq,
            _ => PeakMethod::Other,
        }
    }
}

/// One experimental peak overlapping a variant; every field may be absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeakRecord {
    pub method: Option<PeakMethod>,
    pub organ_slims: Option<Vec<String>>,
    pub targets: Option<Vec<String>>,
    pub biosample_term_name: Option<String>,
    pub target_label: Option<String>,
}

impl PeakRecord {
    /// Read fields one by one; a field with the wrong JSON type counts as absent
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        Self {
            method: object.get("method").and_then(Value::as_str).map(PeakMethod::parse),
            organ_slims: object.get("organ_slims").and_then(string_list),
            targets: object.get("targets").and_then(string_list),
            biosample_term_name: object
                .get("biosample_term_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            target_label: object
                .get("target_label")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// True when the peak's organ slims include `organ`; absent slims never match
    pub fn in_organ(&self, organ: &str) -> Option<bool> {
        self.organ_slims
            .as_ref()
            .map(|slims| slims.iter().any(|s| s == organ))
    }

    /// First target, if the target list is present and non-empty
    pub fn first_target(&self) -> Option<&str> {
        self.targets.as_ref()?.first().map(String::as_str)
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// A parsed annotation line
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    /// 1-based line number in the source file
    pub line: usize,
    pub key: VariantKey,
    pub features: Option<Map<String, Value>>,
    pub peaks: Vec<PeakRecord>,
}

impl AnnotationRecord {
    /// Parse one non-blank line; None when the line is not a usable record
    pub fn parse_line(line: &str, line_number: usize) -> Option<Self> {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        let object = value.as_object()?;

        let chrom = object.get("chrom")?.as_str()?.to_string();
        let end = object.get("end").and_then(position_value)?;

        let features = object.get("features").and_then(Value::as_object).cloned();
        let peaks = object
            .get("peaks")
            .and_then(Value::as_array)
            .map(|peaks| peaks.iter().map(PeakRecord::from_value).collect())
            .unwrap_or_default();

        Some(Self {
            line: line_number,
            key: VariantKey::new(chrom, end),
            features,
            peaks,
        })
    }

    /// Extract the nine generic indicators in `GenericIndicator::ALL` order
    pub fn generic_indicators(&self) -> Result<[i64; 9], AnnotationError> {
        let mut out = [0i64; 9];
        for (slot, indicator) in out.iter_mut().zip(GenericIndicator::ALL) {
            let field = indicator.json_key();
            let value = self
                .features
                .as_ref()
                .and_then(|f| f.get(field))
                .ok_or_else(|| AnnotationError::MissingIndicator {
                    line: self.line,
                    key: self.key.clone(),
                    field,
                })?;

            *slot = coerce_indicator(value).ok_or_else(|| AnnotationError::InvalidIndicator {
                line: self.line,
                key: self.key.clone(),
                field,
                value: value.to_string(),
            })?;
        }
        Ok(out)
    }
}

/// Positions may be written as integers or integral floats
fn position_value(value: &Value) -> Option<u64> {
    if let Some(v) = value.as_u64() {
        return Some(v);
    }
    let v = value.as_f64()?;
    (v >= 0.0 && v.fract() == 0.0).then_some(v as u64)
}

/// Booleans become 0/1, numbers are truncated toward zero
fn coerce_indicator(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        _ => None,
    }
}

/// All usable records of an annotation file
#[derive(Debug, Clone, Default)]
pub struct AnnotationSet {
    pub records: Vec<AnnotationRecord>,
    /// Non-blank lines that could not be parsed
    pub skipped_lines: usize,
}

/// Reader for JSON Lines annotation files
pub struct AnnotationReader;

impl AnnotationReader {
    /// Read every record, skipping blank and malformed lines
    pub fn read(path: impl AsRef<Path>) -> Result<AnnotationSet, AnnotationError> {
        let path = path.as_ref();
        let set = Self::read_from(open_text(path)?)?;

        info!(
            "Read {} annotation records from {:?} ({} malformed lines skipped)",
            set.records.len(),
            path,
            set.skipped_lines
        );
        Ok(set)
    }

    pub fn read_from(reader: impl BufRead) -> Result<AnnotationSet, AnnotationError> {
        let mut set = AnnotationSet::default();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = idx + 1;

            if line.trim().is_empty() {
                continue;
            }

            match AnnotationRecord::parse_line(&line, line_number) {
                Some(record) => set.records.push(record),
                None => {
                    warn!("Skipping malformed annotation line {}", line_number);
                    set.skipped_lines += 1;
                }
            }
        }

        debug!("Parsed {} annotation records", set.records.len());
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn features_json() -> Value {
        json!({
            "ChIP": true,
            "Chromatin_accessibility": false,
            "PWM": true,
            "Footprint": false,
            "QTL": false,
            "PWM_matched": true,
            "Footprint_matched": false,
            "IC_matched_max": 1.7,
            "IC_max": 0
        })
    }

    #[test]
    fn test_read_skips_blank_and_malformed_lines() {
        let input = format!(
            "{}\n\n{{not json\n{}\n",
            json!({"chrom": "chr1", "end": 100, "features": features_json(), "peaks": []}),
            json!({"chrom": "chr2", "end": 200.0, "peaks": []}),
        );

        let set = AnnotationReader::read_from(input.as_bytes()).unwrap();

        assert_eq!(set.records.len(), 2);
        assert_eq!(set.skipped_lines, 1);
        assert_eq!(set.records[0].key, VariantKey::new("chr1", 100));
        assert_eq!(set.records[1].key, VariantKey::new("chr2", 200));
        assert_eq!(set.records[1].line, 4);
    }

    #[test]
    fn test_record_without_position_is_skipped() {
        let input = format!("{}\n", json!({"chrom": "chr1", "peaks": []}));
        let set = AnnotationReader::read_from(input.as_bytes()).unwrap();

        assert!(set.records.is_empty());
        assert_eq!(set.skipped_lines, 1);
    }

    #[test]
    fn test_generic_indicator_coercion() {
        let line = json!({"chrom": "chr1", "end": 5, "features": features_json()}).to_string();
        let record = AnnotationRecord::parse_line(&line, 1).unwrap();

        assert_eq!(record.generic_indicators().unwrap(), [1, 0, 1, 0, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_missing_indicator_is_fatal() {
        let mut features = features_json();
        features.as_object_mut().unwrap().remove("QTL");
        let line = json!({"chrom": "chr1", "end": 5, "features": features}).to_string();
        let record = AnnotationRecord::parse_line(&line, 3).unwrap();

        match record.generic_indicators() {
            Err(AnnotationError::MissingIndicator { line, field, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(field, "QTL");
            }
            other => panic!("expected MissingIndicator, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_indicator_is_fatal() {
        let mut features = features_json();
        features["PWM"] = json!("yes");
        let line = json!({"chrom": "chr1", "end": 5, "features": features}).to_string();
        let record = AnnotationRecord::parse_line(&line, 1).unwrap();

        assert!(matches!(
            record.generic_indicators(),
            Err(AnnotationError::InvalidIndicator { field: "PWM", .. })
        ));
    }

    #[test]
    fn test_peak_fields_are_independent() {
        let peak = PeakRecord::from_value(&json!({
            "method": "ChIP-seq",
            "organ_slims": ["brain", 3],
            "targets": ["CTCF-human"],
            "biosample_term_name": 42
        }));

        assert_eq!(peak.method, Some(PeakMethod::ChipSeq));
        assert_eq!(peak.organ_slims, None);
        assert_eq!(peak.first_target(), Some("CTCF-human"));
        assert_eq!(peak.biosample_term_name, None);
        assert_eq!(peak.in_organ("brain"), None);
    }

    #[test]
    fn test_peak_method_vocabulary() {
        assert_eq!(PeakMethod::parse("DNase-seq"), PeakMethod::DnaseSeq);
        assert_eq!(PeakMethod::parse("footprints"), PeakMethod::Footprints);
        assert_eq!(PeakMethod::parse("Histone ChIP-seq"), PeakMethod::HistoneChipSeq);
        assert_eq!(PeakMethod::parse("ATAC-seq"), PeakMethod::Other);
    }

    #[test]
    fn test_non_object_peak_has_no_fields() {
        assert_eq!(PeakRecord::from_value(&json!("peak")), PeakRecord::default());
    }
}

// ==============================================================================
// parsers/mod.rs - Input file parser modules
// ==============================================================================
// Description: Parsers for variant, annotation and reference table formats
// Author: Matt Barham
// Created: 2026-09-02
// Modified: 2026-10-01
// Version: 1.2.0
// ==============================================================================

pub mod variants;
pub mod annotations;
pub mod sequence_class;
pub mod organs;

pub use variants::{VariantParser, VariantParseError};
pub use annotations::{
    AnnotationError, AnnotationReader, AnnotationRecord, AnnotationSet, GenericIndicator,
    PeakMethod, PeakRecord,
};
pub use sequence_class::{SequenceClassError, SequenceClassTable};
pub use organs::{load_organ_list, OrganTotals, OrganTotalsError, PSEUDO_COUNT};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Open a text input, decompressing `.gz` files (plain gzip or BGZF)
pub fn open_text(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;

    let reader: Box<dyn BufRead> = if path.extension() == Some(std::ffi::OsStr::new("gz")) {
        Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(reader)
}

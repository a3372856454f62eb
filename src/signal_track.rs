// ==============================================================================
// signal_track.rs - Genome-Wide Signal Track Access
// ==============================================================================
// Description: Point lookups into indexed numeric tracks (bigWig)
// Author: Matt Barham
// Created: 2026-09-03
// Modified: 2026-10-06
// Version: 1.1.0
// ==============================================================================
// Tracks are queried with 0-based half-open coordinates. A variant at 1-based
// position P is read at [P-1, P). Readers release their file handle on drop.
// ==============================================================================

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use bigtools::utils::reopen::ReopenableFile;
use bigtools::BigWigRead;

use crate::models::VariantKey;

/// Decimal digits kept for every sampled signal value
pub const SIGNAL_DECIMALS: i32 = 4;

#[derive(Error, Debug)]
pub enum SignalTrackError {
    #[error("Failed to open signal track {path}: {details}")]
    Open { path: PathBuf, details: String },
}

/// Range-query capability over a numeric track
pub trait SignalTrack {
    /// Value covering [start, end) on `chrom`, or None when the track has no data
    fn value_at(&mut self, chrom: &str, start: u64, end: u64) -> Option<f64>;
}

/// Opens tracks by path; shared across organ workers
pub trait SignalTrackOpener: Sync {
    type Track: SignalTrack;

    fn open(&self, path: &Path) -> Result<Self::Track, SignalTrackError>;
}

/// bigWig-backed track
pub struct BigWigTrack {
    reader: BigWigRead<ReopenableFile>,
}

impl SignalTrack for BigWigTrack {
    fn value_at(&mut self, chrom: &str, start: u64, end: u64) -> Option<f64> {
        let start = u32::try_from(start).ok()?;
        let end = u32::try_from(end).ok()?;

        // Unknown contigs and read errors surface as missing values
        let values = self.reader.values(chrom, start, end).ok()?;
        values
            .first()
            .map(|v| f64::from(*v))
            .filter(|v| v.is_finite())
    }
}

/// Opens bigWig files from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct BigWigOpener;

impl SignalTrackOpener for BigWigOpener {
    type Track = BigWigTrack;

    fn open(&self, path: &Path) -> Result<BigWigTrack, SignalTrackError> {
        let path_str = path.to_str().ok_or_else(|| SignalTrackError::Open {
            path: path.to_path_buf(),
            details: "path is not valid UTF-8".to_string(),
        })?;

        let reader = BigWigRead::open_file(path_str).map_err(|e| SignalTrackError::Open {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;

        debug!("Opened signal track {:?}", path);
        Ok(BigWigTrack { reader })
    }
}

/// Round to the fixed number of signal decimals
pub fn round_signal(value: f64) -> f64 {
    let factor = 10f64.powi(SIGNAL_DECIMALS);
    (value * factor).round() / factor
}

/// Sample one track at every key, rounding each value
pub fn sample_track<'a, T: SignalTrack>(
    track: &mut T,
    keys: impl IntoIterator<Item = &'a VariantKey>,
) -> Vec<Option<f64>> {
    keys.into_iter()
        .map(|key| {
            key.end
                .checked_sub(1)
                .and_then(|start| track.value_at(&key.chrom, start, key.end))
                .map(round_signal)
        })
        .collect()
}

/// Open a track, sample it at every key and release it
pub fn sample_file<'a, O: SignalTrackOpener>(
    opener: &O,
    path: &Path,
    keys: impl IntoIterator<Item = &'a VariantKey>,
) -> Result<Vec<Option<f64>>, SignalTrackError> {
    let mut track = opener.open(path)?;
    let values = sample_track(&mut track, keys);
    drop(track);
    Ok(values)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// In-memory track: one value per (chrom, 0-based start)
    #[derive(Debug, Clone, Default)]
    pub struct MemoryTrack {
        pub values: HashMap<(String, u64), f64>,
    }

    impl MemoryTrack {
        pub fn with(mut self, chrom: &str, start: u64, value: f64) -> Self {
            self.values.insert((chrom.to_string(), start), value);
            self
        }
    }

    impl SignalTrack for MemoryTrack {
        fn value_at(&mut self, chrom: &str, start: u64, _end: u64) -> Option<f64> {
            self.values.get(&(chrom.to_string(), start)).copied()
        }
    }

    /// Serves MemoryTracks by file name; unknown files are empty tracks
    #[derive(Debug, Clone, Default)]
    pub struct MemoryOpener {
        pub tracks: HashMap<String, MemoryTrack>,
    }

    impl MemoryOpener {
        pub fn with(mut self, file_name: &str, track: MemoryTrack) -> Self {
            self.tracks.insert(file_name.to_string(), track);
            self
        }
    }

    impl SignalTrackOpener for MemoryOpener {
        type Track = MemoryTrack;

        fn open(&self, path: &Path) -> Result<MemoryTrack, SignalTrackError> {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Ok(self.tracks.get(&name).cloned().unwrap_or_default())
        }
    }
}

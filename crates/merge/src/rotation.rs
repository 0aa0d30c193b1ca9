//! Output chunking by rotation period.
//!
//! A chunk opens at its first row's second and closes before the first row
//! at least one period later. Row content and order are untouched.

use chrono::{DateTime, Utc};
use std::ops::Range;
use tickalign_core::{Config, MergedDataset, TimestampSec};
use tracing::debug;

/// A contiguous run of rows destined for one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Second of the chunk's first row.
    pub start: TimestampSec,
    /// Row indices into the dataset.
    pub rows: Range<usize>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// File stem `{prefix}_{YYYYMMDD}_{HHMM}` from the chunk start (UTC).
    pub fn file_stem(&self, prefix: &str) -> String {
        match DateTime::<Utc>::from_timestamp(self.start, 0) {
            Some(dt) => format!("{prefix}_{}", dt.format("%Y%m%d_%H%M")),
            None => format!("{prefix}_{}", self.start),
        }
    }
}

/// Splits a dataset into rotation-period chunks.
#[derive(Debug, Clone, Copy)]
pub struct Rotation {
    period_secs: i64,
}

impl Rotation {
    pub fn new(config: &Config) -> Self {
        Self {
            period_secs: config.rotation_seconds().max(1),
        }
    }

    pub fn from_minutes(minutes: u32) -> Self {
        Self {
            period_secs: (i64::from(minutes) * 60).max(1),
        }
    }

    pub fn period_secs(&self) -> i64 {
        self.period_secs
    }

    /// Chunk boundaries over the dataset's rows.
    pub fn chunks(&self, dataset: &MergedDataset) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        // (start second, first row index) of the chunk being filled.
        let mut open: Option<(TimestampSec, usize)> = None;

        for (idx, ts) in dataset.timestamps().enumerate() {
            match open {
                Some((start, _)) if ts - start < self.period_secs => {}
                _ => {
                    if let Some((start, first)) = open {
                        chunks.push(Chunk {
                            start,
                            rows: first..idx,
                        });
                    }
                    open = Some((ts, idx));
                }
            }
        }
        if let Some((start, first)) = open {
            chunks.push(Chunk {
                start,
                rows: first..dataset.len(),
            });
        }

        debug!(
            period_secs = self.period_secs,
            chunks = chunks.len(),
            "rotation boundaries"
        );
        chunks
    }
}

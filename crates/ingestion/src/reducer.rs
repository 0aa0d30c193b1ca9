//! Intra-second reduction: one record per quantized second.
//!
//! Within a bucket the record with the latest original timestamp wins; equal
//! timestamps are resolved in favour of the one that arrived last.

use crate::quantizer::QuantizedTick;
use std::collections::BTreeMap;
use tickalign_core::{TickRecord, TimestampSec};
use tracing::debug;

/// Statistics about one reduction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReductionStats {
    /// Raw records consumed.
    pub records_in: usize,
    /// Seconds emitted.
    pub seconds_out: usize,
    /// Records discarded because a later one shared their second.
    pub collapsed: usize,
    /// Largest number of records seen in a single second.
    pub max_bucket: usize,
}

/// The record selected for one second.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedTick {
    pub second: TimestampSec,
    pub record: TickRecord,
}

/// Records sharing a quantized second. Never empty once created.
#[derive(Debug)]
struct SecondBucket {
    winner: QuantizedTick,
    count: usize,
}

impl SecondBucket {
    fn new(first: QuantizedTick) -> Self {
        Self {
            winner: first,
            count: 1,
        }
    }

    fn offer(&mut self, tick: QuantizedTick) {
        self.count += 1;
        let key = (tick.record.ts_ms, tick.arrival);
        if key >= (self.winner.record.ts_ms, self.winner.arrival) {
            self.winner = tick;
        }
    }
}

/// Collapses quantized ticks to exactly one record per observed second.
#[derive(Debug, Default)]
pub struct IntraSecondReducer {
    stats: ReductionStats,
}

impl IntraSecondReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce a quantized stream. Output is ordered by second.
    ///
    /// Seconds with no records produce nothing; gaps are left for the merger
    /// and validator to see.
    pub fn reduce(&mut self, ticks: Vec<QuantizedTick>) -> Vec<ReducedTick> {
        let records_in = ticks.len();
        let mut buckets: BTreeMap<TimestampSec, SecondBucket> = BTreeMap::new();

        for tick in ticks {
            match buckets.get_mut(&tick.second) {
                Some(bucket) => bucket.offer(tick),
                None => {
                    buckets.insert(tick.second, SecondBucket::new(tick));
                }
            }
        }

        let max_bucket = buckets.values().map(|b| b.count).max().unwrap_or(0);
        let reduced: Vec<ReducedTick> = buckets
            .into_iter()
            .map(|(second, bucket)| ReducedTick {
                second,
                record: bucket.winner.record,
            })
            .collect();

        self.stats = ReductionStats {
            records_in,
            seconds_out: reduced.len(),
            collapsed: records_in - reduced.len(),
            max_bucket,
        };
        debug!(
            records_in,
            seconds_out = reduced.len(),
            collapsed = self.stats.collapsed,
            max_bucket,
            "reduced to one record per second"
        );
        reduced
    }

    /// Statistics from the last call to `reduce`.
    pub fn stats(&self) -> &ReductionStats {
        &self.stats
    }
}

//! Stream merging on the shared one-second axis.
//!
//! Both inputs must already be quantized, reduced and split, and strictly
//! increasing by second. The merge is a sorted two-pointer walk, so the
//! output inherits that ordering without a sort.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use tickalign_core::{
    CanonicalRow, Config, Error, Location, MergePolicy, MergedDataset, MergedRow, Result, Source,
    TimestampSec, Value,
};
use tracing::{debug, info};

/// Counters from one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows written to the merged series.
    pub emitted: usize,
    /// Off-chain seconds with no output row.
    pub dropped_off_chain: usize,
    /// On-chain seconds with no output row.
    pub dropped_on_chain: usize,
    /// Rows where the off-chain side was carried forward.
    pub filled_off_chain: usize,
    /// Rows where the on-chain side was carried forward.
    pub filled_on_chain: usize,
}

/// Joins an off-chain and an on-chain canonical stream.
#[derive(Debug, Clone)]
pub struct StreamMerger {
    policy: MergePolicy,
    timestamp_column: String,
    stats: MergeStats,
}

/// Column layout of the merged output.
struct Layout {
    off_columns: Vec<String>,
    on_columns: Vec<String>,
}

impl StreamMerger {
    /// Create a merger from configuration.
    pub fn new(config: &Config) -> Self {
        Self::with_policy(config.merge_policy(), config.single_timestamp_column_name.clone())
    }

    pub fn with_policy(policy: MergePolicy, timestamp_column: impl Into<String>) -> Self {
        Self {
            policy,
            timestamp_column: timestamp_column.into(),
            stats: MergeStats::default(),
        }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Merge the two streams.
    ///
    /// Off-chain columns come first, then on-chain columns, each in name
    /// order. A field name present on both sides is a schema error.
    pub fn merge(
        &mut self,
        off_chain: &[CanonicalRow],
        on_chain: &[CanonicalRow],
    ) -> Result<MergedDataset> {
        let off_columns = check_stream(off_chain, Source::OffChain)?;
        let on_columns = check_stream(on_chain, Source::OnChain)?;
        let layout = self.layout(off_columns, on_columns)?;

        let columns = layout
            .off_columns
            .iter()
            .chain(layout.on_columns.iter())
            .cloned()
            .collect();
        let mut dataset = MergedDataset::new(self.timestamp_column.clone(), columns);

        self.stats = MergeStats::default();
        dataset.rows = match self.policy {
            MergePolicy::Strict => self.intersect(&layout, off_chain, on_chain),
            MergePolicy::ForwardFill => self.forward_fill(&layout, off_chain, on_chain),
        };
        self.stats.emitted = dataset.rows.len();

        info!(
            policy = ?self.policy,
            off_chain = off_chain.len(),
            on_chain = on_chain.len(),
            emitted = self.stats.emitted,
            dropped_off_chain = self.stats.dropped_off_chain,
            dropped_on_chain = self.stats.dropped_on_chain,
            "merged streams"
        );
        Ok(dataset)
    }

    /// Counters from the last call to `merge`.
    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    fn layout(&self, off: BTreeSet<String>, on: BTreeSet<String>) -> Result<Layout> {
        if let Some(shared) = off.intersection(&on).next() {
            return Err(Error::schema(
                Location::default().column(shared.as_str()),
                "column present in both off-chain and on-chain streams",
            ));
        }
        if off.contains(&self.timestamp_column) || on.contains(&self.timestamp_column) {
            return Err(Error::schema(
                Location::default().column(self.timestamp_column.as_str()),
                "data field shadows the timestamp column",
            ));
        }
        debug!(
            off_columns = off.len(),
            on_columns = on.len(),
            "merged column layout"
        );
        Ok(Layout {
            off_columns: off.into_iter().collect(),
            on_columns: on.into_iter().collect(),
        })
    }

    fn intersect(
        &mut self,
        layout: &Layout,
        off: &[CanonicalRow],
        on: &[CanonicalRow],
    ) -> Vec<MergedRow> {
        let mut rows = Vec::with_capacity(off.len().min(on.len()));
        let (mut i, mut j) = (0, 0);

        while i < off.len() && j < on.len() {
            match off[i].timestamp.cmp(&on[j].timestamp) {
                Ordering::Less => {
                    self.stats.dropped_off_chain += 1;
                    i += 1;
                }
                Ordering::Greater => {
                    self.stats.dropped_on_chain += 1;
                    j += 1;
                }
                Ordering::Equal => {
                    rows.push(build_row(layout, off[i].timestamp, &off[i], &on[j]));
                    i += 1;
                    j += 1;
                }
            }
        }
        self.stats.dropped_off_chain += off.len() - i;
        self.stats.dropped_on_chain += on.len() - j;
        rows
    }

    fn forward_fill(
        &mut self,
        layout: &Layout,
        off: &[CanonicalRow],
        on: &[CanonicalRow],
    ) -> Vec<MergedRow> {
        let mut rows = Vec::with_capacity(off.len().max(on.len()));
        let (mut i, mut j) = (0, 0);
        let mut last_off: Option<&CanonicalRow> = None;
        let mut last_on: Option<&CanonicalRow> = None;

        while i < off.len() || j < on.len() {
            let next_off = off.get(i).map(|r| r.timestamp);
            let next_on = on.get(j).map(|r| r.timestamp);
            let ts = match (next_off, next_on) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => break,
            };

            let off_fresh = next_off == Some(ts);
            let on_fresh = next_on == Some(ts);
            if off_fresh {
                last_off = Some(&off[i]);
                i += 1;
            }
            if on_fresh {
                last_on = Some(&on[j]);
                j += 1;
            }

            match (last_off, last_on) {
                (Some(o), Some(n)) => {
                    if !off_fresh {
                        self.stats.filled_off_chain += 1;
                    }
                    if !on_fresh {
                        self.stats.filled_on_chain += 1;
                    }
                    rows.push(build_row(layout, ts, o, n));
                }
                _ => {
                    if off_fresh {
                        self.stats.dropped_off_chain += 1;
                    }
                    if on_fresh {
                        self.stats.dropped_on_chain += 1;
                    }
                }
            }
        }
        rows
    }
}

/// Check source tags and strict ordering; return the stream's column set.
fn check_stream(rows: &[CanonicalRow], expected: Source) -> Result<BTreeSet<String>> {
    let mut columns = BTreeSet::new();
    let mut prev: Option<TimestampSec> = None;

    for (idx, row) in rows.iter().enumerate() {
        if row.source != expected {
            return Err(Error::input(
                Location::row(idx).at(row.timestamp),
                format!("{} row passed as {} input", row.source, expected),
            ));
        }
        if let Some(p) = prev {
            if row.timestamp <= p {
                return Err(Error::input(
                    Location::row(idx).at(row.timestamp),
                    format!("{expected} input not strictly increasing (previous {p})"),
                ));
            }
        }
        prev = Some(row.timestamp);
        columns.extend(row.fields.keys().cloned());
    }
    Ok(columns)
}

fn build_row(
    layout: &Layout,
    timestamp: TimestampSec,
    off: &CanonicalRow,
    on: &CanonicalRow,
) -> MergedRow {
    let pick = |row: &CanonicalRow, col: &String| {
        row.fields.get(col).cloned().unwrap_or(Value::Null)
    };
    let cells = layout
        .off_columns
        .iter()
        .map(|c| pick(off, c))
        .chain(layout.on_columns.iter().map(|c| pick(on, c)))
        .collect();
    MergedRow { timestamp, cells }
}

//! Alignment engine.
//!
//! Wires quantizer, reducer and splitter per stream, then merges the two
//! canonical streams and runs the invariant gate over the result.

use crate::merger::{MergeStats, StreamMerger};
use crate::rotation::{Chunk, Rotation};
use crate::validator::{InvariantValidator, ValidationReport};
use tickalign_core::{CanonicalRow, Config, MergedDataset, Result, Source, TickRecord};
use tickalign_ingestion::{IntraSecondReducer, Quantizer, ReductionStats, StructuredFieldSplitter};
use tracing::{info, warn};

/// Per-stream counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub source: Source,
    pub reduction: ReductionStats,
}

/// Canonical rows of one stream plus its counters.
#[derive(Debug, Clone)]
pub struct CanonicalStream {
    pub rows: Vec<CanonicalRow>,
    pub summary: StreamSummary,
}

/// A validated merged dataset and everything learned while building it.
#[derive(Debug, Clone)]
pub struct AlignmentOutput {
    pub dataset: MergedDataset,
    pub report: ValidationReport,
    pub merge: MergeStats,
    pub off_chain: StreamSummary,
    pub on_chain: StreamSummary,
}

/// End-to-end alignment of one off-chain and one on-chain batch.
#[derive(Debug, Clone)]
pub struct AlignmentEngine {
    config: Config,
    quantizer: Quantizer,
    splitter: StructuredFieldSplitter,
    validator: InvariantValidator,
    rotation: Rotation,
}

impl AlignmentEngine {
    /// Create an engine; the configuration is validated here.
    pub fn new(config: Config) -> Result<Self> {
        let quantizer = Quantizer::new(&config)?;
        Ok(Self {
            splitter: StructuredFieldSplitter::new(&config),
            validator: InvariantValidator::new(&config),
            rotation: Rotation::new(&config),
            quantizer,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Quantize, reduce and split one raw stream.
    pub fn process_stream(&self, source: Source, records: Vec<TickRecord>) -> Result<CanonicalStream> {
        let ticks = self.quantizer.assign(records)?;
        let mut reducer = IntraSecondReducer::new();
        let reduced = reducer.reduce(ticks);
        let rows = self.splitter.split_all(reduced)?;

        let summary = StreamSummary {
            source,
            reduction: reducer.stats().clone(),
        };
        info!(
            source = %source,
            records = summary.reduction.records_in,
            seconds = summary.reduction.seconds_out,
            collapsed = summary.reduction.collapsed,
            "stream normalized"
        );
        Ok(CanonicalStream { rows, summary })
    }

    /// Run both stream pipelines, merge and validate.
    ///
    /// The two pipelines share nothing and run in parallel. Any error aborts
    /// the batch; no partially valid dataset is returned.
    pub fn run(
        &self,
        off_chain: Vec<TickRecord>,
        on_chain: Vec<TickRecord>,
    ) -> Result<AlignmentOutput> {
        let (off, on) = rayon::join(
            || self.process_stream(Source::OffChain, off_chain),
            || self.process_stream(Source::OnChain, on_chain),
        );
        let (off, on) = (off?, on?);

        let mut merger = StreamMerger::new(&self.config);
        let dataset = merger.merge(&off.rows, &on.rows)?;
        let report = self.validator.validate(&dataset)?;
        if dataset.is_empty() {
            warn!("streams share no seconds; merged dataset is empty");
        }

        Ok(AlignmentOutput {
            dataset,
            report,
            merge: merger.stats().clone(),
            off_chain: off.summary,
            on_chain: on.summary,
        })
    }

    /// Re-run the invariant gate, e.g. after a transform touched rows.
    pub fn validate(&self, dataset: &MergedDataset) -> Result<ValidationReport> {
        self.validator.validate(dataset)
    }

    /// Rotation chunks for a dataset under the configured period.
    pub fn chunks(&self, dataset: &MergedDataset) -> Vec<Chunk> {
        self.rotation.chunks(dataset)
    }
}

//! Batch runner: load both capture sets, align, validate and write.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tickalign_core::{Config, Source, TickRecord};
use tickalign_merge::{AlignmentEngine, ValidationReport};
use tracing::info;

use crate::loader::read_jsonl;
use crate::sink::ParquetSink;

/// File prefix of merged output chunks.
pub const OUTPUT_PREFIX: &str = "merged";

/// Outcome of a successful batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub rows: usize,
    pub files: Vec<PathBuf>,
    /// BLAKE3 digest of the merged dataset.
    pub fingerprint: String,
    pub report: ValidationReport,
}

/// Load a capture file, or every `*.jsonl` file of a directory in name order.
pub fn load_source(path: &Path, source: Source, timestamp_field: &str) -> Result<Vec<TickRecord>> {
    if !path.is_dir() {
        return read_jsonl(path, source, timestamp_field)
            .with_context(|| format!("reading {source} capture {}", path.display()));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("listing {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    if files.is_empty() {
        anyhow::bail!("no .jsonl files in {}", path.display());
    }

    let mut records = Vec::new();
    for file in &files {
        let mut part = read_jsonl(file, source, timestamp_field)
            .with_context(|| format!("reading {source} capture {}", file.display()))?;
        records.append(&mut part);
    }
    Ok(records)
}

/// Run one batch end to end. Nothing is written unless every stage passes.
pub fn run_batch(
    off_chain: impl AsRef<Path>,
    on_chain: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &Config,
) -> Result<BatchSummary> {
    let engine = AlignmentEngine::new(config.clone()).context("invalid configuration")?;
    let ts_field = config.single_timestamp_column_name.as_str();

    let off = load_source(off_chain.as_ref(), Source::OffChain, ts_field)?;
    let on = load_source(on_chain.as_ref(), Source::OnChain, ts_field)?;

    let output = engine.run(off, on).context("alignment failed")?;
    let chunks = engine.chunks(&output.dataset);
    let files = ParquetSink::new(out_dir.as_ref(), OUTPUT_PREFIX)
        .write(&output.dataset, &chunks)
        .with_context(|| format!("writing to {}", out_dir.as_ref().display()))?;

    let summary = BatchSummary {
        rows: output.dataset.len(),
        files,
        fingerprint: output.dataset.fingerprint(),
        report: output.report,
    };
    info!(
        rows = summary.rows,
        files = summary.files.len(),
        fingerprint = %summary.fingerprint,
        "batch complete"
    );
    Ok(summary)
}

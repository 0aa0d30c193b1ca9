//! File adapters around the alignment engine.
//!
//! This crate handles:
//! - Loading raw JSON-lines captures
//! - Writing validated output as rotated Parquet files (DuckDB)
//! - Running a complete batch

pub mod loader;
pub mod runner;
pub mod sink;

pub use loader::{parse_jsonl, read_jsonl};
pub use runner::{load_source, run_batch, BatchSummary};
pub use sink::ParquetSink;

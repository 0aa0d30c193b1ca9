//! Per-stream normalization for the tick alignment engine.
//!
//! This crate handles:
//! - Forward quantization of raw timestamps to whole seconds
//! - Keep-latest reduction of records sharing a second
//! - Splitting compound fields into fixed scalar columns

pub mod quantizer;
pub mod reducer;
pub mod splitter;

pub use quantizer::{QuantizedTick, Quantizer};
pub use reducer::{IntraSecondReducer, ReducedTick, ReductionStats};
pub use splitter::StructuredFieldSplitter;

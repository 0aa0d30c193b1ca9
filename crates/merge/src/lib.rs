//! Stream merging and validation for the tick alignment engine.
//!
//! This crate provides:
//! - Strict (intersection) and forward-fill merging of two canonical streams
//! - The invariant validator gating every output dataset
//! - Rotation-period chunking of the merged series
//! - The end-to-end alignment engine

pub mod engine;
pub mod merger;
pub mod rotation;
pub mod validator;

pub use engine::{AlignmentEngine, AlignmentOutput, CanonicalStream, StreamSummary};
pub use merger::{MergeStats, StreamMerger};
pub use rotation::{Chunk, Rotation};
pub use validator::{Gap, InvariantValidator, ValidationReport};

//! Core types and configuration for the tick alignment engine.
//!
//! This crate provides shared types used across all other crates:
//! - Raw tick records, canonical rows and the merged dataset
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{CompoundShape, Config, MergePolicy, TimestampRounding};
pub use error::{Error, Location, Result};
pub use types::*;

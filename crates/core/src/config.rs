//! Configuration structures for the tick alignment engine.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{Error, Result};

/// Compound columns written by the capture collectors, each carrying
/// nine order-book levels.
pub const DEFAULT_COMPOUND_FIELDS: [&str; 6] = [
    "orderbook_bid",
    "orderbook_ask",
    "bid_depth",
    "ask_depth",
    "spreads",
    "mid_prices",
];

/// Levels per default compound column.
pub const DEFAULT_LEVELS: usize = 9;

/// How raw timestamps are mapped onto the one-second grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampRounding {
    /// Forward snap to the next whole second.
    Ceil,
    Floor,
    Nearest,
}

/// Join policy used by the stream merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Emit only seconds present in both streams.
    Strict,
    /// Emit every second present in either stream once both have started,
    /// carrying the missing side's latest earlier row forward.
    ForwardFill,
}

/// Fixed output layout of one compound field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompoundShape {
    /// Ordered sequence; element `i` maps to `outputs[i]`.
    Sequence { outputs: Vec<String> },
    /// Key/value object; each `(key, output)` pair maps one key to one column.
    Object { keys: Vec<(String, String)> },
}

impl CompoundShape {
    /// Sequence of `k` levels named `{name}_1 .. {name}_k`.
    pub fn levels(name: &str, k: usize) -> Self {
        CompoundShape::Sequence {
            outputs: (1..=k).map(|lvl| format!("{name}_{lvl}")).collect(),
        }
    }

    /// Object whose keys map to `{name}_{key}`.
    pub fn keyed(name: &str, keys: &[&str]) -> Self {
        CompoundShape::Object {
            keys: keys
                .iter()
                .map(|k| (k.to_string(), format!("{name}_{k}")))
                .collect(),
        }
    }

    /// Output column names, in position order.
    pub fn output_names(&self) -> Vec<&str> {
        match self {
            CompoundShape::Sequence { outputs } => outputs.iter().map(String::as_str).collect(),
            CompoundShape::Object { keys } => keys.iter().map(|(_, out)| out.as_str()).collect(),
        }
    }

    /// Number of scalar columns this field expands into.
    pub fn width(&self) -> usize {
        match self {
            CompoundShape::Sequence { outputs } => outputs.len(),
            CompoundShape::Object { keys } => keys.len(),
        }
    }
}

/// Main configuration for the alignment engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output cadence in seconds. Only 1 is supported.
    pub system_heartbeat_seconds: u32,
    /// Prediction horizons, consumed by downstream target builders.
    pub horizons_seconds: Vec<u32>,
    /// Output chunk length in minutes.
    pub rotation_minutes: u32,
    /// Whether compound fields are expanded into scalar columns.
    pub object_columns_split: bool,
    /// Strict intersection merge when true, forward-fill merge when false.
    pub merge_requires_no_nans: bool,
    /// Grid snapping rule. Must be `ceil`.
    pub timestamp_rounding: TimestampRounding,
    /// Enforce strictly increasing output timestamps.
    pub timestamp_strictly_increasing: bool,
    /// Name of the single timestamp column.
    pub single_timestamp_column_name: String,
    /// Compound field name to output layout.
    pub compound_fields: BTreeMap<String, CompoundShape>,
    /// Decode text cells holding JSON arrays/objects for declared compound fields.
    pub decode_string_compounds: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system_heartbeat_seconds: 1,
            horizons_seconds: vec![60, 300, 900],
            rotation_minutes: 90,
            object_columns_split: true,
            merge_requires_no_nans: true,
            timestamp_rounding: TimestampRounding::Ceil,
            timestamp_strictly_increasing: true,
            single_timestamp_column_name: "timestamp".to_string(),
            compound_fields: DEFAULT_COMPOUND_FIELDS
                .iter()
                .map(|name| (name.to_string(), CompoundShape::levels(name, DEFAULT_LEVELS)))
                .collect(),
            decode_string_compounds: true,
        }
    }
}

impl Config {
    /// Parse and validate a JSON configuration. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Merge policy selected by `merge_requires_no_nans`.
    pub fn merge_policy(&self) -> MergePolicy {
        if self.merge_requires_no_nans {
            MergePolicy::Strict
        } else {
            MergePolicy::ForwardFill
        }
    }

    /// Rotation period in seconds.
    pub fn rotation_seconds(&self) -> i64 {
        i64::from(self.rotation_minutes) * 60
    }

    /// Check every constraint the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.system_heartbeat_seconds != 1 {
            return Err(Error::config(format!(
                "system_heartbeat_seconds must be 1, got {}",
                self.system_heartbeat_seconds
            )));
        }
        if self.timestamp_rounding != TimestampRounding::Ceil {
            return Err(Error::config(
                "timestamp_rounding must be 'ceil' (forward snap)",
            ));
        }
        if self.rotation_minutes == 0 {
            return Err(Error::config("rotation_minutes must be positive"));
        }
        if self.horizons_seconds.iter().any(|&h| h == 0) {
            return Err(Error::config("horizons_seconds must all be positive"));
        }
        let ts_col = self.single_timestamp_column_name.trim();
        if ts_col.is_empty() {
            return Err(Error::config("single_timestamp_column_name must not be empty"));
        }

        let mut seen = BTreeSet::new();
        for (field, shape) in &self.compound_fields {
            if field == ts_col {
                return Err(Error::config(format!(
                    "compound field '{field}' collides with the timestamp column"
                )));
            }
            if shape.width() == 0 {
                return Err(Error::config(format!(
                    "compound field '{field}' declares no output columns"
                )));
            }
            if let CompoundShape::Object { keys } = shape {
                let distinct: BTreeSet<&str> = keys.iter().map(|(k, _)| k.as_str()).collect();
                if distinct.len() != keys.len() {
                    return Err(Error::config(format!(
                        "compound field '{field}' declares a key twice"
                    )));
                }
            }
            for out in shape.output_names() {
                if out == ts_col {
                    return Err(Error::config(format!(
                        "compound field '{field}' output '{out}' collides with the timestamp column"
                    )));
                }
                if out != field.as_str() && self.compound_fields.contains_key(out) {
                    return Err(Error::config(format!(
                        "compound field '{field}' output '{out}' shadows another compound field"
                    )));
                }
                if !seen.insert(out.to_string()) {
                    return Err(Error::config(format!(
                        "output column '{out}' is declared more than once"
                    )));
                }
            }
        }
        Ok(())
    }
}

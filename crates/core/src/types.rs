//! Core data types for the tick alignment engine.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamp in milliseconds since Unix epoch (UTC).
pub type TimestampMs = i64;

/// Timestamp in whole seconds since Unix epoch (UTC).
pub type TimestampSec = i64;

/// Milliseconds in one second.
pub const MS_PER_SECOND: i64 = 1_000;

/// Snap a millisecond timestamp forward to the next whole second.
///
/// Exact boundaries are returned unchanged, so the mapping is idempotent
/// on values that are already whole seconds.
#[inline]
pub fn ceil_to_second(ts_ms: TimestampMs) -> TimestampSec {
    let secs = ts_ms.div_euclid(MS_PER_SECOND);
    if ts_ms.rem_euclid(MS_PER_SECOND) == 0 {
        secs
    } else {
        secs + 1
    }
}

/// Origin of a telemetry stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Exchange order book / ticker capture.
    OffChain,
    /// Node, mempool and whale-tracker capture.
    OnChain,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::OffChain => "off_chain",
            Source::OnChain => "on_chain",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell value.
///
/// Raw captures carry sequences (order-book levels) and objects (bid/ask
/// pairs); canonical rows carry scalars only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
    Sequence(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Build a float value.
    pub fn float(v: f64) -> Self {
        Value::Float(OrderedFloat(v))
    }

    /// True for every variant except `Sequence` and `Object`.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Sequence(_) | Value::Object(_))
    }

    /// True if the cell counts as empty: null, NaN, or blank text.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(v) => v.is_nan(),
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Sequence(_) => "sequence",
            Value::Object(_) => "object",
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(v.0),
            _ => None,
        }
    }

    /// Feed a type-tagged encoding of the value into a hasher.
    pub fn hash_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            Value::Null => {
                hasher.update(&[0]);
            }
            Value::Bool(b) => {
                hasher.update(&[1, u8::from(*b)]);
            }
            Value::Int(v) => {
                hasher.update(&[2]);
                hasher.update(&v.to_le_bytes());
            }
            Value::Float(v) => {
                hasher.update(&[3]);
                hasher.update(&v.0.to_bits().to_le_bytes());
            }
            Value::Text(s) => {
                hasher.update(&[4]);
                hasher.update(&(s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            Value::Sequence(items) => {
                hasher.update(&[5]);
                hasher.update(&(items.len() as u64).to_le_bytes());
                for item in items {
                    item.hash_into(hasher);
                }
            }
            Value::Object(map) => {
                hasher.update(&[6]);
                hasher.update(&(map.len() as u64).to_le_bytes());
                for (k, v) in map {
                    hasher.update(&(k.len() as u64).to_le_bytes());
                    hasher.update(k.as_bytes());
                    v.hash_into(hasher);
                }
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }
}

/// One raw observation from upstream capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    /// Original capture timestamp (ms, UTC).
    pub ts_ms: TimestampMs,
    /// Stream this record belongs to.
    pub source: Source,
    /// Field name to value; values may be compound.
    pub fields: BTreeMap<String, Value>,
}

impl TickRecord {
    pub fn new(ts_ms: TimestampMs, source: Source) -> Self {
        Self {
            ts_ms,
            source,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// One de-duplicated, fully scalar record per second for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    /// Quantized second.
    pub timestamp: TimestampSec,
    /// Stream this row belongs to.
    pub source: Source,
    /// Original timestamp of the record kept for this second.
    pub origin_ms: TimestampMs,
    /// Scalar fields.
    pub fields: BTreeMap<String, Value>,
}

impl CanonicalRow {
    /// Name of the first non-scalar field, if any.
    pub fn first_compound_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|(_, v)| !v.is_scalar())
            .map(|(k, _)| k.as_str())
    }
}

/// Joined record for one second; cells follow the dataset's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRow {
    pub timestamp: TimestampSec,
    pub cells: Vec<Value>,
}

/// Ordered merged series produced by the stream merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedDataset {
    /// Name of the single timestamp column.
    pub timestamp_column: String,
    /// Data column names, excluding the timestamp column.
    pub columns: Vec<String>,
    /// Rows ordered by timestamp.
    pub rows: Vec<MergedRow>,
}

impl MergedDataset {
    pub fn new(timestamp_column: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            timestamp_column: timestamp_column.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Full header: timestamp column first, then data columns.
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(self.timestamp_column.as_str())
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a data column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at (row, column name).
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.cells.get(idx)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = TimestampSec> + '_ {
        self.rows.iter().map(|r| r.timestamp)
    }

    /// BLAKE3 digest over the header and every cell, in row order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for name in self.header() {
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
        }
        for row in &self.rows {
            hasher.update(&row.timestamp.to_le_bytes());
            for cell in &row.cells {
                cell.hash_into(&mut hasher);
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

//! Structured-field splitting.
//!
//! Declared compound fields (order-book levels, bid/ask pairs, spread and
//! mid-price arrays) are replaced by a fixed set of named scalar columns.
//! The layout comes from configuration; it is never inferred from data.

use crate::reducer::ReducedTick;
use std::collections::BTreeMap;
use tickalign_core::{
    CanonicalRow, CompoundShape, Config, Error, Location, Result, Value,
};
use tracing::debug;

/// Expands compound fields into scalar columns.
#[derive(Debug, Clone)]
pub struct StructuredFieldSplitter {
    schema: BTreeMap<String, CompoundShape>,
    enabled: bool,
    decode_strings: bool,
}

impl StructuredFieldSplitter {
    /// Create a splitter from configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            schema: config.compound_fields.clone(),
            enabled: config.object_columns_split,
            decode_strings: config.decode_string_compounds,
        }
    }

    /// Create an enabled splitter for an explicit schema.
    pub fn with_schema(schema: BTreeMap<String, CompoundShape>) -> Self {
        Self {
            schema,
            enabled: true,
            decode_strings: true,
        }
    }

    /// Total scalar columns produced by the declared fields.
    pub fn output_width(&self) -> usize {
        self.schema.values().map(CompoundShape::width).sum()
    }

    /// Split one reduced record into a canonical row.
    ///
    /// When splitting is disabled the fields pass through untouched and the
    /// final validator rejects any compound value that remains.
    pub fn split(&self, tick: ReducedTick) -> Result<CanonicalRow> {
        let ReducedTick { second, record } = tick;
        let mut row = CanonicalRow {
            timestamp: second,
            source: record.source,
            origin_ms: record.ts_ms,
            fields: record.fields,
        };
        if !self.enabled {
            return Ok(row);
        }

        let loc = || Location::default().at(second);

        for (name, shape) in &self.schema {
            let Some(raw) = row.fields.remove(name) else {
                continue;
            };
            let value = self.decode(raw, name, &loc)?;
            for (out, cell) in expand(name, shape, value, &loc)? {
                if row.fields.contains_key(&out) {
                    return Err(Error::schema(
                        loc().column(out.as_str()),
                        format!("split of '{name}' would overwrite an existing column"),
                    ));
                }
                row.fields.insert(out, cell);
            }
        }

        if let Some(field) = row.first_compound_field() {
            return Err(Error::schema(
                loc().column(field),
                "compound value in a field with no declared layout",
            ));
        }
        Ok(row)
    }

    /// Split a whole reduced stream; errors carry the row index.
    pub fn split_all(&self, ticks: Vec<ReducedTick>) -> Result<Vec<CanonicalRow>> {
        let rows = ticks
            .into_iter()
            .enumerate()
            .map(|(i, tick)| self.split(tick).map_err(|e| with_row(e, i)))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            rows = rows.len(),
            enabled = self.enabled,
            columns = rows.first().map(|r| r.fields.len()).unwrap_or(0),
            "split compound fields"
        );
        Ok(rows)
    }

    fn decode(&self, raw: Value, name: &str, loc: &dyn Fn() -> Location) -> Result<Value> {
        match raw {
            Value::Text(text) if self.decode_strings => {
                let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    Error::schema(
                        loc().column(name),
                        format!("text is not a JSON array or object: {e}"),
                    )
                })?;
                Ok(Value::from(parsed))
            }
            other => Ok(other),
        }
    }
}

/// Map one compound value onto its declared output columns.
fn expand(
    name: &str,
    shape: &CompoundShape,
    value: Value,
    loc: &dyn Fn() -> Location,
) -> Result<Vec<(String, Value)>> {
    let cells = match (shape, value) {
        (CompoundShape::Sequence { outputs }, Value::Sequence(items)) => {
            if items.len() != outputs.len() {
                return Err(Error::schema(
                    loc().column(name),
                    format!("expected {} elements, found {}", outputs.len(), items.len()),
                ));
            }
            outputs.iter().cloned().zip(items).collect::<Vec<_>>()
        }
        (CompoundShape::Object { keys }, Value::Object(mut map)) => {
            let mut cells = Vec::with_capacity(keys.len());
            for (key, out) in keys {
                let cell = map.remove(key).ok_or_else(|| {
                    Error::schema(loc().column(name), format!("missing key '{key}'"))
                })?;
                cells.push((out.clone(), cell));
            }
            if let Some(extra) = map.keys().next() {
                return Err(Error::schema(
                    loc().column(name),
                    format!("unexpected key '{extra}'"),
                ));
            }
            cells
        }
        (CompoundShape::Sequence { .. }, other) => {
            return Err(Error::schema(
                loc().column(name),
                format!("expected sequence, found {}", other.kind()),
            ));
        }
        (CompoundShape::Object { .. }, other) => {
            return Err(Error::schema(
                loc().column(name),
                format!("expected object, found {}", other.kind()),
            ));
        }
    };

    if let Some((out, cell)) = cells.iter().find(|(_, c)| !c.is_scalar()) {
        return Err(Error::schema(
            loc().column(out.as_str()),
            format!("nested {} inside '{name}'", cell.kind()),
        ));
    }
    Ok(cells)
}

fn with_row(err: Error, row: usize) -> Error {
    match err {
        Error::Schema { mut location, message } => {
            location.row = Some(row);
            Error::Schema { location, message }
        }
        other => other,
    }
}

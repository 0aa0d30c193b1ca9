//! JSON-lines loader for raw capture files.
//!
//! One JSON object per line. The timestamp is either epoch milliseconds or an
//! RFC 3339 string; every other key becomes a field.

use chrono::DateTime;
use std::io::BufRead;
use std::path::Path;
use tickalign_core::{Error, Location, Result, Source, TickRecord, TimestampMs, Value};
use tracing::debug;

/// Names tried when the configured timestamp field is absent.
const TIMESTAMP_ALIASES: [&str; 3] = ["ts", "time", "datetime"];

/// Read a capture file.
pub fn read_jsonl(
    path: impl AsRef<Path>,
    source: Source,
    timestamp_field: &str,
) -> Result<Vec<TickRecord>> {
    let file = std::fs::File::open(path.as_ref())?;
    let records = parse_jsonl(std::io::BufReader::new(file), source, timestamp_field)?;
    debug!(
        path = %path.as_ref().display(),
        source = %source,
        records = records.len(),
        "loaded capture file"
    );
    Ok(records)
}

/// Parse JSON lines from any reader. Blank lines are skipped.
pub fn parse_jsonl<R: BufRead>(
    reader: R,
    source: Source,
    timestamp_field: &str,
) -> Result<Vec<TickRecord>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let loc = || Location::row(idx + 1);

        let json: serde_json::Value = serde_json::from_str(&line)
            .map_err(|e| Error::input(loc(), format!("invalid JSON: {e}")))?;
        let serde_json::Value::Object(mut map) = json else {
            return Err(Error::input(loc(), "line is not a JSON object"));
        };

        let key = if map.contains_key(timestamp_field) {
            Some(timestamp_field)
        } else {
            TIMESTAMP_ALIASES.into_iter().find(|k| map.contains_key(*k))
        }
        .ok_or_else(|| Error::input(loc(), format!("missing '{timestamp_field}'")))?
        .to_string();
        let raw_ts = map.remove(&key).unwrap_or(serde_json::Value::Null);
        let ts_ms = parse_timestamp(&raw_ts).ok_or_else(|| {
            Error::input(loc().column(key.as_str()), format!("unparseable timestamp {raw_ts}"))
        })?;

        records.push(TickRecord {
            ts_ms,
            source,
            fields: map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
        });
    }
    Ok(records)
}

/// Epoch milliseconds from an integer or an RFC 3339 string.
pub fn parse_timestamp(raw: &serde_json::Value) -> Option<TimestampMs> {
    match raw {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

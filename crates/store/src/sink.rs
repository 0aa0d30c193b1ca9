//! Parquet output through an in-memory DuckDB connection.
//!
//! One file per rotation chunk. Files are staged under a temporary name and
//! renamed only after every chunk has been written, so a failed write leaves
//! no partial artifact behind.

use duckdb::types::Value as DuckValue;
use duckdb::{appender_params_from_iter, Connection};
use std::path::{Path, PathBuf};
use tickalign_core::{Error, MergedDataset, Result, Value};
use tickalign_merge::Chunk;
use tracing::{debug, info, warn};

const TABLE: &str = "merged";

/// SQL type chosen for one output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    Boolean,
    Varchar,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Varchar => "VARCHAR",
        }
    }

    fn of(value: &Value) -> Self {
        match value {
            Value::Int(_) => ColumnType::BigInt,
            Value::Float(_) => ColumnType::Double,
            Value::Bool(_) => ColumnType::Boolean,
            _ => ColumnType::Varchar,
        }
    }

    /// Widest type able to hold both.
    fn widen(self, other: Self) -> Self {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (BigInt, Double) | (Double, BigInt) => Double,
            _ => Varchar,
        }
    }

    fn convert(self, value: &Value) -> DuckValue {
        match (self, value) {
            (ColumnType::BigInt, Value::Int(v)) => DuckValue::BigInt(*v),
            (ColumnType::Double, Value::Int(v)) => DuckValue::Double(*v as f64),
            (ColumnType::Double, Value::Float(v)) => DuckValue::Double(v.0),
            (ColumnType::Boolean, Value::Bool(v)) => DuckValue::Boolean(*v),
            (_, Value::Null) => DuckValue::Null,
            (_, other) => DuckValue::Text(text_of(other)),
        }
    }
}

/// Infer one SQL type per data column.
pub fn column_types(dataset: &MergedDataset) -> Vec<ColumnType> {
    (0..dataset.columns.len())
        .map(|idx| {
            dataset
                .rows
                .iter()
                .filter_map(|row| row.cells.get(idx))
                .map(ColumnType::of)
                .reduce(ColumnType::widen)
                .unwrap_or(ColumnType::Double)
        })
        .collect()
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.0.to_string(),
        Value::Bool(v) => v.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn db(err: duckdb::Error) -> Error {
    Error::database(err.to_string())
}

/// Writes validated datasets as rotated Parquet files.
#[derive(Debug, Clone)]
pub struct ParquetSink {
    out_dir: PathBuf,
    prefix: String,
}

impl ParquetSink {
    pub fn new(out_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Final path of a chunk's file.
    pub fn chunk_path(&self, chunk: &Chunk) -> PathBuf {
        self.out_dir
            .join(format!("{}.parquet", chunk.file_stem(&self.prefix)))
    }

    /// Write every chunk of a validated dataset. Returns the file paths.
    ///
    /// On error no chunk of this call is left in the output directory.
    pub fn write(&self, dataset: &MergedDataset, chunks: &[Chunk]) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.out_dir)?;
        let conn = Connection::open_in_memory().map_err(db)?;
        self.load(&conn, dataset)?;

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(chunks.len());
        for chunk in chunks.iter().filter(|c| !c.is_empty()) {
            let target = self.chunk_path(chunk);
            let tmp = target.with_extension("parquet.tmp");
            staged.push((tmp.clone(), target));
            if let Err(e) = self.copy_chunk(&conn, dataset, chunk, &tmp) {
                discard(&staged, &[]);
                return Err(e);
            }
        }

        let mut written = Vec::with_capacity(staged.len());
        for (tmp, target) in &staged {
            if let Err(e) = std::fs::rename(tmp, target) {
                warn!(path = %target.display(), error = %e, "rename failed, rolling back chunks");
                discard(&staged, &written);
                return Err(e.into());
            }
            written.push(target.clone());
        }

        info!(
            dir = %self.out_dir.display(),
            files = written.len(),
            rows = dataset.len(),
            "wrote parquet chunks"
        );
        Ok(written)
    }

    fn load(&self, conn: &Connection, dataset: &MergedDataset) -> Result<()> {
        let types = column_types(dataset);
        let mut columns = vec![format!("{} BIGINT NOT NULL", quote_ident(&dataset.timestamp_column))];
        columns.extend(
            dataset
                .columns
                .iter()
                .zip(&types)
                .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql())),
        );
        conn.execute_batch(&format!("CREATE TABLE {TABLE} ({});", columns.join(", ")))
            .map_err(db)?;

        let mut appender = conn.appender(TABLE).map_err(db)?;
        for row in &dataset.rows {
            let values = std::iter::once(DuckValue::BigInt(row.timestamp)).chain(
                types
                    .iter()
                    .zip(&row.cells)
                    .map(|(ty, cell)| ty.convert(cell)),
            );
            appender
                .append_row(appender_params_from_iter(values))
                .map_err(db)?;
        }
        appender.flush().map_err(db)?;
        debug!(rows = dataset.len(), columns = types.len() + 1, "loaded dataset into duckdb");
        Ok(())
    }

    fn copy_chunk(
        &self,
        conn: &Connection,
        dataset: &MergedDataset,
        chunk: &Chunk,
        path: &Path,
    ) -> Result<()> {
        let first = dataset.rows[chunk.rows.start].timestamp;
        let last = dataset.rows[chunk.rows.end - 1].timestamp;
        let ts = quote_ident(&dataset.timestamp_column);
        let sql = format!(
            "COPY (SELECT * FROM {TABLE} WHERE {ts} BETWEEN {first} AND {last} ORDER BY {ts}) \
             TO {} (FORMAT PARQUET);",
            quote_literal(&path.to_string_lossy())
        );
        conn.execute_batch(&sql).map_err(db)?;
        debug!(path = %path.display(), rows = chunk.len(), "staged chunk");
        Ok(())
    }
}

/// Remove staged temp files and any chunk already renamed into place.
fn discard(staged: &[(PathBuf, PathBuf)], written: &[PathBuf]) {
    let leftovers = staged.iter().map(|(tmp, _)| tmp).chain(written);
    for path in leftovers.filter(|p| p.is_file()) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove chunk");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickalign_core::MergedRow;
    use tickalign_merge::Rotation;

    fn dataset() -> MergedDataset {
        let mut ds = MergedDataset::new(
            "timestamp",
            vec!["mid".into(), "fee".into(), "flag".into(), "venue".into()],
        );
        ds.rows = vec![
            MergedRow {
                timestamp: 1,
                cells: vec![Value::from(10.5), Value::Int(3), Value::Bool(true), Value::from("binance")],
            },
            MergedRow {
                timestamp: 2,
                cells: vec![Value::Int(11), Value::Int(4), Value::Bool(false), Value::Int(7)],
            },
        ];
        ds
    }

    #[test]
    fn test_column_types_widen() {
        let types = column_types(&dataset());
        assert_eq!(
            types,
            vec![
                ColumnType::Double,
                ColumnType::BigInt,
                ColumnType::Boolean,
                ColumnType::Varchar
            ]
        );
    }

    #[test]
    fn test_convert() {
        assert_eq!(ColumnType::Double.convert(&Value::Int(2)), DuckValue::Double(2.0));
        assert_eq!(
            ColumnType::Varchar.convert(&Value::Int(7)),
            DuckValue::Text("7".to_string())
        );
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("/tmp/o'brien"), "'/tmp/o''brien'");
    }

    fn parquet_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_write_one_file_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = dataset();
        ds.rows[1].timestamp = 121;
        let chunks = Rotation::from_minutes(1).chunks(&ds);
        let sink = ParquetSink::new(dir.path(), "merged");

        let written = sink.write(&ds, &chunks).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(parquet_files(dir.path()), written);
        assert!(written[1].ends_with("merged_19700101_0002.parquet"));
    }

    #[test]
    fn test_failed_rename_rolls_back_earlier_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = dataset();
        ds.rows[1].timestamp = 121;
        let chunks = Rotation::from_minutes(1).chunks(&ds);
        let sink = ParquetSink::new(dir.path(), "merged");

        // A non-empty directory where the second chunk must land.
        let blocker = sink.chunk_path(&chunks[1]);
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), "x").unwrap();

        let err = sink.write(&ds, &chunks).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(parquet_files(dir.path()).is_empty());
        assert!(blocker.join("keep").exists());
    }
}

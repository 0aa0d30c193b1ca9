//! Final invariant gate for a merged dataset.
//!
//! A dataset is usable only after `InvariantValidator::validate` returns Ok.
//! Any transform that touches row content must be followed by another pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tickalign_core::{Config, Error, Location, MergedDataset, Result, TimestampSec};
use tracing::{info, warn};

/// A run of missing seconds between two consecutive rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    /// Last second present before the gap.
    pub after: TimestampSec,
    /// Number of seconds absent.
    pub missing: i64,
}

/// Summary of a dataset that passed validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub rows: usize,
    /// Distinct seconds covered by the rows.
    pub seconds: usize,
    /// Columns including the timestamp column.
    pub columns: usize,
    pub first: Option<TimestampSec>,
    pub last: Option<TimestampSec>,
    pub gaps: Vec<Gap>,
}

impl ValidationReport {
    /// Total seconds absent inside the covered span.
    pub fn missing_seconds(&self) -> i64 {
        self.gaps.iter().map(|g| g.missing).sum()
    }

    /// Fraction of seconds in the covered span that have a row.
    pub fn coverage(&self) -> f64 {
        match (self.first, self.last) {
            (Some(first), Some(last)) => self.seconds as f64 / (last - first + 1) as f64,
            _ => 0.0,
        }
    }
}

/// Checks ordering, header shape and cell contents of a merged dataset.
#[derive(Debug, Clone)]
pub struct InvariantValidator {
    timestamp_column: String,
    strictly_increasing: bool,
}

impl InvariantValidator {
    /// Create a validator from configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            timestamp_column: config.single_timestamp_column_name.clone(),
            strictly_increasing: config.timestamp_strictly_increasing,
        }
    }

    /// Validate the dataset, failing on the first offending row.
    ///
    /// With `timestamp_strictly_increasing` off, repeated seconds are
    /// tolerated but decreasing ones are still rejected.
    pub fn validate(&self, dataset: &MergedDataset) -> Result<ValidationReport> {
        self.check_header(dataset)?;

        let width = dataset.columns.len();
        let mut gaps = Vec::new();
        let mut seconds = 0;
        let mut prev: Option<TimestampSec> = None;

        for (idx, row) in dataset.rows.iter().enumerate() {
            let loc = || Location::row(idx).at(row.timestamp);

            if let Some(p) = prev {
                if row.timestamp < p || (self.strictly_increasing && row.timestamp == p) {
                    return Err(Error::validation(
                        loc().column(self.timestamp_column.as_str()),
                        format!("timestamp not strictly increasing (previous {p})"),
                    ));
                }
                if row.timestamp - p > 1 {
                    gaps.push(Gap {
                        after: p,
                        missing: row.timestamp - p - 1,
                    });
                }
            }
            if prev != Some(row.timestamp) {
                seconds += 1;
            }
            prev = Some(row.timestamp);

            if row.cells.len() != width {
                return Err(Error::validation(
                    loc(),
                    format!("row has {} cells, header has {} data columns", row.cells.len(), width),
                ));
            }
            for (column, cell) in dataset.columns.iter().zip(&row.cells) {
                if !cell.is_scalar() {
                    return Err(Error::validation(
                        loc().column(column.as_str()),
                        format!("{} value in output column", cell.kind()),
                    ));
                }
                if cell.is_missing() {
                    return Err(Error::validation(
                        loc().column(column.as_str()),
                        "empty cell",
                    ));
                }
            }
        }

        let report = ValidationReport {
            rows: dataset.rows.len(),
            seconds,
            columns: width + 1,
            first: dataset.rows.first().map(|r| r.timestamp),
            last: dataset.rows.last().map(|r| r.timestamp),
            gaps,
        };
        if report.rows == 0 {
            warn!("validated an empty dataset");
        }
        info!(
            rows = report.rows,
            columns = report.columns,
            gaps = report.gaps.len(),
            missing_seconds = report.missing_seconds(),
            "dataset passed validation"
        );
        Ok(report)
    }

    fn check_header(&self, dataset: &MergedDataset) -> Result<()> {
        if dataset.timestamp_column != self.timestamp_column {
            return Err(Error::validation(
                Location::default().column(dataset.timestamp_column.as_str()),
                format!("timestamp column must be named '{}'", self.timestamp_column),
            ));
        }
        let header = dataset.header();
        let ts_count = header.iter().filter(|c| **c == self.timestamp_column).count();
        if ts_count != 1 {
            return Err(Error::validation(
                Location::default().column(self.timestamp_column.as_str()),
                format!("expected exactly one timestamp column, found {ts_count}"),
            ));
        }
        let mut seen = BTreeSet::new();
        for name in header {
            if !seen.insert(name) {
                return Err(Error::validation(
                    Location::default().column(name),
                    "duplicate column name",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tickalign_core::{MergedRow, Value};

    fn dataset(rows: &[(i64, Vec<Value>)]) -> MergedDataset {
        let mut ds = MergedDataset::new("timestamp", vec!["mid".into(), "fee".into()]);
        ds.rows = rows
            .iter()
            .map(|(ts, cells)| MergedRow {
                timestamp: *ts,
                cells: cells.clone(),
            })
            .collect();
        ds
    }

    fn good(v: f64) -> Vec<Value> {
        vec![Value::from(v), Value::Int(3)]
    }

    fn validator() -> InvariantValidator {
        InvariantValidator::new(&Config::default())
    }

    #[test]
    fn test_valid_dataset_with_gaps() {
        let ds = dataset(&[(10, good(1.0)), (11, good(1.1)), (14, good(1.2))]);
        let report = validator().validate(&ds).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.seconds, 3);
        assert_eq!(report.columns, 3);
        assert_eq!(report.gaps, vec![Gap { after: 11, missing: 2 }]);
        assert_eq!(report.missing_seconds(), 2);
        assert_relative_eq!(report.coverage(), 0.6);
    }

    #[test]
    fn test_duplicate_timestamp() {
        let ds = dataset(&[(10, good(1.0)), (11, good(1.1)), (11, good(1.2))]);
        let err = validator().validate(&ds).unwrap_err();
        let loc = err.location().unwrap();
        assert_eq!(loc.row, Some(2));
        assert_eq!(loc.timestamp, Some(11));
    }

    #[test]
    fn test_duplicates_allowed_when_toggle_off() {
        let config = Config {
            timestamp_strictly_increasing: false,
            ..Config::default()
        };
        let ds = dataset(&[(10, good(1.0)), (10, good(1.1))]);
        assert!(InvariantValidator::new(&config).validate(&ds).is_ok());

        let ds = dataset(&[(10, good(1.0)), (10, good(1.1)), (11, good(1.2))]);
        let report = InvariantValidator::new(&config).validate(&ds).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.seconds, 2);
        assert_relative_eq!(report.coverage(), 1.0);

        let ds = dataset(&[(10, good(1.0)), (9, good(1.1))]);
        assert!(InvariantValidator::new(&config).validate(&ds).is_err());
    }

    #[test]
    fn test_empty_cells_rejected() {
        for bad in [Value::Null, Value::float(f64::NAN), Value::from("")] {
            let ds = dataset(&[(10, good(1.0)), (11, vec![Value::from(1.0), bad.clone()])]);
            let err = validator().validate(&ds).unwrap_err();
            let loc = err.location().unwrap();
            assert_eq!(loc.row, Some(1));
            assert_eq!(loc.column.as_deref(), Some("fee"));
        }
    }

    #[test]
    fn test_compound_cell_rejected() {
        let ds = dataset(&[(10, vec![Value::from(vec![1.0, 2.0]), Value::Int(1)])]);
        let err = validator().validate(&ds).unwrap_err();
        assert!(err.to_string().contains("sequence"));
    }

    #[test]
    fn test_second_timestamp_column_rejected() {
        let mut ds = dataset(&[]);
        ds.columns.push("timestamp".into());
        assert!(matches!(
            validator().validate(&ds),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_wrong_timestamp_name_rejected() {
        let mut ds = dataset(&[(1, good(1.0))]);
        ds.timestamp_column = "ts".into();
        assert!(validator().validate(&ds).is_err());
    }

    #[test]
    fn test_ragged_row_rejected() {
        let ds = dataset(&[(1, vec![Value::from(1.0)])]);
        assert!(validator().validate(&ds).is_err());
    }

    #[test]
    fn test_empty_dataset_passes() {
        let report = validator().validate(&dataset(&[])).unwrap();
        assert_eq!(report.rows, 0);
        assert_eq!(report.coverage(), 0.0);
    }
}

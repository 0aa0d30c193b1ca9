//! Timestamp quantization onto the one-second grid.
//!
//! Each raw record is assigned the second obtained by snapping its timestamp
//! forward, so a row never carries information from after its own second.

use tickalign_core::{
    ceil_to_second, Config, Error, Location, Result, TickRecord, TimestampSec,
};
use tracing::debug;

/// A raw record tagged with its bucket key.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTick {
    /// Quantized second.
    pub second: TimestampSec,
    /// Position in the raw stream, used to break timestamp ties.
    pub arrival: usize,
    /// The original record, untouched.
    pub record: TickRecord,
}

/// Assigns second-resolution bucket keys to a raw stream.
#[derive(Debug, Clone, Default)]
pub struct Quantizer;

impl Quantizer {
    /// Create a quantizer from configuration.
    ///
    /// Only forward rounding at a one-second cadence is accepted.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self)
    }

    /// Bucket key for a single timestamp.
    #[inline]
    pub fn quantize(&self, ts_ms: i64) -> TimestampSec {
        ceil_to_second(ts_ms)
    }

    /// Tag every record of one raw stream with its bucket key.
    ///
    /// Fails if timestamps decrease anywhere in the stream, or if the stream
    /// mixes sources.
    pub fn assign(&self, records: Vec<TickRecord>) -> Result<Vec<QuantizedTick>> {
        let source = records.first().map(|r| r.source);
        let mut out = Vec::with_capacity(records.len());
        let mut prev_ms: Option<i64> = None;

        for (arrival, record) in records.into_iter().enumerate() {
            if Some(record.source) != source {
                return Err(Error::input(
                    Location::row(arrival),
                    format!(
                        "record from {} in a {} stream",
                        record.source,
                        source.map(|s| s.as_str()).unwrap_or("?")
                    ),
                ));
            }
            if let Some(prev) = prev_ms {
                if record.ts_ms < prev {
                    return Err(Error::input(
                        Location::row(arrival),
                        format!(
                            "raw timestamp {} ms precedes previous {} ms",
                            record.ts_ms, prev
                        ),
                    ));
                }
            }
            prev_ms = Some(record.ts_ms);

            out.push(QuantizedTick {
                second: self.quantize(record.ts_ms),
                arrival,
                record,
            });
        }

        debug!(
            source = ?source,
            records = out.len(),
            first_second = ?out.first().map(|t| t.second),
            last_second = ?out.last().map(|t| t.second),
            "quantized raw stream"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickalign_core::Source;

    fn tick(ts_ms: i64) -> TickRecord {
        TickRecord::new(ts_ms, Source::OffChain).with("px", ts_ms as f64)
    }

    #[test]
    fn test_forward_snap() {
        let q = Quantizer::default();
        assert_eq!(q.quantize(100), 1);
        assert_eq!(q.quantize(900), 1);
        assert_eq!(q.quantize(1_001), 2);
    }

    #[test]
    fn test_boundary_is_fixed_point() {
        let q = Quantizer::default();
        for s in [0_i64, 1, 5, 1_735_689_600] {
            let t = s * 1_000;
            assert_eq!(q.quantize(t), s);
            assert_eq!(q.quantize(q.quantize(t) * 1_000), s);
        }
    }

    #[test]
    fn test_monotone_across_adjacent_seconds() {
        let q = Quantizer::default();
        let samples = [4_800_i64, 4_999, 5_000, 5_001, 5_200, 5_999, 6_000, 6_001];
        for pair in samples.windows(2) {
            assert!(q.quantize(pair[0]) <= q.quantize(pair[1]));
        }
    }

    #[test]
    fn test_assign_keeps_arrival_order() {
        let q = Quantizer::default();
        let ticks = q.assign(vec![tick(100), tick(900), tick(900), tick(1_001)]).unwrap();
        let keys: Vec<_> = ticks.iter().map(|t| (t.second, t.arrival)).collect();
        assert_eq!(keys, vec![(1, 0), (1, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn test_out_of_order_is_input_error() {
        let q = Quantizer::default();
        let err = q.assign(vec![tick(1_000), tick(1_200), tick(1_100)]).unwrap_err();
        match err {
            Error::Input { location, .. } => assert_eq!(location.row, Some(2)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mixed_sources_rejected() {
        let q = Quantizer::default();
        let on = TickRecord::new(2_000, Source::OnChain);
        assert!(q.assign(vec![tick(1_000), on]).is_err());
    }

    #[test]
    fn test_empty_stream() {
        assert!(Quantizer::default().assign(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let config = Config {
            system_heartbeat_seconds: 2,
            ..Config::default()
        };
        assert!(Quantizer::new(&config).is_err());
    }
}

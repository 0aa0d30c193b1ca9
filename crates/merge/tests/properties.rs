use std::collections::BTreeMap;
use tickalign_core::{CompoundShape, Config, Error, MergedDataset, Source, TickRecord, Value};
use tickalign_merge::{AlignmentEngine, InvariantValidator};

fn config() -> Config {
    let mut compound_fields = BTreeMap::new();
    compound_fields.insert("orderbook_bid".into(), CompoundShape::levels("orderbook_bid", 3));
    compound_fields.insert("orderbook_ask".into(), CompoundShape::levels("orderbook_ask", 3));
    compound_fields.insert("spread".into(), CompoundShape::keyed("spread", &["abs", "bps"]));
    compound_fields.insert("mid_prices".into(), CompoundShape::levels("mid_prices", 1));
    Config {
        compound_fields,
        ..Config::default()
    }
}

const T0: i64 = 1_735_689_600_000;

/// Off-chain book ticks at a ~200ms cadence with a few missing beats.
fn off_chain(seconds: i64) -> Vec<TickRecord> {
    let mut out = Vec::new();
    for step in 0..seconds * 5 {
        if step % 17 == 3 {
            continue;
        }
        let ts = T0 + step * 200 + 13;
        let px = 100.0 + step as f64 * 0.01;
        let mut spread = BTreeMap::new();
        spread.insert("abs".to_string(), Value::from(0.02));
        spread.insert("bps".to_string(), Value::from(2.0));
        out.push(
            TickRecord::new(ts, Source::OffChain)
                .with("orderbook_bid", vec![px, px - 0.01, px - 0.02])
                .with("orderbook_ask", vec![px + 0.02, px + 0.03, px + 0.04])
                .with("spread", Value::Object(spread))
                .with("mid_prices", vec![px + 0.01])
                .with("volume", step),
        );
    }
    out
}

/// On-chain ticks once per second, skipping every seventh second, with
/// occasional duplicate beats.
fn on_chain(seconds: i64) -> Vec<TickRecord> {
    let mut out = Vec::new();
    for s in 0..seconds {
        if s % 7 == 6 {
            continue;
        }
        let ts = T0 + s * 1_000 + 450;
        out.push(TickRecord::new(ts, Source::OnChain).with("mempool_size", s * 10));
        if s % 5 == 0 {
            out.push(TickRecord::new(ts + 300, Source::OnChain).with("mempool_size", s * 10 + 1));
        }
    }
    out
}

fn run(config: Config, seconds: i64) -> MergedDataset {
    AlignmentEngine::new(config)
        .unwrap()
        .run(off_chain(seconds), on_chain(seconds))
        .unwrap()
        .dataset
}

#[test]
fn strict_output_has_no_empty_cells() {
    let ds = run(config(), 120);
    assert!(!ds.is_empty());
    for row in &ds.rows {
        assert_eq!(row.cells.len(), ds.columns.len());
        for cell in &row.cells {
            assert!(cell.is_scalar());
            assert!(!cell.is_missing());
        }
    }
}

#[test]
fn output_timestamps_strictly_increase() {
    let ds = run(config(), 120);
    let ts: Vec<_> = ds.timestamps().collect();
    for pair in ts.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[test]
fn split_group_yields_nine_columns_plus_scalars() {
    let ds = run(config(), 10);
    // 9 split columns + volume off-chain, mempool_size on-chain.
    assert_eq!(ds.columns.len(), 11);
    assert_eq!(ds.header().iter().filter(|c| **c == "timestamp").count(), 1);
}

#[test]
fn strict_merge_skips_on_chain_gaps() {
    let ds = run(config(), 30);
    for ts in ds.timestamps() {
        let s = ts - T0 / 1_000;
        // On-chain record at s*1000+450 snaps to second s+1.
        assert_ne!((s - 1) % 7, 6, "second {ts} should have been dropped");
    }
}

#[test]
fn keep_latest_within_second() {
    let ds = run(config(), 30);
    // Second 0 on-chain has beats at 450ms and 750ms; the 750ms one wins.
    let second = T0 / 1_000 + 1;
    let idx = ds.timestamps().position(|t| t == second).unwrap();
    assert_eq!(ds.get(idx, "mempool_size"), Some(&Value::Int(1)));
}

#[test]
fn pipeline_is_deterministic() {
    let a = run(config(), 300);
    let b = run(config(), 300);
    assert_eq!(a, b);
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn forward_fill_covers_union_without_empty_cells() {
    let strict = run(config(), 60);
    let filled = run(
        Config {
            merge_requires_no_nans: false,
            ..config()
        },
        60,
    );
    assert!(filled.len() > strict.len());
    let report = InvariantValidator::new(&config()).validate(&filled).unwrap();
    assert_eq!(report.rows, filled.len());
}

#[test]
fn validator_rejects_tampered_output() {
    let mut ds = run(config(), 20);
    let col = ds.column_index("volume").unwrap();
    ds.rows[4].cells[col] = Value::Null;
    let err = InvariantValidator::new(&config()).validate(&ds).unwrap_err();
    match err {
        Error::Validation { location, .. } => {
            assert_eq!(location.row, Some(4));
            assert_eq!(location.column.as_deref(), Some("volume"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn rotation_chunks_partition_rows() {
    let engine = AlignmentEngine::new(Config {
        rotation_minutes: 1,
        ..config()
    })
    .unwrap();
    let out = engine.run(off_chain(200), on_chain(200)).unwrap();
    let chunks = engine.chunks(&out.dataset);
    assert!(chunks.len() >= 3);
    assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), out.dataset.len());
    for chunk in &chunks {
        let first = out.dataset.rows[chunk.rows.start].timestamp;
        let last = out.dataset.rows[chunk.rows.end - 1].timestamp;
        assert!(last - first < 60);
    }
}

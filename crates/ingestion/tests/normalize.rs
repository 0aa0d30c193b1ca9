use std::collections::BTreeMap;
use tickalign_core::{CompoundShape, Config, Error, Source, TickRecord, Value};
use tickalign_ingestion::{IntraSecondReducer, Quantizer, StructuredFieldSplitter};

fn config() -> Config {
    let mut compound_fields = BTreeMap::new();
    compound_fields.insert("orderbook_bid".into(), CompoundShape::levels("orderbook_bid", 2));
    compound_fields.insert("orderbook_ask".into(), CompoundShape::levels("orderbook_ask", 2));
    Config {
        compound_fields,
        ..Config::default()
    }
}

fn book(ts_ms: i64, bid: &str, ask: &str) -> TickRecord {
    TickRecord::new(ts_ms, Source::OffChain)
        .with("orderbook_bid", bid)
        .with("orderbook_ask", ask)
}

#[test]
fn normalizes_string_encoded_books() {
    let config = config();
    let quantizer = Quantizer::new(&config).unwrap();
    let splitter = StructuredFieldSplitter::new(&config);
    let mut reducer = IntraSecondReducer::new();

    let raw = vec![
        book(1_735_689_600_100, "[10.0, 9.9]", "[10.2, 10.3]"),
        book(1_735_689_600_700, "[10.1, 10.0]", "[10.25, 10.35]"),
        book(1_735_689_601_000, "[10.2, 10.1]", "[10.3, 10.4]"),
        book(1_735_689_601_300, "[10.3, 10.2]", "[10.4, 10.5]"),
    ];
    let rows = splitter
        .split_all(reducer.reduce(quantizer.assign(raw).unwrap()))
        .unwrap();

    // 00.100 and 00.700 snap to :01, 01.000 stays on :01 and is the latest there.
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].timestamp, 1_735_689_601);
    assert_eq!(rows[0].origin_ms, 1_735_689_601_000);
    assert_eq!(rows[0].fields["orderbook_bid_1"], Value::from(10.2));
    assert_eq!(rows[1].timestamp, 1_735_689_602);
    assert_eq!(rows[1].fields["orderbook_ask_2"], Value::from(10.5));
    assert!(rows.iter().all(|r| r.first_compound_field().is_none()));
    assert_eq!(reducer.stats().collapsed, 2);
}

#[test]
fn malformed_book_fails_whole_stream() {
    let config = config();
    let quantizer = Quantizer::new(&config).unwrap();
    let splitter = StructuredFieldSplitter::new(&config);
    let mut reducer = IntraSecondReducer::new();

    let raw = vec![
        book(1_000, "[10.0, 9.9]", "[10.2, 10.3]"),
        book(2_000, "[10.0, 9.9, 9.8]", "[10.2, 10.3]"),
    ];
    let err = splitter
        .split_all(reducer.reduce(quantizer.assign(raw).unwrap()))
        .unwrap_err();
    match err {
        Error::Schema { location, .. } => {
            assert_eq!(location.row, Some(1));
            assert_eq!(location.timestamp, Some(2));
            assert_eq!(location.column.as_deref(), Some("orderbook_bid"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn reduction_output_is_strictly_increasing() {
    let quantizer = Quantizer::default();
    let mut reducer = IntraSecondReducer::new();
    let raw: Vec<_> = (0..200)
        .map(|i| TickRecord::new(i * 137 + (i % 3) * 11, Source::OnChain).with("n", i))
        .collect();
    let mut sorted = raw.clone();
    sorted.sort_by_key(|r| r.ts_ms);
    let reduced = reducer.reduce(quantizer.assign(sorted).unwrap());

    for pair in reduced.windows(2) {
        assert!(pair[0].second < pair[1].second);
    }
    for tick in &reduced {
        assert!(tick.record.ts_ms <= tick.second * 1_000);
        assert!(tick.record.ts_ms > (tick.second - 1) * 1_000);
    }
}

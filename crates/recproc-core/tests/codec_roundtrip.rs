//! Round-trip law for the JSON codec
//!
//! For any batch the data model can express, decoding the encoded bytes
//! gives back the same records in the same order.

use proptest::prelude::*;
use recproc_core::codec;
use recproc_core::{Record, RecordBatch};
use serde_json::{Map, Number, Value};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        any::<u64>().prop_map(|n| Value::Number(n.into())),
        any::<f64>()
            .prop_filter("JSON has no NaN or infinity", |f| f.is_finite())
            .prop_map(|f| Number::from_f64(f).map_or(Value::Null, Value::Number)),
        ".*".prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn record() -> impl Strategy<Value = Record> {
    proptest::collection::btree_map("\\PC{0,12}", value(), 0..8)
        .prop_map(|m| m.into_iter().collect::<Map<String, Value>>())
}

fn batch() -> impl Strategy<Value = RecordBatch> {
    proptest::collection::vec(record(), 0..10).prop_map(RecordBatch::new)
}

proptest! {
    #[test]
    fn test_decode_inverts_encode(batch in batch()) {
        let bytes = codec::encode(&batch).unwrap();
        let decoded = codec::decode(&bytes).unwrap();
        prop_assert_eq!(decoded, batch);
    }

    #[test]
    fn test_from_value_matches_decode(batch in batch()) {
        let bytes = codec::encode(&batch).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        prop_assert_eq!(codec::from_value(value).unwrap(), codec::decode(&bytes).unwrap());
    }
}

#[test]
fn test_record_order_survives_round_trip() {
    let batch: RecordBatch = (0..100)
        .map(|i| {
            let mut record = Record::new();
            record.insert("id".to_string(), Value::from(i));
            record
        })
        .collect();

    let decoded = codec::decode(&codec::encode(&batch).unwrap()).unwrap();
    let ids: Vec<i64> = decoded.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, (0..100).collect::<Vec<_>>());
}

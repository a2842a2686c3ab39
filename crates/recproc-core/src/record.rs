//! Records and record batches
//!
//! A record is a JSON object: field names mapped to [`serde_json::Value`]s.
//! No schema is enforced, so two records in the same batch may carry
//! different fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single record: field name to value
pub type Record = Map<String, Value>;

/// An ordered, immutable batch of records
///
/// Serializes as a plain JSON array of objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordBatch {
    records: Vec<Record>,
}

impl RecordBatch {
    /// Create a batch from records, keeping their order
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// An empty batch
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in batch order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterate over records in batch order
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Consume the batch, returning its records
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl From<Vec<Record>> for RecordBatch {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

impl FromIterator<Record> for RecordBatch {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for RecordBatch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordBatch {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_batch_preserves_order() {
        let batch: RecordBatch = (0..5).map(|i| record(json!({"id": i}))).collect();
        let ids: Vec<_> = batch.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_batch_serializes_as_array() {
        let batch = RecordBatch::new(vec![record(json!({"a": 1})), record(json!({"b": null}))]);
        let text = serde_json::to_string(&batch).unwrap();
        assert_eq!(text, r#"[{"a":1},{"b":null}]"#);
    }

    #[test]
    fn test_empty_batch() {
        let batch = RecordBatch::empty();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
        assert_eq!(serde_json::to_string(&batch).unwrap(), "[]");
    }
}

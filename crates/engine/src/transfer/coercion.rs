use database_adapters::{ColumnKind, Row, RowBatch, TemporalKind, Value};
use std::collections::HashMap;

pub type CoercionFn = fn(Value) -> Value;

/// Normalizes source values before they are bound to the target insert.
///
/// Every [`ColumnKind`] maps to one function; kinds without a rule pass
/// through unchanged.
#[derive(Debug, Clone)]
pub struct CoercionTable {
    rules: HashMap<ColumnKind, CoercionFn>,
}

impl Default for CoercionTable {
    fn default() -> Self {
        Self::passthrough()
            .with_rule(ColumnKind::Temporal(TemporalKind::Date), to_text)
            .with_rule(ColumnKind::Binary, to_bytes)
            .with_rule(ColumnKind::Complex, to_text)
    }
}

impl CoercionTable {
    /// A table that leaves every value as the driver returned it.
    pub fn passthrough() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, kind: ColumnKind, rule: CoercionFn) -> Self {
        self.rules.insert(kind, rule);
        self
    }

    pub fn coerce(&self, kind: ColumnKind, value: Value) -> Value {
        match self.rules.get(&kind) {
            Some(rule) => rule(value),
            None => value,
        }
    }

    pub fn coerce_batch(&self, batch: RowBatch) -> Vec<Row> {
        let RowBatch { kinds, rows } = batch;
        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .enumerate()
                    .map(|(idx, value)| match kinds.get(idx) {
                        Some(kind) => self.coerce(*kind, value),
                        None => value,
                    })
                    .collect()
            })
            .collect()
    }
}

/// Text rendering; NULL stays NULL.
pub fn to_text(value: Value) -> Value {
    match value {
        Value::Text(_) | Value::Null => value,
        other => other.to_text().map(Value::Text).unwrap_or(Value::Null),
    }
}

/// Byte sequence; NULL stays NULL.
pub fn to_bytes(value: Value) -> Value {
    match value {
        Value::Bytes(_) | Value::Null => value,
        Value::Text(text) => Value::Bytes(text.into_bytes()),
        other => Value::Bytes(other.to_string().into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use uuid::Uuid;
    use serde_json::json;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_micro_opt(12, 30, 15, 123_456)
            .unwrap()
    }

    #[test]
    fn test_default_table() {
        let table = CoercionTable::default();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert_eq!(
            table.coerce(ColumnKind::Temporal(TemporalKind::Date), Value::Date(date)),
            Value::Text("2024-05-01".into())
        );
        assert_eq!(
            table.coerce(ColumnKind::Temporal(TemporalKind::Timestamp), Value::Timestamp(timestamp())),
            Value::Timestamp(timestamp())
        );
        assert_eq!(
            table.coerce(ColumnKind::Binary, Value::Bytes(vec![0, 1, 2])),
            Value::Bytes(vec![0, 1, 2])
        );
        assert_eq!(table.coerce(ColumnKind::Binary, Value::Null), Value::Null);
        assert_eq!(
            table.coerce(ColumnKind::Complex, Value::Json(json!({"k": 1}))),
            Value::Text(r#"{"k":1}"#.into())
        );
        assert_eq!(
            table.coerce(ColumnKind::Numeric, Value::Int(7)),
            Value::Int(7)
        );
    }

    #[test]
    fn test_time_passes_through_and_complex_reads_as_text() {
        let table = CoercionTable::default();
        let time = NaiveTime::from_hms_micro_opt(23, 59, 1, 500).unwrap();
        assert_eq!(
            table.coerce(ColumnKind::Temporal(TemporalKind::Time), Value::Time(time)),
            Value::Time(time)
        );

        // arrays and intervals arrive as their server text rendering
        assert_eq!(
            table.coerce(ColumnKind::Complex, Value::Text("{1,-2}".into())),
            Value::Text("{1,-2}".into())
        );
        let id = Uuid::nil();
        assert_eq!(
            table.coerce(ColumnKind::Complex, Value::Uuid(id)),
            Value::Text("00000000-0000-0000-0000-000000000000".into())
        );
        assert_eq!(table.coerce(ColumnKind::Complex, Value::Null), Value::Null);
        assert_eq!(table.coerce(ColumnKind::Numeric, Value::Bool(true)), Value::Bool(true));
    }

    #[test]
    fn test_custom_rule_replaces_default() {
        fn blank(_: Value) -> Value {
            Value::Null
        }
        let table = CoercionTable::default().with_rule(ColumnKind::Text, blank);
        assert_eq!(table.coerce(ColumnKind::Text, Value::Text("x".into())), Value::Null);
    }

    #[test]
    fn test_coerce_batch_applies_rules_per_column() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let batch = RowBatch::new(
            vec![ColumnKind::Numeric, ColumnKind::Temporal(TemporalKind::Date)],
            vec![
                vec![Value::Int(1), Value::Date(date)],
                vec![Value::Int(2), Value::Null],
            ],
        );

        let rows = CoercionTable::default().coerce_batch(batch);
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Text("2023-01-02".into())],
                vec![Value::Int(2), Value::Null],
            ]
        );
    }
}

use crate::config::error::ConfigError;
use crate::types::table::TableDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

/// One table to move: where it is read from and where it lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferUnit {
    pub object_name: String,
    #[serde(rename = "src_mtd")]
    pub source: TableDescriptor,
    #[serde(rename = "target_mtd")]
    pub target: TableDescriptor,
}

impl TransferUnit {
    pub fn new(object_name: impl Into<String>, source: TableDescriptor, target: TableDescriptor) -> Self {
        Self {
            object_name: object_name.into(),
            source,
            target,
        }
    }
}

/// A fully validated transfer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub units: Vec<TransferUnit>,
    pub batch_size: NonZeroUsize,
    pub source_connection_ref: String,
    pub target_connection_ref: String,
    pub window_query_template: Option<String>,
}

impl TransferJob {
    pub fn new(
        units: Vec<TransferUnit>,
        batch_size: usize,
        source_connection_ref: impl Into<String>,
        target_connection_ref: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let batch_size = NonZeroUsize::new(batch_size)
            .ok_or_else(|| ConfigError::invalid_batch_size(batch_size.to_string()))?;
        for unit in &units {
            unit.source.validate()?;
            unit.target.validate()?;
        }

        Ok(Self {
            units,
            batch_size,
            source_connection_ref: source_connection_ref.into(),
            target_connection_ref: target_connection_ref.into(),
            window_query_template: None,
        })
    }

    pub fn with_window_query(mut self, template: impl Into<String>) -> Self {
        self.window_query_template = Some(template.into());
        self
    }

    /// Windowed extraction applies only when a template is configured *and*
    /// the unit's source table names a window column.
    pub fn is_windowed(&self, unit: &TransferUnit) -> bool {
        self.window_query_template.is_some() && unit.source.window_column_name.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Raw job definition as written by the orchestrator.
#[derive(Debug, Deserialize)]
pub struct TransferJobConfig {
    object_mtd: OneOrMany<TransferUnit>,
    pub src_conn_id: String,
    pub target_conn_id: String,
    #[serde(deserialize_with = "deserialize_batch_size")]
    pub batch_size: String,
    #[serde(default)]
    pub window_sql: Option<String>,
}

impl TryFrom<TransferJobConfig> for TransferJob {
    type Error = ConfigError;

    fn try_from(config: TransferJobConfig) -> Result<Self, Self::Error> {
        let batch_size = config
            .batch_size
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::invalid_batch_size(config.batch_size.clone()))?;

        let job = TransferJob::new(
            config.object_mtd.into(),
            batch_size,
            config.src_conn_id,
            config.target_conn_id,
        )?;

        Ok(match config.window_sql {
            Some(template) => job.with_window_query(template),
            None => job,
        })
    }
}

fn deserialize_batch_size<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct BatchSizeVisitor;

    impl<'de> serde::de::Visitor<'de> for BatchSizeVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer batch size")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value < 0 {
                return Err(E::custom("batch size cannot be negative"));
            }
            Ok(value.to_string())
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_owned())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }
    }

    deserializer.deserialize_any(BatchSizeVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_UNIT: &str = "
object_mtd:
  object_name: customer
  src_mtd:
    schema_name: erp
    table_name: customer
    column_names: [id, name, cdc_ts]
    window_column_name: cdc_ts
  target_mtd:
    schema_name: stg
    table_name: customer
    column_names: [id, name, cdc_ts]
    fmc_window_col: load_cycle_ts
src_conn_id: erp
target_conn_id: dwh
batch_size: \"500\"
window_sql: SELECT max(cdc_ts) FROM stg.{object}
";

    #[test]
    fn test_single_unit_with_string_batch_size() {
        let config: TransferJobConfig = serde_yaml::from_str(SINGLE_UNIT).unwrap();
        let job = TransferJob::try_from(config).unwrap();

        assert_eq!(job.units.len(), 1);
        assert_eq!(job.batch_size.get(), 500);
        assert_eq!(job.source_connection_ref, "erp");
        assert_eq!(job.target_connection_ref, "dwh");
        assert!(job.is_windowed(&job.units[0]));
        assert_eq!(
            job.units[0].target.window_column_alias.as_deref(),
            Some("load_cycle_ts")
        );
    }

    #[test]
    fn test_unit_list_with_integer_batch_size() {
        let config: TransferJobConfig = serde_yaml::from_str(
            "
object_mtd:
  - object_name: a
    src_mtd: {schema_name: s, table_name: a, column_names: [x]}
    target_mtd: {schema_name: t, table_name: a, column_names: [x]}
  - object_name: b
    src_mtd: {schema_name: s, table_name: b, column_names: [y]}
    target_mtd: {schema_name: t, table_name: b, column_names: [y]}
src_conn_id: src
target_conn_id: tgt
batch_size: 2
",
        )
        .unwrap();
        let job = TransferJob::try_from(config).unwrap();

        let names: Vec<_> = job.units.iter().map(|u| u.object_name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(job.batch_size.get(), 2);
        assert!(job.window_query_template.is_none());
        assert!(!job.is_windowed(&job.units[0]));
    }

    #[test]
    fn test_rejects_zero_and_garbage_batch_sizes() {
        for raw in ["0", "\"zero\"", "-4"] {
            let yaml = SINGLE_UNIT.replace("\"500\"", raw);
            let result = serde_yaml::from_str::<TransferJobConfig>(&yaml)
                .map_err(ConfigError::from)
                .and_then(TransferJob::try_from);
            assert!(result.is_err(), "batch size {raw} should be rejected");
        }
    }

    #[test]
    fn test_windowed_requires_template_and_window_column() {
        let src = TableDescriptor::new("s", "t", ["a"]);
        let tgt = TableDescriptor::new("d", "t", ["a"]);
        let plain = TransferUnit::new("t", src.clone(), tgt.clone());
        let windowed = TransferUnit::new("t", src.with_window_column("a"), tgt);

        let job = TransferJob::new(vec![plain.clone(), windowed.clone()], 10, "s", "d").unwrap();
        assert!(!job.is_windowed(&plain));
        assert!(!job.is_windowed(&windowed));

        let job = job.with_window_query("SELECT 1");
        assert!(!job.is_windowed(&plain));
        assert!(job.is_windowed(&windowed));
    }
}

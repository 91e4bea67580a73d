use crate::config::components::connections::{
    ConnectionDetails, ConnectionProfile, ConnectionType, ConnectionsConfig, PollingConfig,
};
use crate::config::error::ConfigError;
use crate::types::transfer::{TransferJob, TransferJobConfig};
use serde::de::Error;
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use serde_yaml::{self, Error as YamlError, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Load every connection profile from a `connections.yml` file.
pub fn read_connections(path: &Path) -> Result<ConnectionsConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::missing_connections_file(path));
    }
    let conn_file = fs::File::open(path)?;
    let raw_connections: HashMap<String, Value> = serde_yaml::from_reader(conn_file)?;

    let mut connections: ConnectionsConfig = HashMap::new();
    for (profile, value) in raw_connections.into_iter() {
        let profile_connections = parse_connection_profile(value)
            .map_err(|err| ConfigError::parse_error(format!("profile {}: {}", profile, err)))?;
        connections.insert(profile, profile_connections);
    }

    Ok(connections)
}

/// Load the connections of a single named profile.
pub fn read_connection_profile(path: &Path, profile: &str) -> Result<ConnectionProfile, ConfigError> {
    let mut connections = read_connections(path)?;
    connections.remove(profile).ok_or_else(|| {
        ConfigError::not_found(format!(
            "profile '{}' is not defined in '{}'",
            profile,
            path.display()
        ))
    })
}

/// Load and validate a transfer job definition.
pub fn load_transfer_job(path: &Path) -> Result<TransferJob, ConfigError> {
    let file = fs::File::open(path)?;
    let config: TransferJobConfig = serde_yaml::from_reader(file)?;
    TransferJob::try_from(config)
}

fn parse_connection_profile(value: Value) -> Result<ConnectionProfile, YamlError> {
    // First try to interpret as a single connection definition.
    if let Ok(single) = serde_yaml::from_value::<RawConnectionDetails>(value.clone()) {
        let mut map = HashMap::new();
        map.insert("default".to_string(), single.into_connection_details()?);
        return Ok(map);
    }

    // Otherwise expect a map of named connections.
    let nested: HashMap<String, RawConnectionDetails> = serde_yaml::from_value(value)?;
    let mut profile = HashMap::new();
    for (name, raw) in nested.into_iter() {
        profile.insert(name, raw.into_connection_details()?);
    }
    Ok(profile)
}

#[derive(Debug, Deserialize)]
struct RawConnectionDetails {
    #[serde(default)]
    adapter: Option<ConnectionType>,
    #[serde(default)]
    conn_type: Option<ConnectionType>,
    host: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    database: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port_to_string")]
    port: Option<String>,
    #[serde(default)]
    extra: Option<Value>,
    #[serde(default)]
    polling: Option<PollingConfig>,
}

impl RawConnectionDetails {
    fn into_connection_details(self) -> Result<ConnectionDetails, YamlError> {
        let conn_type = self
            .conn_type
            .or(self.adapter)
            .ok_or_else(|| YamlError::custom("missing `adapter` or `conn_type`"))?;

        if conn_type == ConnectionType::Postgres && self.database.is_none() {
            return Err(YamlError::custom("postgres connections require `database`"));
        }

        let extra = match self.extra {
            None => Map::new(),
            Some(value) => match serde_yaml::from_value::<Json>(value)? {
                Json::Object(map) => map,
                Json::Null => Map::new(),
                other => {
                    return Err(YamlError::custom(format!(
                        "`extra` must be a mapping, got {}",
                        other
                    )))
                }
            },
        };

        let mut details = ConnectionDetails::new(
            conn_type,
            self.host.as_str(),
            self.port.as_deref(),
            self.user.as_str(),
            self.password.as_str(),
            self.database.as_deref(),
        );
        details.extra = extra;
        details.polling = self.polling;
        Ok(details)
    }
}

fn deserialize_port_to_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct PortVisitor;

    impl<'de> serde::de::Visitor<'de> for PortVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer port value")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value < 0 {
                return Err(E::custom("port cannot be negative"));
            }
            Ok(Some(value.to_string()))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value.to_owned()))
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(PortVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONNECTIONS: &str = "
dev:
  erp:
    adapter: postgres
    host: localhost
    port: 5432
    user: loader
    password: secret
    database: erp
  spark:
    adapter: livy
    host: http://livy:8998
    user: svc
    password: pw
    extra:
      conf:
        spark.executor.memory: 2g
    polling:
      interval_secs: 2
      timeout_secs: 600
prod:
  adapter: postgres
  host: db.internal
  port: \"6543\"
  user: loader
  password: secret
  database: dwh
";

    fn write_tmp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_named_and_single_profiles() {
        let file = write_tmp(CONNECTIONS);
        let config = read_connections(file.path()).expect("should load connections");

        let erp = &config["dev"]["erp"];
        assert_eq!(erp.conn_type, ConnectionType::Postgres);
        assert_eq!(erp.port.as_deref(), Some("5432"));
        assert_eq!(erp.database.as_deref(), Some("erp"));

        let spark = &config["dev"]["spark"];
        assert_eq!(spark.conn_type, ConnectionType::Livy);
        assert_eq!(spark.port, None);
        assert_eq!(spark.extra["conf"]["spark.executor.memory"], "2g");
        let polling = spark.polling.as_ref().unwrap();
        assert_eq!(polling.interval_secs, Some(2.0));
        assert_eq!(polling.timeout_secs, Some(600.0));

        let prod = &config["prod"]["default"];
        assert_eq!(prod.port.as_deref(), Some("6543"));
    }

    #[test]
    fn test_missing_profile_and_file() {
        let file = write_tmp(CONNECTIONS);
        let err = read_connection_profile(file.path(), "qa").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));

        let err = read_connections(Path::new("/definitely/not/here.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingConnection { .. }));
    }

    #[test]
    fn test_postgres_requires_database() {
        let file = write_tmp(
            "
dev:
  erp:
    adapter: postgres
    host: localhost
    user: u
    password: p
",
        );
        let err = read_connections(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_load_transfer_job_from_file() {
        let file = write_tmp(
            "
object_mtd:
  object_name: orders
  src_mtd: {schema_name: erp, table_name: orders, column_names: [id, total]}
  target_mtd: {schema_name: stg, table_name: orders, column_names: [id, total]}
src_conn_id: erp
target_conn_id: dwh
batch_size: 1000
",
        );
        let job = load_transfer_job(file.path()).unwrap();
        assert_eq!(job.units[0].object_name, "orders");
        assert_eq!(job.batch_size.get(), 1000);
    }
}

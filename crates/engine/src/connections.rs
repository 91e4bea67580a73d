use async_trait::async_trait;
use common::config::components::connections::{ConnectionDetails, ConnectionProfile};
use common::config::error::ConfigError;
use common::config::loader::read_connection_profile;
use database_adapters::{create_db_adapter, AsyncDbAdapter, DatabaseAdapterError};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not open connection '{conn_id}': {source}")]
    Adapter {
        conn_id: String,
        #[source]
        source: DatabaseAdapterError,
    },
}

/// Opens database connections by their configured name.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(&self, conn_id: &str) -> Result<AsyncDbAdapter, ConnectionError>;
}

/// Connections of one profile from `connections.yml`.
#[derive(Debug, Clone)]
pub struct ProfileConnections {
    profile: String,
    connections: ConnectionProfile,
}

impl ProfileConnections {
    pub fn new(profile: impl Into<String>, connections: ConnectionProfile) -> Self {
        Self {
            profile: profile.into(),
            connections,
        }
    }

    pub fn load(path: &Path, profile: &str) -> Result<Self, ConfigError> {
        let connections = read_connection_profile(path, profile)?;
        Ok(Self::new(profile, connections))
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn details(&self, conn_id: &str) -> Result<&ConnectionDetails, ConfigError> {
        self.connections
            .get(conn_id)
            .ok_or_else(|| ConfigError::missing_connection(conn_id, &self.profile))
    }
}

#[async_trait]
impl ConnectionFactory for ProfileConnections {
    async fn open(&self, conn_id: &str) -> Result<AsyncDbAdapter, ConnectionError> {
        let details = self.details(conn_id)?;
        info!("Opening connection '{}' ({:?})", conn_id, details.conn_type);
        create_db_adapter(conn_id, details)
            .await
            .map_err(|source| ConnectionError::Adapter {
                conn_id: conn_id.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::components::connections::ConnectionType;
    use std::collections::HashMap;

    fn profile() -> ProfileConnections {
        let mut connections = HashMap::new();
        connections.insert(
            "spark".to_string(),
            ConnectionDetails::new(ConnectionType::Livy, "http://livy:8998", None, "u", "p", None),
        );
        ProfileConnections::new("dev", connections)
    }

    #[tokio::test]
    async fn test_unknown_connection_is_a_config_error() {
        let err = profile().open("erp").await.err().unwrap();
        assert!(matches!(
            err,
            ConnectionError::Config(ConfigError::MissingConnection { .. })
        ));
    }

    #[tokio::test]
    async fn test_livy_connection_cannot_be_opened_as_database() {
        let err = profile().open("spark").await.err().unwrap();
        match err {
            ConnectionError::Adapter { conn_id, source } => {
                assert_eq!(conn_id, "spark");
                assert!(matches!(source, DatabaseAdapterError::ConfigError(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

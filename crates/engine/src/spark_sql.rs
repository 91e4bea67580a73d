use crate::connections::{ConnectionError, ConnectionFactory, ProfileConnections};
use common::config::components::connections::ConnectionType;
use common::config::error::ConfigError;
use common::utils::split_sql_statements;
use database_adapters::{AsyncDbAdapter, DatabaseAdapterError};
use logging::timeit;
use shared_clients::livy::{LivyClient, LivyClientError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SparkSqlError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Livy(#[from] LivyClientError),
    #[error("Statement {statement} failed: {source}")]
    Statement {
        statement: String,
        #[source]
        source: DatabaseAdapterError,
    },
}

/// One or more SQL scripts executed against a named connection.
///
/// Livy connections run the scripts in a fresh Spark SQL session; database
/// connections execute the statements directly, one at a time.
#[derive(Debug, Clone)]
pub struct SparkSqlTask {
    conn_id: String,
    scripts: Vec<String>,
}

impl SparkSqlTask {
    pub fn new<S: Into<String>>(conn_id: impl Into<String>, scripts: impl IntoIterator<Item = S>) -> Self {
        Self {
            conn_id: conn_id.into(),
            scripts: scripts.into_iter().map(Into::into).collect(),
        }
    }

    pub async fn execute(&self, connections: &ProfileConnections) -> Result<(), SparkSqlError> {
        let details = connections.details(&self.conn_id)?;
        timeit!(format!("SQL on '{}' finished", self.conn_id), {
            match details.conn_type {
                ConnectionType::Livy => {
                    let client = LivyClient::from_connection(details);
                    client.run(self.scripts.as_slice()).await.map_err(SparkSqlError::from)
                }
                ConnectionType::Postgres => {
                    let mut adapter = connections.open(&self.conn_id).await?;
                    let result = self.run_statements(&mut adapter).await;
                    if let Err(err) = adapter.close().await {
                        warn!("Failed to close connection '{}': {}", self.conn_id, err);
                    }
                    result
                }
            }
        })
    }

    async fn run_statements(&self, adapter: &mut AsyncDbAdapter) -> Result<(), SparkSqlError> {
        let statements: Vec<String> = self
            .scripts
            .iter()
            .flat_map(|script| split_sql_statements(script))
            .collect();
        info!("Running {} statements.", statements.len());

        for (i, statement) in statements.into_iter().enumerate() {
            if let Err(source) = adapter.execute(&statement).await {
                return Err(SparkSqlError::Statement { statement, source });
            }
            info!("Statement number {} completed.", i);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::components::connections::{ConnectionDetails, PollingConfig};
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn livy_profile(uri: &str) -> ProfileConnections {
        let mut details = ConnectionDetails::new(ConnectionType::Livy, uri, None, "svc", "pw", None);
        details.extra.insert("queue".to_string(), json!("etl"));
        details.polling = Some(PollingConfig {
            interval_secs: Some(0.001),
            ..PollingConfig::default()
        });
        ProfileConnections::new("dev", HashMap::from([("spark".to_string(), details)]))
    }

    #[tokio::test]
    async fn test_livy_connection_runs_scripts_in_session() -> Result<(), SparkSqlError> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .and(body_json(json!({"kind": "sql", "queue": "etl"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 0, "state": "starting"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sessions/0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 0, "state": "idle"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sessions/0/statements"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 0, "state": "waiting"})))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sessions/0/statements/0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 0,
                "state": "available",
                "output": {"status": "ok"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/sessions/0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        SparkSqlTask::new(
            "spark",
            ["CREATE TABLE a AS SELECT 1;\nINSERT INTO a SELECT 2;", "DROP TABLE a"],
        )
        .execute(&livy_profile(&server.uri()))
        .await
    }

    #[tokio::test]
    async fn test_unknown_connection_is_rejected() {
        let err = SparkSqlTask::new("nope", ["SELECT 1"])
            .execute(&livy_profile("http://localhost:1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SparkSqlError::Config(ConfigError::MissingConnection { .. })
        ));
    }
}

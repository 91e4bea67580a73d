use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Postgres,
    Livy,
}

/// Polling knobs for connections that are driven through a status endpoint
/// (currently Livy). Every field is optional; unset fields keep the client
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_secs: Option<f64>,
    pub max_attempts: Option<u32>,
    pub timeout_secs: Option<f64>,
    pub backoff_factor: Option<f64>,
    pub max_interval_secs: Option<f64>,
}

/// A single named connection as declared in `connections.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    pub conn_type: ConnectionType,
    pub host: String,
    pub port: Option<String>,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
    /// Free-form properties; for Livy these are merged into the session
    /// creation request.
    #[serde(default)]
    pub extra: Map<String, Value>,
    #[serde(default)]
    pub polling: Option<PollingConfig>,
}

impl ConnectionDetails {
    pub fn new(
        conn_type: ConnectionType,
        host: &str,
        port: Option<&str>,
        user: &str,
        password: &str,
        database: Option<&str>,
    ) -> Self {
        Self {
            conn_type,
            host: host.to_string(),
            port: port.map(str::to_string),
            user: user.to_string(),
            password: password.to_string(),
            database: database.map(str::to_string),
            extra: Map::new(),
            polling: None,
        }
    }
}

/// Named connections inside one profile (e.g. `src_erp`, `target_dwh`).
pub type ConnectionProfile = HashMap<String, ConnectionDetails>;

///  ---------------- Connections Config ----------------
///
/// Map of connection profiles (e.g. `dev`) to named connection definitions.
pub type ConnectionsConfig = HashMap<String, ConnectionProfile>;

pub mod postgres;
pub mod value;

pub use value::*;

use crate::postgres::PostgresAdapter;
use async_trait::async_trait;
use common::config::components::connections::{ConnectionDetails, ConnectionType};
use common::types::table::PlaceholderStyle;
use std::fmt::Display;

#[derive(Debug)]
pub enum DatabaseAdapterError {
    InvalidConnectionError(String),
    SyntaxError(String),
    UnexpectedError(String),
    IoError(std::io::Error),
    ConfigError(String),
    /// The driver does not support the requested operation (e.g. autocommit control).
    Unsupported(String),
    CursorError(String),
}

impl Display for DatabaseAdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseAdapterError::InvalidConnectionError(err) => {
                write!(f, "Invalid connection details: {}", err)
            }
            DatabaseAdapterError::SyntaxError(err) => {
                write!(f, "Syntax error: {}", err)
            }
            DatabaseAdapterError::UnexpectedError(err) => {
                write!(f, "Unexpected error: {}", err)
            }
            DatabaseAdapterError::IoError(err) => {
                write!(f, "I/O error: {}", err)
            }
            DatabaseAdapterError::ConfigError(err) => {
                write!(f, "Configuration error: {}", err)
            }
            DatabaseAdapterError::Unsupported(err) => {
                write!(f, "Unsupported operation: {}", err)
            }
            DatabaseAdapterError::CursorError(err) => {
                write!(f, "Cursor error: {}", err)
            }
        }
    }
}

impl std::error::Error for DatabaseAdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatabaseAdapterError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DatabaseAdapterError {
    fn from(err: std::io::Error) -> Self {
        DatabaseAdapterError::IoError(err)
    }
}

/// Cursor-style access to a relational connection.
///
/// Every adapter owns at most one open cursor; opening a new one discards the
/// previous result set. Calls are issued sequentially by a single task.
#[async_trait]
pub trait AsyncDatabaseAdapter: Send {
    /// Connection reference used in log lines and diagnostics.
    fn connection(&self) -> String;

    /// Bind-parameter syntax the driver expects in `open_cursor`/`execute_many`.
    fn placeholder_style(&self) -> PlaceholderStyle;

    async fn execute(&mut self, sql: &str) -> Result<(), DatabaseAdapterError>;

    /// First column of the first row returned by `sql`.
    async fn query_scalar(&mut self, sql: &str) -> Result<Value, DatabaseAdapterError>;

    async fn open_cursor(&mut self, sql: &str, params: &[Value]) -> Result<(), DatabaseAdapterError>;

    /// Up to `size` rows from the open cursor; an empty batch marks the end.
    async fn fetch_many(&mut self, size: usize) -> Result<RowBatch, DatabaseAdapterError>;

    /// Run `sql` once per row, binding the row's values positionally.
    async fn execute_many(&mut self, sql: &str, rows: &[Row]) -> Result<u64, DatabaseAdapterError>;

    async fn set_autocommit(&mut self, enabled: bool) -> Result<(), DatabaseAdapterError>;

    async fn commit(&mut self) -> Result<(), DatabaseAdapterError>;

    async fn close(&mut self) -> Result<(), DatabaseAdapterError>;
}

pub type AsyncDbAdapter = Box<dyn AsyncDatabaseAdapter>;

pub async fn create_db_adapter(
    name: &str,
    conn_details: &ConnectionDetails,
) -> Result<AsyncDbAdapter, DatabaseAdapterError> {
    match conn_details.conn_type {
        ConnectionType::Postgres => {
            let port = match conn_details.port.as_deref() {
                Some(port) => port.parse::<u16>().map_err(|e| {
                    DatabaseAdapterError::ConfigError(format!(
                        "invalid port '{}' for connection '{}': {}",
                        port, name, e
                    ))
                })?,
                None => 5432,
            };
            let database = conn_details.database.as_deref().ok_or_else(|| {
                DatabaseAdapterError::ConfigError(format!(
                    "connection '{}' does not name a database",
                    name
                ))
            })?;

            Ok(Box::new(
                PostgresAdapter::new(
                    name,
                    conn_details.host.as_str(),
                    port,
                    database,
                    conn_details.user.as_str(),
                    conn_details.password.as_str(),
                )
                .await?,
            ))
        }
        ConnectionType::Livy => Err(DatabaseAdapterError::ConfigError(format!(
            "connection '{}' is a Livy session endpoint, not a database",
            name
        ))),
    }
}

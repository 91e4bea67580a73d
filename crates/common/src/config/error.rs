use crate::error::diagnostics::DiagnosticMessage;
use std::{error::Error as StdError, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing connection: {context}")]
    MissingConnection { context: DiagnosticMessage },
    #[error("parse error: {context}")]
    ParseError {
        context: DiagnosticMessage,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
    #[error("filesystem error: {context}")]
    PathError {
        context: DiagnosticMessage,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
    #[error("missing window column: {context}")]
    MissingWindowColumn { context: DiagnosticMessage },
    #[error("invalid batch size: {context}")]
    InvalidBatchSize { context: DiagnosticMessage },
    #[error("invalid table metadata: {context}")]
    InvalidTable { context: DiagnosticMessage },
    #[error("invalid template: {context}")]
    InvalidTemplate { context: DiagnosticMessage },
    #[error("not found: {context}")]
    NotFound { context: DiagnosticMessage },
}

impl ConfigError {
    #[track_caller]
    pub fn missing_connection(conn_id: impl Into<String>, profile: &str) -> Self {
        let conn_id = conn_id.into();
        let message = format!("connection '{}' is not defined in profile '{}'", conn_id, profile);
        Self::MissingConnection {
            context: DiagnosticMessage::about(conn_id, message),
        }
    }

    #[track_caller]
    pub fn missing_connections_file(path: impl AsRef<Path>) -> Self {
        let message = format!(
            "Connection profile not found at '{}'. Ensure the file exists and is readable.",
            path.as_ref().display()
        );
        Self::MissingConnection {
            context: DiagnosticMessage::new(message),
        }
    }

    #[track_caller]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            context: DiagnosticMessage::new(message.into()),
            source: None,
        }
    }

    #[track_caller]
    pub fn missing_window_column(table_ref: impl Into<String>) -> Self {
        Self::MissingWindowColumn {
            context: DiagnosticMessage::about(
                table_ref,
                "a windowed fetch was requested but no window_column_name is set",
            ),
        }
    }

    #[track_caller]
    pub fn invalid_batch_size(raw: impl Into<String>) -> Self {
        let message = format!(
            "expected a positive integer batch size, got '{}'",
            raw.into()
        );
        Self::InvalidBatchSize {
            context: DiagnosticMessage::new(message),
        }
    }

    #[track_caller]
    pub fn invalid_table(table_ref: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTable {
            context: DiagnosticMessage::about(table_ref, message.into()),
        }
    }

    #[track_caller]
    pub fn invalid_template(object_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            context: DiagnosticMessage::about(object_name, message.into()),
        }
    }

    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            context: DiagnosticMessage::new(message.into()),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        let message = err.to_string();
        ConfigError::PathError {
            context: DiagnosticMessage::new(message),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    #[track_caller]
    fn from(err: serde_yaml::Error) -> Self {
        let message = err.to_string();
        ConfigError::ParseError {
            context: DiagnosticMessage::new(message),
            source: Some(Box::new(err)),
        }
    }
}

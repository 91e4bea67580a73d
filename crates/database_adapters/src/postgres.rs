use crate::{AsyncDatabaseAdapter, ColumnKind, DatabaseAdapterError, Row, RowBatch, TemporalKind, Value};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use common::types::table::PlaceholderStyle;
use futures::future::try_join_all;
use futures::TryStreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::error::Error as StdError;
use std::io::ErrorKind;
use std::pin::Pin;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use tokio_postgres::{Client, Error, NoTls, RowStream, Statement};
use tracing::{debug, error};
use uuid::Uuid;

impl From<Error> for DatabaseAdapterError {
    fn from(err: Error) -> Self {
        if let Some(e) = err.as_db_error() {
            match e.code() {
                &SqlState::CONNECTION_DOES_NOT_EXIST => {
                    DatabaseAdapterError::InvalidConnectionError(e.to_string())
                }
                &SqlState::SYNTAX_ERROR => DatabaseAdapterError::SyntaxError(e.to_string()),
                &SqlState::IO_ERROR => DatabaseAdapterError::IoError(std::io::Error::new(
                    ErrorKind::Other,
                    e.to_string(),
                )),
                _ => DatabaseAdapterError::UnexpectedError(e.to_string()),
            }
        } else {
            DatabaseAdapterError::UnexpectedError(err.to_string())
        }
    }
}

/// Map a Postgres type onto the driver-independent [`ColumnKind`].
pub fn column_kind(ty: &Type) -> ColumnKind {
    match *ty {
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => ColumnKind::Text,
        Type::BOOL | Type::INT2 | Type::INT4 | Type::INT8 | Type::OID | Type::FLOAT4
        | Type::FLOAT8 | Type::NUMERIC => ColumnKind::Numeric,
        Type::DATE => ColumnKind::Temporal(TemporalKind::Date),
        Type::TIME => ColumnKind::Temporal(TemporalKind::Time),
        Type::TIMESTAMP | Type::TIMESTAMPTZ => ColumnKind::Temporal(TemporalKind::Timestamp),
        Type::BYTEA => ColumnKind::Binary,
        _ => match ty.kind() {
            Kind::Enum(_) => ColumnKind::Text,
            Kind::Domain(inner) => column_kind(inner),
            _ => ColumnKind::Complex,
        },
    }
}

fn has_native_decoder(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::BYTEA
            | Type::DATE
            | Type::TIME
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::JSON
            | Type::JSONB
            | Type::UUID
    )
}

/// Cast needed to read a column of type `ty`, `None` when it decodes as is.
/// Domains are read as their base type, everything else without a decoder
/// as the server's text rendering.
fn decode_cast(ty: &Type) -> Option<String> {
    if has_native_decoder(ty) {
        return None;
    }
    match ty.kind() {
        Kind::Domain(inner) if has_native_decoder(inner) => Some(inner.name().to_string()),
        _ => Some("text".to_string()),
    }
}

/// Rewrite `sql` so that every result column has a native decoder.
///
/// Results always come back in binary format, so arrays, intervals,
/// composites and the like are cast on the server:
/// `SELECT c1, c2::text FROM (<sql>) AS fmc_src(c1, c2)`.
fn with_decodable_columns(sql: &str, types: &[Type]) -> Option<String> {
    let casts: Vec<Option<String>> = types.iter().map(decode_cast).collect();
    if casts.iter().all(Option::is_none) {
        return None;
    }
    let aliases: Vec<String> = (1..=types.len()).map(|idx| format!("c{}", idx)).collect();
    let projection: Vec<String> = aliases
        .iter()
        .zip(&casts)
        .map(|(alias, cast)| match cast {
            Some(ty) => format!("{}::{}", alias, ty),
            None => alias.clone(),
        })
        .collect();
    Some(format!(
        "SELECT {} FROM ({}) AS fmc_src({})",
        projection.join(", "),
        sql.trim().trim_end_matches(';'),
        aliases.join(", ")
    ))
}

fn decode_column(row: &tokio_postgres::Row, idx: usize) -> Result<Value, DatabaseAdapterError> {
    let ty = row.columns()[idx].type_();
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(v.into())),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(idx)?.map(Value::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        Type::TIME => row.try_get::<_, Option<NaiveTime>>(idx)?.map(Value::Time),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(Value::TimestampTz),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(Value::Json),
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.map(Value::Uuid),
        _ => {
            return Err(DatabaseAdapterError::UnexpectedError(format!(
                "column {} has type {} with no decoder",
                idx,
                ty.name()
            )))
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Row, DatabaseAdapterError> {
    (0..row.len()).map(|idx| decode_column(row, idx)).collect()
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|err| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(|date| date.and_time(NaiveTime::MIN))
                .map_err(|_| err)
        })
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        if matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME) {
            return match self.to_text() {
                Some(text) => text.to_sql(ty, out),
                None => Ok(IsNull::Yes),
            };
        }
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::OID => u32::try_from(*v)?.to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*v).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*v)?.to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Decimal(v) => match *ty {
                Type::FLOAT4 | Type::FLOAT8 => v
                    .to_f64()
                    .ok_or("numeric value does not fit a float")?
                    .to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 => Value::Int(
                    v.to_i64().ok_or("numeric value does not fit an integer")?,
                )
                .to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Text(v) => match *ty {
                Type::DATE => NaiveDate::parse_from_str(v, "%Y-%m-%d")?.to_sql(ty, out),
                Type::TIME => NaiveTime::parse_from_str(v, "%H:%M:%S%.f")?.to_sql(ty, out),
                Type::TIMESTAMP => parse_timestamp(v)?.to_sql(ty, out),
                Type::TIMESTAMPTZ => parse_timestamp(v)?.and_utc().to_sql(ty, out),
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(v)?.to_sql(ty, out)
                }
                Type::UUID => Uuid::parse_str(v)?.to_sql(ty, out),
                Type::NUMERIC => v.parse::<Decimal>()?.to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Bytes(v) => v.to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::Time(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => v.to_sql(ty, out),
            Value::TimestampTz(v) => v.to_sql(ty, out),
            Value::Json(v) => v.to_sql(ty, out),
            Value::Uuid(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

struct Cursor {
    kinds: Vec<ColumnKind>,
    stream: Pin<Box<RowStream>>,
    exhausted: bool,
}

/* ----- async Postgres adapter ----- */

pub struct PostgresAdapter {
    name: String,
    client: Client,
    driver: Option<tokio::task::JoinHandle<()>>,
    autocommit: bool,
    in_transaction: bool,
    cursor: Option<Cursor>,
    insert_statement: Option<(String, Statement)>,
}

impl PostgresAdapter {
    /// Create and connect (spawning the connection driver in the background)
    pub async fn new(
        name: &str,
        host: &str,
        port: u16,
        db: &str,
        user: &str,
        password: &str,
    ) -> Result<Self, DatabaseAdapterError> {
        let conn_str = format!(
            "host={} port={} user={} password={} dbname={}",
            host, port, user, password, db
        );
        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;
        let conn_name = name.to_string();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres driver task for '{}' exited: {}", conn_name, e);
            }
        });
        debug!("Connected to '{}' ({}:{}/{})", name, host, port, db);

        Ok(Self {
            name: name.to_string(),
            client,
            driver: Some(driver),
            autocommit: true,
            in_transaction: false,
            cursor: None,
            insert_statement: None,
        })
    }

    /// Postgres has no session-level autocommit switch, so an explicit
    /// transaction is opened lazily before the first statement.
    async fn ensure_transaction(&mut self) -> Result<(), DatabaseAdapterError> {
        if !self.autocommit && !self.in_transaction {
            self.client.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Prepare a query, rewritten with server-side casts when some result
    /// column has no native decoder. Kinds come from the original columns.
    async fn prepare_decodable(
        &self,
        sql: &str,
    ) -> Result<(Statement, Vec<ColumnKind>), DatabaseAdapterError> {
        let statement = self.client.prepare(sql).await?;
        let types: Vec<Type> = statement
            .columns()
            .iter()
            .map(|column| column.type_().clone())
            .collect();
        let kinds = types.iter().map(column_kind).collect();
        match with_decodable_columns(sql, &types) {
            Some(rewritten) => {
                debug!("Reading '{}' through text casts: {}", self.name, rewritten);
                Ok((self.client.prepare(&rewritten).await?, kinds))
            }
            None => Ok((statement, kinds)),
        }
    }

    async fn prepared_insert(&mut self, sql: &str) -> Result<Statement, DatabaseAdapterError> {
        if let Some((cached_sql, statement)) = &self.insert_statement {
            if cached_sql == sql {
                return Ok(statement.clone());
            }
        }
        let statement = self.client.prepare(sql).await?;
        self.insert_statement = Some((sql.to_string(), statement.clone()));
        Ok(statement)
    }
}

#[async_trait]
impl AsyncDatabaseAdapter for PostgresAdapter {
    fn connection(&self) -> String {
        self.name.clone()
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numbered
    }

    async fn execute(&mut self, sql: &str) -> Result<(), DatabaseAdapterError> {
        self.ensure_transaction().await?;
        self.client.batch_execute(sql).await?; // waits until server confirms
        Ok(())
    }

    async fn query_scalar(&mut self, sql: &str) -> Result<Value, DatabaseAdapterError> {
        self.ensure_transaction().await?;
        let (statement, _) = self.prepare_decodable(sql).await?;
        let rows = self.client.query(&statement, &[]).await?;
        let row = rows.first().ok_or_else(|| {
            DatabaseAdapterError::UnexpectedError(format!("query returned no rows: {}", sql))
        })?;
        if row.is_empty() {
            return Err(DatabaseAdapterError::UnexpectedError(format!(
                "query returned no columns: {}",
                sql
            )));
        }
        decode_column(row, 0)
    }

    async fn open_cursor(&mut self, sql: &str, params: &[Value]) -> Result<(), DatabaseAdapterError> {
        self.cursor = None;
        let (statement, kinds) = self.prepare_decodable(sql).await?;
        let stream = self
            .client
            .query_raw(&statement, params.iter().map(|v| v as &(dyn ToSql + Sync)))
            .await?;

        self.cursor = Some(Cursor {
            kinds,
            stream: Box::pin(stream),
            exhausted: false,
        });
        Ok(())
    }

    async fn fetch_many(&mut self, size: usize) -> Result<RowBatch, DatabaseAdapterError> {
        let cursor = self.cursor.as_mut().ok_or_else(|| {
            DatabaseAdapterError::CursorError(format!("no open cursor on '{}'", self.name))
        })?;

        let mut rows = Vec::with_capacity(size.min(4096));
        while !cursor.exhausted && rows.len() < size {
            match cursor.stream.as_mut().try_next().await? {
                Some(row) => rows.push(decode_row(&row)?),
                None => cursor.exhausted = true,
            }
        }
        Ok(RowBatch::new(cursor.kinds.clone(), rows))
    }

    async fn execute_many(&mut self, sql: &str, rows: &[Row]) -> Result<u64, DatabaseAdapterError> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.ensure_transaction().await?;
        let statement = self.prepared_insert(sql).await?;

        let params: Vec<Vec<&(dyn ToSql + Sync)>> = rows
            .iter()
            .map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync)).collect())
            .collect();
        // pipelined on the one connection, still executed in row order
        let counts = try_join_all(
            params
                .iter()
                .map(|row| self.client.execute(&statement, row.as_slice())),
        )
        .await?;
        Ok(counts.into_iter().sum())
    }

    async fn set_autocommit(&mut self, enabled: bool) -> Result<(), DatabaseAdapterError> {
        if enabled && self.in_transaction {
            self.commit().await?;
        }
        self.autocommit = enabled;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DatabaseAdapterError> {
        if self.in_transaction {
            self.client.batch_execute("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DatabaseAdapterError> {
        self.cursor = None;
        self.insert_statement = None;
        let result = if self.in_transaction {
            self.in_transaction = false;
            debug!("Rolling back uncommitted work on '{}'", self.name);
            self.client
                .batch_execute("ROLLBACK")
                .await
                .map_err(DatabaseAdapterError::from)
        } else {
            Ok(())
        };
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        result
    }
}

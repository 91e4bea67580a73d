pub mod coercion;
pub mod window;


use crate::connections::{ConnectionError, ConnectionFactory};
use coercion::CoercionTable;
use common::config::error::ConfigError;
use common::error::diagnostics::DiagnosticMessage;
use common::types::transfer::{TransferJob, TransferUnit};
use database_adapters::AsyncDbAdapter;
use logging::timeit;
use std::error::Error as StdError;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use window::render_window_query;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),
    #[error("transfer of '{object_name}' failed: {context}: {source}")]
    Unit {
        object_name: String,
        context: DiagnosticMessage,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TransferError {
    #[track_caller]
    pub fn unit(
        object_name: &str,
        step: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Unit {
            object_name: object_name.to_string(),
            context: DiagnosticMessage::about(object_name, step.into()),
            source: source.into(),
        }
    }
}

fn failed<'a, E>(object_name: &'a str, step: &'static str) -> impl FnOnce(E) -> TransferError + 'a
where
    E: StdError + Send + Sync + 'static,
{
    move |err| TransferError::unit(object_name, step, err)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitReport {
    pub object_name: String,
    pub windowed: bool,
    pub batches: usize,
    pub rows: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub units: Vec<UnitReport>,
    /// `false` when the target refused to turn autocommit off.
    pub explicit_commits: bool,
}

impl TransferReport {
    pub fn total_rows(&self) -> u64 {
        self.units.iter().map(|unit| unit.rows).sum()
    }
}

/// Moves tables from a source connection to a target connection in
/// fixed-size batches, one unit after the other on a single connection pair.
pub struct BatchTableTransfer<F> {
    factory: F,
    coercions: CoercionTable,
}

impl<F: ConnectionFactory> BatchTableTransfer<F> {
    pub fn new(factory: F) -> Self {
        Self::with_coercions(factory, CoercionTable::default())
    }

    pub fn with_coercions(factory: F, coercions: CoercionTable) -> Self {
        Self { factory, coercions }
    }

    /// Run every unit of `job`. The first failure aborts the job; units that
    /// already committed keep their data. Both connections are closed on
    /// every exit path once opened.
    pub async fn execute(&self, job: &TransferJob) -> Result<TransferReport, TransferError> {
        timeit!(format!("Transfer of {} unit(s) finished", job.units.len()), {
            self.execute_scoped(job).await
        })
    }

    async fn execute_scoped(&self, job: &TransferJob) -> Result<TransferReport, TransferError> {
        info!("Establishing connections.");
        let mut source = self.factory.open(&job.source_connection_ref).await?;
        let mut target = match self.factory.open(&job.target_connection_ref).await {
            Ok(target) => target,
            Err(err) => {
                close_connection(&mut source).await;
                return Err(err.into());
            }
        };
        info!("Connections established.");

        let result = self.transfer_units(job, &mut source, &mut target).await;

        close_connection(&mut source).await;
        close_connection(&mut target).await;
        if result.is_ok() {
            info!("Finished loading data.");
        }
        result
    }

    async fn transfer_units(
        &self,
        job: &TransferJob,
        source: &mut AsyncDbAdapter,
        target: &mut AsyncDbAdapter,
    ) -> Result<TransferReport, TransferError> {
        let explicit_commits = match target.set_autocommit(false).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "Target '{}' does not support disabling autocommit, continuing with driver default: {}",
                    target.connection(),
                    err
                );
                false
            }
        };

        let mut report = TransferReport {
            units: Vec::with_capacity(job.units.len()),
            explicit_commits,
        };
        for unit in &job.units {
            let outcome = timeit!(format!("Transferred {}", unit.object_name), {
                self.transfer_unit(job, unit, source, target, explicit_commits)
                    .await
            });
            match outcome {
                Ok(unit_report) => report.units.push(unit_report),
                Err(err) => {
                    error!("Transfer of '{}' failed: {}", unit.object_name, err);
                    return Err(err);
                }
            }
        }
        Ok(report)
    }

    async fn transfer_unit(
        &self,
        job: &TransferJob,
        unit: &TransferUnit,
        source: &mut AsyncDbAdapter,
        target: &mut AsyncDbAdapter,
        explicit_commits: bool,
    ) -> Result<UnitReport, TransferError> {
        let object = unit.object_name.as_str();
        let src_ref = unit.source.get_table_ref();
        let target_ref = unit.target.get_table_ref();
        info!("Transferring {}.", object);

        let truncate = unit.target.truncate_query();
        debug!("{}", truncate);
        target.execute(&truncate).await.map_err(failed(object, "truncate target"))?;
        if explicit_commits {
            target.commit().await.map_err(failed(object, "commit truncate"))?;
        }

        let window_template = job
            .window_query_template
            .as_deref()
            .filter(|_| job.is_windowed(unit));
        let windowed = window_template.is_some();

        match window_template {
            Some(template) => {
                let window_sql =
                    render_window_query(template, unit).map_err(failed(object, "render window query"))?;
                debug!("{}", window_sql);
                let start_date = target
                    .query_scalar(&window_sql)
                    .await
                    .map_err(failed(object, "read window start"))?;
                if start_date.is_null() {
                    warn!("Window query for {} returned NULL, no source rows will match", object);
                }
                info!(
                    "Start loading data from {} to {}, with start date: {}.",
                    src_ref, target_ref, start_date
                );
                let fetch = unit
                    .source
                    .windowed_fetch_query_with(source.placeholder_style())
                    .map_err(failed(object, "build windowed fetch"))?;
                source
                    .open_cursor(&fetch, &[start_date])
                    .await
                    .map_err(failed(object, "open windowed source cursor"))?;
            }
            None => {
                info!("Start loading data from {} to {}.", src_ref, target_ref);
                source
                    .open_cursor(&unit.source.fetch_query(), &[])
                    .await
                    .map_err(failed(object, "open source cursor"))?;
            }
        }

        let insert = unit.target.insert_query_with(target.placeholder_style());
        let batch_size = job.batch_size.get();
        info!("Using batches of size: {}.", batch_size);

        let mut batches = 0;
        let mut rows = 0u64;
        loop {
            let batch = source
                .fetch_many(batch_size)
                .await
                .map_err(failed(object, "fetch batch"))?;
            if batch.is_empty() {
                break;
            }
            batches += 1;
            info!("Loading batch {}.", batches);
            let values = self.coercions.coerce_batch(batch);
            target
                .execute_many(&insert, &values)
                .await
                .map_err(failed(object, "insert batch"))?;
            rows += values.len() as u64;
            debug!("{} rows loaded into {} so far", rows, target_ref);
        }
        info!("Total records transferred for {}: {}.", object, rows);

        if explicit_commits {
            target.commit().await.map_err(failed(object, "commit load"))?;
        }

        Ok(UnitReport {
            object_name: object.to_string(),
            windowed,
            batches,
            rows,
        })
    }
}

async fn close_connection(conn: &mut AsyncDbAdapter) {
    if let Err(err) = conn.close().await {
        warn!("Failed to close connection '{}': {}", conn.connection(), err);
    }
}

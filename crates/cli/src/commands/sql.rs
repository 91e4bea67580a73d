use clap::Args;
use common::error::FmcError;
use common::utils::read_sql_file;
use engine::{ProfileConnections, SparkSqlTask};
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct SqlArgs {
    /// Connection to run the scripts on (livy or a database)
    #[arg(long = "conn-id")]
    pub conn_id: String,
    /// SQL script(s), executed in the given order
    #[arg(long = "file", short = 'f', required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,
}

pub async fn handle_sql(args: &SqlArgs, connections_path: &Path, profile: &str) -> Result<(), FmcError> {
    let scripts = args
        .files
        .iter()
        .map(|path| read_sql_file(path))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| FmcError::Config(e.into()))?;
    let connections =
        ProfileConnections::load(connections_path, profile).map_err(|e| FmcError::Config(e.into()))?;

    SparkSqlTask::new(args.conn_id.as_str(), scripts)
        .execute(&connections)
        .await
        .map_err(|e| FmcError::SparkSql(e.into()))
}

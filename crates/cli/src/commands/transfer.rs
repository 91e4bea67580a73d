use clap::Args;
use common::config::loader::load_transfer_job;
use common::error::FmcError;
use engine::{BatchTableTransfer, ProfileConnections};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Args)]
pub struct TransferArgs {
    /// Transfer job definition (yaml)
    #[arg(long, short = 'j')]
    pub job: PathBuf,
}

/// Load the job and the connection profile, then move every unit.
pub async fn handle_transfer(
    args: &TransferArgs,
    connections_path: &Path,
    profile: &str,
) -> Result<(), FmcError> {
    let job = load_transfer_job(&args.job).map_err(|e| FmcError::Config(e.into()))?;
    let connections =
        ProfileConnections::load(connections_path, profile).map_err(|e| FmcError::Config(e.into()))?;

    let report = BatchTableTransfer::new(connections)
        .execute(&job)
        .await
        .map_err(|e| FmcError::Transfer(e.into()))?;

    for unit in &report.units {
        info!(
            "{}: {} rows in {} batches{}",
            unit.object_name,
            unit.rows,
            unit.batches,
            if unit.windowed { " (windowed)" } else { "" }
        );
    }
    Ok(())
}

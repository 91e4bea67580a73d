mod commands;

use crate::commands::{handle_sql, handle_transfer, SqlArgs, TransferArgs};
use clap::{Parser, Subcommand};
use common::error::FmcError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fmc", about = "Batch table transfers and Spark SQL over Livy")]
pub struct Cli {
    #[arg(
        long = "connections",
        short = 'c',
        help = "path to connections.yml",
        default_value = "connections.yml",
        global = true
    )]
    pub connections: PathBuf,
    #[arg(
        long = "profile",
        short = 'p',
        help = "connection profile to use",
        default_value = "dev",
        global = true
    )]
    pub profile: String,
    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Copy tables from a source to a target connection in batches
    Transfer(TransferArgs),
    /// Run SQL scripts on a Livy session or a database connection
    Sql(SqlArgs),
}

fn run_cmd(result: Result<(), FmcError>) {
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    logging::init_logger();
    let cli = Cli::parse();

    match &cli.command {
        Cmd::Transfer(args) => {
            run_cmd(handle_transfer(args, &cli.connections, &cli.profile).await)
        }
        Cmd::Sql(args) => run_cmd(handle_sql(args, &cli.connections, &cli.profile).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_transfer_with_global_flags() {
        let cli = Cli::parse_from([
            "fmc",
            "transfer",
            "--job",
            "jobs/orders.yml",
            "--profile",
            "prod",
        ]);
        assert_eq!(cli.profile, "prod");
        assert_eq!(cli.connections, PathBuf::from("connections.yml"));
        match cli.command {
            Cmd::Transfer(args) => assert_eq!(args.job, PathBuf::from("jobs/orders.yml")),
            _ => panic!("expected transfer"),
        }
    }

    #[test]
    fn test_parse_sql_with_several_files() {
        let cli = Cli::parse_from([
            "fmc", "-c", "conf/conn.yml", "sql", "--conn-id", "spark", "-f", "a.sql", "b.sql",
        ]);
        assert_eq!(cli.profile, "dev");
        match cli.command {
            Cmd::Sql(args) => {
                assert_eq!(args.conn_id, "spark");
                assert_eq!(args.files.len(), 2);
            }
            _ => panic!("expected sql"),
        }
    }

    #[tokio::test]
    async fn test_transfer_reports_missing_connection() {
        let mut connections = NamedTempFile::new().unwrap();
        writeln!(
            connections,
            "dev:\n  dwh:\n    adapter: postgres\n    host: localhost\n    database: dwh"
        )
        .unwrap();
        let mut job = NamedTempFile::new().unwrap();
        writeln!(
            job,
            "object_mtd:\n  object_name: orders\n  src_mtd: {{schema_name: erp, table_name: orders, column_names: [id]}}\n  target_mtd: {{schema_name: stg, table_name: orders, column_names: [id]}}\nsrc_conn_id: erp\ntarget_conn_id: dwh\nbatch_size: '500'"
        )
        .unwrap();

        let args = TransferArgs {
            job: job.path().to_path_buf(),
        };
        let err = handle_transfer(&args, connections.path(), "dev").await.unwrap_err();
        assert!(matches!(err, FmcError::Transfer(_)));
        assert!(err.to_string().contains("erp"));
    }
}

//! CBP Batch - customer file import tool

use anyhow::{Context, Result};
use cbp_batch::{BatchConfig, BatchStatus, CustomerImportJob, SqliteCustomerStore};
use cbp_common::logging::{init_logging, LogConfig, LogLevel};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cbp-batch")]
#[command(author, version, about = "Validate, encrypt and import customer CSV files")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// SQLite database receiving the customers
    #[arg(long, global = true, env = "CBP_DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Records per chunk
    #[arg(long, global = true, env = "CBP_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Write attempts per chunk, including the first
    #[arg(long, global = true, env = "CBP_RETRY_LIMIT")]
    retry_limit: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a customer file, then import it
    Run {
        /// Comma-separated input file with a header line
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Validate a customer file without importing anything
    Validate {
        /// Comma-separated input file with a header line
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("cbp-batch")
        .build()
        .merge_env()
        .context("Invalid logging configuration")?;

    let guard = init_logging(&log_config)?;

    let mut config = BatchConfig::from_env().context("Invalid batch configuration")?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(retry_limit) = cli.retry_limit {
        config.retry_limit = retry_limit;
    }
    config.validate().context("Invalid batch configuration")?;

    info!(config = ?config, "Loaded batch configuration");

    let result = match cli.command {
        Command::Run { file } => {
            let store = SqliteCustomerStore::open(&config.database_path).with_context(|| {
                format!("Failed to open database '{}'", config.database_path.display())
            })?;
            let job = CustomerImportJob::with_sqlite(config, Arc::new(store))?;
            job.run_job(&file).await
        },
        Command::Validate { file } => {
            // Validation never writes, so a throwaway store is enough
            let store = SqliteCustomerStore::open_in_memory()?;
            let job = CustomerImportJob::with_sqlite(config, Arc::new(store))?;
            job.validate_file(&file).await
        },
    };

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.status == BatchStatus::Failed {
        // Flush file logs before exiting
        drop(guard);
        process::exit(1);
    }

    Ok(())
}

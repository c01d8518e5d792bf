mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "idt")]
#[command(about = "Idea tracker: daily price import and cache maintenance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one portfolio row and print its ImportResult as JSON
    ImportRow {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Row as JSON: {"Type":..,"Ticker1":..,"Ticker2":..,"Note":..}
        #[arg(long, conflicts_with = "row_file")]
        row: Option<String>,

        /// File holding the row JSON
        #[arg(long)]
        row_file: Option<String>,
    },

    /// Import every row of a JSON array file and record successes
    ImportAll {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// File holding a JSON array of rows
        #[arg(long)]
        rows: String,

        /// Overrides /batch/concurrency
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Append an ImportResult to the success ledger (deduplicated on type + note)
    RecordSuccess {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// ImportResult JSON as printed by import-row
        #[arg(long)]
        result: String,
    },

    /// Print the success ledger as JSON
    Ledger {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Start a new cycle: clear negative cache and ledger, purge old series
    ResetCycle {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

/// Logs go to stderr; stdout carries only JSON results.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev-time secrets; absent in production.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ImportRow {
            config_paths,
            row,
            row_file,
        } => commands::import::import_row(&config_paths, row, row_file).await,
        Commands::ImportAll {
            config_paths,
            rows,
            concurrency,
        } => commands::import::import_all(&config_paths, rows, concurrency).await,
        Commands::RecordSuccess {
            config_paths,
            result,
        } => commands::import::record_success(&config_paths, &result).await,
        Commands::Ledger { config_paths } => commands::cycle::print_ledger(&config_paths).await,
        Commands::ResetCycle { config_paths } => commands::cycle::reset(&config_paths).await,
        Commands::ConfigHash { paths } => {
            let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            let loaded = idt_config::load_layered_yaml(&refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(())
        }
    }
}

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reel_storage::{read_movie_table_csv, TableError};
use reel_sync::{load_catalog, report_recent_runs_markdown, SyncConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "reel-cli")]
#[command(about = "Reel box office ETL command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, clean and persist the movie table, then chart and report it.
    Run,
    /// Re-render charts and the aggregate report from a persisted table.
    Visualize {
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        charts_dir: Option<PathBuf>,
    },
    /// List the most recent run reports.
    Report {
        #[arg(long, default_value_t = 1)]
        runs: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let run = reel_sync::run_sync_once_from_env().await?;
            let summary = run.summary;
            println!(
                "run complete: run_id={} fetched={} failed={} rows={} csv={} reports={}",
                summary.run_id,
                summary.fetched_records,
                summary.failed_fetches.len(),
                summary.retained_rows,
                summary.csv_path,
                summary.reports_dir
            );
        }
        Commands::Visualize { csv, charts_dir } => {
            let csv = csv.unwrap_or_else(|| config.csv_path());
            let charts_dir = charts_dir.unwrap_or_else(|| config.charts_dir.clone());
            let table = match read_movie_table_csv(&csv) {
                Ok(table) => table,
                Err(TableError::NotFound(path)) => {
                    bail!("{} not found; run the pipeline first", path.display())
                }
                Err(err) => return Err(err).context("loading movie table"),
            };
            info!(rows = table.len(), csv = %csv.display(), "loaded movie table");

            let charts = reel_analytics::render_all_charts(&table, &charts_dir)?;
            let presets = load_catalog(&config.workspace_root)?.presets();
            println!("{}", reel_analytics::render_markdown_report(&table, &presets));
            println!("charts written to {} ({} files)", charts_dir.display(), charts.len());
        }
        Commands::Report { runs } => {
            let markdown = report_recent_runs_markdown(runs, Some(config.output_dir.clone()))?;
            println!("{markdown}");
        }
    }

    Ok(())
}

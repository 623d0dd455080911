use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use flixlens_jobs::JobConfig;
use flixlens_providers::{OmdbClient, PoliticalEventsTable};
use flixlens_web::AppState;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "flixlens")]
#[command(about = "Flixlens catalog pipeline command-line interface")]
struct Cli {
    /// Database path; overrides FLIXLENS_DB
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the titles table and add any missing enrichment columns
    Init,
    /// Fill missing countries from the metadata provider
    FillCountries,
    /// Fill awards, political context, and primary genre for every row
    Enrich,
    /// Rewrite the cleaned table and export the canonical JSON snapshot
    Clean,
    /// Export the list-preserving snapshot variant
    Process,
    /// Regenerate dashboard charts and the preference snapshot
    Dashboards,
    /// Serve the JSON API
    Serve {
        #[arg(long, default_value_t = 5000)]
        port: u16,
    },
    /// Serve a directory with permissive CORS and caching disabled
    ServeStatic {
        #[arg(long, default_value_t = 8000)]
        port: u16,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = JobConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command {
        Commands::Init => {
            let pool = flixlens_store::connect(&config.db_path).await?;
            let added = flixlens_store::init_schema(&pool).await?;
            println!("schema ready: {added} column(s) added");
        }
        Commands::FillCountries => {
            let pool = flixlens_store::connect(&config.db_path).await?;
            let provider =
                OmdbClient::new(&config.metadata_base_url, &config.metadata_api_key)?;
            let summary =
                flixlens_jobs::fill_missing_countries(&pool, &provider, config.request_pause)
                    .await?;
            println!(
                "fill-countries complete: run_id={} scanned={} updated={} skipped={}",
                summary.run_id, summary.scanned, summary.updated, summary.skipped
            );
        }
        Commands::Enrich => {
            let pool = flixlens_store::connect(&config.db_path).await?;
            let provider =
                OmdbClient::new(&config.metadata_base_url, &config.metadata_api_key)?;
            let events = PoliticalEventsTable::builtin();
            let summary = flixlens_jobs::enrich_titles(&pool, &provider, &events).await?;
            println!(
                "enrich complete: run_id={} rows={} lookup_failures={}",
                summary.run_id, summary.rows, summary.lookup_failures
            );
        }
        Commands::Clean => {
            let pool = flixlens_store::connect(&config.db_path).await?;
            let summary = flixlens_jobs::run_clean(&pool, &config).await?;
            println!(
                "clean complete: run_id={} rows={} countries={} genres={} snapshot={}",
                summary.run_id,
                summary.rows,
                summary.distinct_countries,
                summary.distinct_genres,
                summary.snapshot_path
            );
        }
        Commands::Process => {
            let pool = flixlens_store::connect(&config.db_path).await?;
            let summary = flixlens_jobs::run_process(&pool, &config).await?;
            println!(
                "process complete: run_id={} rows={} countries={} snapshot={}",
                summary.run_id, summary.rows, summary.unique_countries, summary.snapshot_path
            );
        }
        Commands::Dashboards => {
            let pool = flixlens_store::connect(&config.db_path).await?;
            let summary = flixlens_jobs::dashboards::run_dashboards(&pool, &config).await?;
            println!(
                "dashboards complete: run_id={} charts={} countries={} preferences={}",
                summary.run_id, summary.charts_written, summary.countries, summary.preferences_path
            );
        }
        Commands::Serve { port } => {
            let pool = flixlens_store::connect(&config.db_path).await?;
            let state = AppState::new(pool, config.dashboards_dir.clone());
            flixlens_web::serve(state, port).await?;
        }
        Commands::ServeStatic { port, dir } => {
            flixlens_web::serve_static(&dir, port).await?;
        }
    }

    Ok(())
}

//! `resilience`: score point datasets by travel-time access to facilities,
//! using an offline cache of OpenStreetMap features.

mod commands;
mod dataset;

use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use resilience_core::cache::CacheManager;
use resilience_core::config::Config;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::AppContext;

const LOG_FILE_PREFIX: &str = "resilience.log";

/// Urban resilience scoring from cached OpenStreetMap data.
#[derive(Parser)]
#[command(name = "resilience", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the OSM cache for a dataset's extent.
    Download(commands::download::DownloadArgs),
    /// Score every point of a dataset.
    Run(commands::run::RunArgs),
    /// Inspect or clear the OSM cache.
    Cache(commands::cache::CacheArgs),
    /// Offline lookups against the cache.
    Query(commands::query::QueryArgs),
}

/// Initialize the tracing subscriber: stderr plus a daily log file.
///
/// Use RUST_LOG to change the level (e.g. RUST_LOG=debug). The returned
/// guard flushes the file writer and must live until exit.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,resilience_core=info,resilience_cli=info"));

    let file = Config::log_dir()
        .ok()
        .filter(|dir| std::fs::create_dir_all(dir).is_ok())
        .map(|dir| {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            tracing_appender::non_blocking(appender)
        });
    let (file_writer, guard) = match file {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_writer.map(|writer| fmt::layer().with_ansi(false).with_writer(writer)))
        .with(filter)
        .init();

    guard
}

/// Flip `cancel` on Ctrl-C so long jobs stop at the next safe point.
fn watch_ctrl_c(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            cancel.store(true, Ordering::Relaxed);
        }
    });
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let categories = config.categories()?;
    let cache = CacheManager::open_default()?;
    let cancel = Arc::new(AtomicBool::new(false));
    watch_ctrl_c(Arc::clone(&cancel));

    let ctx = AppContext {
        config,
        categories,
        cache,
        cancel,
    };

    match cli.command {
        Commands::Download(args) => commands::download::execute(args, &ctx).await,
        Commands::Run(args) => commands::run::execute(args, &ctx).await,
        Commands::Cache(args) => commands::cache::execute(args, &ctx),
        Commands::Query(args) => commands::query::execute(args, &ctx),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "resilience starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("resilience: error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

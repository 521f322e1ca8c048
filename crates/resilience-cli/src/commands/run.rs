//! The `run` subcommand: score every point of a dataset.

use std::path::PathBuf;

use anyhow::{Context, Result};
use resilience_core::api::MapboxIsochrones;
use resilience_core::models::BatchSummary;
use resilience_core::osm::{ensure_cache, CacheStatus, Downloader};
use resilience_core::query::LocalQueryEngine;
use resilience_core::resilience::{run_batch, CalculatorOptions, ResilienceCalculator};

use tracing::warn;

use super::{AppContext, StudyArgs};

/// Score each point by the facilities reachable within its travel-time bands.
#[derive(Debug, clap::Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub study: StudyArgs,

    /// Where to write the scored dataset (GeoJSON).
    #[arg(long, short)]
    pub output: PathBuf,
}

pub async fn execute(args: RunArgs, ctx: &AppContext) -> Result<()> {
    // A missing token must stop the run before anything is downloaded or written
    let token = ctx.config.resolve_token()?;
    let mut study = args.study.load()?;

    let downloader = Downloader::from_config(&ctx.config, ctx.categories.clone())?;
    let status = ensure_cache(
        &downloader,
        &ctx.cache,
        &study.area,
        &study.bbox_wgs84,
        ctx.config.request_delay(),
        false,
        ctx.download_progress(),
    )
    .await?;
    if let CacheStatus::Downloaded { report, metadata, .. } = &status {
        if report.cancelled {
            println!("Cancelled while building the cache; nothing scored. Run again to resume.");
            return Ok(());
        }
        if metadata.is_none() {
            anyhow::bail!("No OSM data could be downloaded for the study area");
        }
    }

    let store_path = ctx.cache.store_path();
    let mut engine = LocalQueryEngine::open(&store_path, ctx.categories.clone())
        .with_context(|| format!("Failed to open feature store at {}", store_path.display()))?;
    for key in ctx.categories.keys() {
        if !engine.has_table(key)? {
            warn!(category = key, "Category not in the cache, its scores will be empty");
        }
    }
    let provider = MapboxIsochrones::from_config(&ctx.config, token)?;
    let calculator = ResilienceCalculator::new(
        provider,
        ctx.categories.clone(),
        CalculatorOptions::from_config(&ctx.config, study.store_crs),
    );

    let points = study.dataset.points();
    let dataset = &mut study.dataset;
    let summary = run_batch(&points, &calculator, &mut engine, &ctx.cancel, |point, record| {
        dataset.apply(point, record);
    })
    .await;

    study.dataset.write(&args.output)?;
    print_summary(&summary, points.len());
    println!("Wrote {}", args.output.display());
    Ok(())
}

fn print_summary(summary: &BatchSummary, total: usize) {
    if summary.cancelled {
        println!("Cancelled after {} of {} points.", summary.processed(), total);
    }
    println!("Succeeded: {}", summary.succeeded);
    println!("No data:   {}", summary.no_data);
    if summary.partial > 0 {
        println!("Partial:   {} (some categories failed)", summary.partial);
    }
    println!("Failed:    {}", summary.failed);
    if summary.skipped > 0 {
        println!("Skipped:   {} (no point geometry)", summary.skipped);
    }
}

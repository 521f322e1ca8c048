//! The `download` subcommand: build the OSM cache for a dataset's extent.

use anyhow::Result;
use resilience_core::osm::{ensure_cache, CacheStatus, Downloader};
use tracing::info;

use super::{AppContext, StudyArgs};

/// Download OSM features for the dataset's extent into the local cache.
#[derive(Debug, clap::Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub study: StudyArgs,

    /// Seconds to wait between category requests (overrides the config).
    #[arg(long)]
    pub delay: Option<f64>,

    /// Re-download even if the cache matches the study area.
    #[arg(long)]
    pub force: bool,
}

pub async fn execute(args: DownloadArgs, ctx: &AppContext) -> Result<()> {
    let study = args.study.load()?;
    let delay = match args.delay {
        Some(secs) => std::time::Duration::from_secs_f64(secs.max(0.0)),
        None => ctx.config.request_delay(),
    };
    let downloader = Downloader::from_config(&ctx.config, ctx.categories.clone())?;

    info!(features = study.dataset.len(), bbox = ?study.bbox_wgs84, crs = %study.store_crs, "Preparing cache");
    let status = ensure_cache(
        &downloader,
        &ctx.cache,
        &study.area,
        &study.bbox_wgs84,
        delay,
        args.force,
        ctx.download_progress(),
    )
    .await?;

    match status {
        CacheStatus::Reused(metadata) => {
            println!("Cache is up to date (created {}).", metadata.age_display());
        }
        CacheStatus::Downloaded { report, metadata, resumed } => {
            if resumed {
                println!("Completing the existing cache:");
            }
            for (category, count) in &report.counts {
                let note = if report.failed.contains(category) { " (failed)" } else { "" };
                println!("  {:<20} {:>7}{}", category, count, note);
            }
            if report.cancelled {
                println!("Download cancelled; run again to resume.");
                return Ok(());
            }
            let Some(metadata) = metadata else {
                anyhow::bail!("No category could be downloaded");
            };
            println!("Cached {} features.", report.total_features());
            if !report.failed.is_empty() {
                println!(
                    "{} of {} categories stored; run again to retry the rest.",
                    metadata.categories.len(),
                    ctx.categories.len()
                );
            }
        }
    }
    Ok(())
}

//! The `cache` subcommand: inspect or clear the OSM cache.

use anyhow::Result;

use super::AppContext;

#[derive(Debug, clap::Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Debug, clap::Subcommand)]
pub enum CacheAction {
    /// Show what the cache holds.
    Info,
    /// Delete the cached features and metadata.
    Clear,
}

pub fn execute(args: CacheArgs, ctx: &AppContext) -> Result<()> {
    match args.action {
        CacheAction::Info => execute_info(ctx),
        CacheAction::Clear => {
            ctx.cache.clear()?;
            println!("Cache cleared.");
            Ok(())
        }
    }
}

fn execute_info(ctx: &AppContext) -> Result<()> {
    let Some(info) = ctx.cache.cache_info() else {
        println!("No cache at {}", ctx.cache.cache_dir().display());
        return Ok(());
    };

    println!("Location:   {}", ctx.cache.cache_dir().display());
    println!("Created:    {} ({})", info.created.format("%Y-%m-%d %H:%M UTC"), info.age);
    println!("OSM data:   {}", info.osm_timestamp.as_deref().unwrap_or("unknown"));
    println!("CRS:        {}", info.crs);
    if let Some(bbox) = info.bbox {
        println!(
            "Extent:     {}, {} - {}, {}",
            bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax
        );
    }
    println!("Size:       {:.2} MB", info.cache_size_mb);
    println!("Categories: {}", info.categories.join(", "));
    Ok(())
}

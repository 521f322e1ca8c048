//! The `query` subcommand: offline lookups against the cached features.
//!
//! Coordinates are in the cache's CRS. Results are printed as JSON lines.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geo::Polygon;
use geojson::GeoJson;
use resilience_core::models::BBox;
use resilience_core::query::LocalQueryEngine;
use resilience_core::spatial::polygon_from_geojson;
use serde::Serialize;

use super::AppContext;

#[derive(Debug, clap::Args)]
pub struct QueryArgs {
    #[command(subcommand)]
    pub action: QueryAction,
}

#[derive(Debug, clap::Subcommand)]
pub enum QueryAction {
    /// Features of a category inside a polygon.
    Within {
        #[arg(long, short)]
        category: String,
        /// GeoJSON file; its first polygon is used.
        #[arg(long)]
        polygon: PathBuf,
    },
    /// Closest feature of a category to a point.
    Nearest {
        #[arg(long, short)]
        category: String,
        #[arg(long, allow_negative_numbers = true)]
        x: f64,
        #[arg(long, allow_negative_numbers = true)]
        y: f64,
        /// Search radius; defaults to 50000 units.
        #[arg(long)]
        max_distance: Option<f64>,
    },
    /// Features of a category inside a rectangle.
    Bbox {
        #[arg(long, short)]
        category: String,
        #[arg(num_args = 4, value_names = ["XMIN", "YMIN", "XMAX", "YMAX"], allow_negative_numbers = true)]
        bounds: Vec<f64>,
    },
}

pub fn execute(args: QueryArgs, ctx: &AppContext) -> Result<()> {
    if !ctx.cache.cache_exists() {
        anyhow::bail!("No cache found; run `resilience download` first");
    }
    let mut engine = LocalQueryEngine::open(&ctx.cache.store_path(), ctx.categories.clone())?;

    match args.action {
        QueryAction::Within { category, polygon } => {
            let polygon = read_polygon(&polygon)?;
            print_lines(&engine.features_within(&category, &polygon)?)
        }
        QueryAction::Nearest {
            category,
            x,
            y,
            max_distance,
        } => match engine.nearest(&category, x, y, max_distance)? {
            Some(found) => print_lines(&[found]),
            None => {
                println!("No {} within range", category);
                Ok(())
            }
        },
        QueryAction::Bbox { category, bounds } => {
            let [xmin, ymin, xmax, ymax] = <[f64; 4]>::try_from(bounds)
                .map_err(|_| anyhow::anyhow!("expected XMIN YMIN XMAX YMAX"))?;
            print_lines(&engine.features_within_bbox(&category, &BBox::new(xmin, ymin, xmax, ymax))?)
        }
    }
}

fn print_lines<T: Serialize>(items: &[T]) -> Result<()> {
    for item in items {
        println!("{}", serde_json::to_string(item)?);
    }
    Ok(())
}

/// First polygon in a GeoJSON geometry, feature or feature collection.
fn read_polygon(path: &Path) -> Result<Polygon<f64>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson: GeoJson = contents
        .parse()
        .with_context(|| format!("Invalid GeoJSON in {}", path.display()))?;

    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::Geometry(geometry) => vec![geometry],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|feature| feature.geometry)
            .collect(),
    };

    geometries
        .iter()
        .find_map(|geometry| polygon_from_geojson(&geometry.value))
        .with_context(|| format!("No polygon in {}", path.display()))
}

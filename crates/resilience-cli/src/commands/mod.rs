//! Subcommand implementations.

pub mod cache;
pub mod download;
pub mod query;
pub mod run;

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use resilience_core::cache::{CacheManager, StudyArea};
use resilience_core::config::{CategoryTable, Config};
use resilience_core::models::BBox;
use resilience_core::osm::DownloadProgress;
use resilience_core::spatial::{Crs, CrsTransform};

use crate::dataset::PointDataset;

/// Everything a subcommand needs besides its own arguments.
pub struct AppContext {
    pub config: Config,
    pub categories: CategoryTable,
    pub cache: CacheManager,
    /// Set by Ctrl-C; checked between categories and between points.
    pub cancel: Arc<AtomicBool>,
}

impl AppContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Progress callback for downloads: prints a step line and stops on Ctrl-C.
    pub fn download_progress(&self) -> impl FnMut(DownloadProgress) -> ControlFlow<()> + '_ {
        move |step| {
            if self.is_cancelled() {
                return ControlFlow::Break(());
            }
            eprintln!("[{}/{}] Downloading {}", step.index + 1, step.total, step.category);
            ControlFlow::Continue(())
        }
    }
}

/// Study-area options shared by `download` and `run`.
#[derive(Debug, clap::Args)]
pub struct StudyArgs {
    /// Point dataset (GeoJSON FeatureCollection, WGS84).
    #[arg(long, short)]
    pub input: PathBuf,

    /// CRS the cached features are stored in.
    #[arg(long, default_value = "EPSG:4326")]
    pub store_crs: Crs,

    /// Margin in degrees added around the points' extent.
    #[arg(long, default_value_t = 0.0)]
    pub margin: f64,
}

pub struct Study {
    pub dataset: PointDataset,
    pub area: StudyArea,
    pub bbox_wgs84: BBox,
    pub store_crs: Crs,
}

impl StudyArgs {
    pub fn load(&self) -> Result<Study> {
        let dataset = PointDataset::read(&self.input)?;
        let bbox_wgs84 = dataset
            .bbox()
            .with_context(|| format!("{} contains no point features", self.input.display()))?
            .expand(self.margin.max(0.0));

        let store_bbox = CrsTransform::new(Crs::Wgs84, self.store_crs).transform_bbox(&bbox_wgs84);
        let area = StudyArea::from_bbox(store_bbox, self.store_crs.authid());

        Ok(Study {
            dataset,
            area,
            bbox_wgs84,
            store_crs: self.store_crs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_study_area_in_store_crs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("points.geojson");
        std::fs::write(
            &input,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [1.0, 0.5]}}
            ]}"#,
        )
        .unwrap();

        let args = StudyArgs {
            input,
            store_crs: Crs::WebMercator,
            margin: 0.5,
        };
        let study = args.load().unwrap();

        assert_eq!(study.bbox_wgs84, BBox::new(-0.5, -0.5, 1.5, 1.0));
        assert_eq!(study.area.crs, "EPSG:3857");
        let stored = study.area.bbox.unwrap();
        assert!(stored.xmin < -55_000.0 && stored.xmax > 166_000.0);
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.geojson");
        std::fs::write(&input, r#"{"type": "FeatureCollection", "features": []}"#).unwrap();

        let args = StudyArgs {
            input,
            store_crs: Crs::Wgs84,
            margin: 0.0,
        };
        assert!(args.load().is_err());
    }
}

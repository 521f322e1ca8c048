//! Resilience mapping core: an offline OSM feature cache, local spatial
//! queries over it, and travel-time based accessibility scoring.
//!
//! The network is touched in two places only: `osm::Downloader` fills the
//! cache once per study area, and an `IsochroneProvider` supplies travel-time
//! polygons per scored point. Everything else reads local data.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod osm;
pub mod query;
pub mod resilience;
pub mod spatial;

pub use api::{ApiError, MapboxIsochrones, OverpassClient};
pub use cache::{CacheManager, StudyArea};
pub use config::{CategoryTable, Config};
pub use error::{ConfigError, StoreError};
pub use models::{BBox, BatchSummary, FeatureRecord, ResilienceRecord};
pub use osm::{ensure_cache, Downloader};
pub use query::LocalQueryEngine;
pub use resilience::{run_batch, CalculatorOptions, PointInput, ResilienceCalculator};
pub use spatial::Crs;

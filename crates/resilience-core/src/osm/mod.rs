//! OSM download pipeline: tag predicates, element normalization and the
//! category downloader that fills the feature store.

pub mod downloader;
pub mod normalize;
pub mod tags;

pub use downloader::{ensure_cache, CacheStatus, DownloadProgress, DownloadReport, Downloader};
pub use normalize::{normalize_element, LatLon, RawElement, UNNAMED};
pub use tags::TagPredicate;

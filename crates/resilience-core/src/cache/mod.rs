//! Local caching module for offline OSM access.
//!
//! This module provides:
//! - `CacheManager`: owns the per-user cache directory and the study-area
//!   metadata that decides whether cached data can be reused
//! - `FeatureStore`: the table-per-category store the downloader fills and
//!   the local query engine reads, with a SQLite and an in-memory backend
//!
//! A cache is valid for exactly one study area and CRS. Any change to either
//! invalidates it as a whole; there is no partial reuse.

pub mod manager;
pub mod store;

pub use manager::{fingerprint, CacheInfo, CacheManager, CacheMetadata, StudyArea, CACHE_VERSION};
pub use store::{FeatureStore, MemoryStore, SqliteStore};

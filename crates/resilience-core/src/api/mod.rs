//! HTTP clients for the two upstream services.
//!
//! - `OverpassClient`: OSM feature downloads, used only while building the cache
//! - `MapboxIsochrones`: travel-time polygons, fetched per point while scoring
//!
//! Both share `ApiError` and the `retry` helper. Only these clients touch the
//! network; everything downstream of them works from local data.

pub mod error;
pub mod mapbox;
pub mod overpass;
pub mod retry;

pub use error::{ApiError, RetryClass};
pub use mapbox::MapboxIsochrones;
pub use overpass::{build_query, ElementSource, OverpassClient, OverpassResponse};
pub use retry::{retry, RetryPolicy};

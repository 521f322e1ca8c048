//! Data models shared by the cache, query and scoring layers.
//!
//! - `BBox`: axis-aligned study-area and query rectangles
//! - `FeatureRecord`, `NearestFeature`: cached facilities and lookup results
//! - `ResilienceRecord`, `PointOutcome`, `BatchSummary`: scoring output

pub mod feature;
pub mod resilience;

pub use feature::{BBox, FeatureRecord, NearestFeature};
pub use resilience::{BatchSummary, PointOutcome, ResilienceRecord};

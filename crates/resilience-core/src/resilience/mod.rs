//! Per-point resilience scoring.
//!
//! - `isochrone`: travel-time polygons and the provider seam
//! - `scoring`: band overlap removal, weights and aggregation
//! - `calculator`: isochrones plus local queries to a `ResilienceRecord`
//! - `batch`: sequential, cancellable scoring of many points

pub mod batch;
pub mod calculator;
pub mod isochrone;
pub mod scoring;

pub use batch::{run_batch, PointInput};
pub use calculator::{CalculatorOptions, ResilienceCalculator};
pub use isochrone::{Isochrone, IsochroneProvider};
pub use scoring::{aggregate, remove_band_overlap, BandSet, BandWeights, FailurePolicy};

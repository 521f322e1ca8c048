//! Offline spatial queries against the cached feature store.

pub mod engine;

pub use engine::{LocalQueryEngine, DEFAULT_NEAREST_DISTANCE};

//! Error types shared across the core crate.
//!
//! Upstream HTTP errors live in [`crate::api::ApiError`]; this module holds
//! the configuration and feature-store failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing isochrone access token - set MAPBOX_TOKEN or add mapbox_token to the config file")]
    MissingToken,

    #[error("Unsupported CRS: {0} (supported: EPSG:4326, EPSG:3857)")]
    UnsupportedCrs(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Invalid tag predicate {predicate:?}: {reason}")]
    InvalidPredicate { predicate: String, reason: String },

    #[error("Invalid category {category}: {reason}")]
    InvalidCategory { category: String, reason: String },

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to encode feature tags: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),
}

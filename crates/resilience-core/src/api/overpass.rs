//! Overpass API client for bulk OSM downloads.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::ApiError;
use crate::config::Config;
use crate::models::BBox;
use crate::osm::{RawElement, TagPredicate};

/// Extra client-side slack on top of the server-side query timeout.
const CLIENT_TIMEOUT_MARGIN_SECS: u64 = 10;

/// Parsed Overpass JSON output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<RawElement>,
    #[serde(default)]
    pub osm3s: Option<Osm3s>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Osm3s {
    pub timestamp_osm_base: Option<String>,
}

impl OverpassResponse {
    pub fn timestamp(&self) -> Option<&str> {
        self.osm3s
            .as_ref()
            .and_then(|m| m.timestamp_osm_base.as_deref())
    }
}

/// Anything that can answer an Overpass QL query.
pub trait ElementSource {
    fn fetch(&self, query: &str) -> impl Future<Output = Result<OverpassResponse, ApiError>> + Send;
}

/// Build one query selecting nodes, ways and relations matching any of
/// `predicates` inside `bbox` (WGS84), with centers for non-node elements.
pub fn build_query(bbox: &BBox, predicates: &[TagPredicate], timeout_secs: u64) -> String {
    // Overpass bbox order: south,west,north,east
    let bbox_str = format!("{},{},{},{}", bbox.ymin, bbox.xmin, bbox.ymax, bbox.xmax);
    let bbox_str = &bbox_str;

    let union_parts: Vec<String> = predicates
        .iter()
        .flat_map(|predicate| {
            ["node", "way", "relation"]
                .into_iter()
                .map(move |kind| format!("{}[{}]({})", kind, predicate, bbox_str))
        })
        .collect();

    format!(
        "[out:json][timeout:{}];({};);out center;",
        timeout_secs,
        union_parts.join(";")
    )
}

#[derive(Clone)]
pub struct OverpassClient {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl OverpassClient {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs + CLIENT_TIMEOUT_MARGIN_SECS))
            .user_agent(concat!("resilience-mapper/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            timeout_secs,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.overpass_url.clone(), config.overpass_timeout_secs)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

impl ElementSource for OverpassClient {
    async fn fetch(&self, query: &str) -> Result<OverpassResponse, ApiError> {
        info!(url = %self.url, timeout_secs = self.timeout_secs, "Querying Overpass API");
        debug!(query, "Overpass query");

        let response = self
            .client
            .post(&self.url)
            .form(&[("data", query)])
            .send()
            .await?;
        let response = ApiError::check(response).await?;

        let text = response.text().await?;
        let data: OverpassResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Overpass JSON: {}", e)))?;

        info!(elements = data.elements.len(), "Received OSM elements");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query() {
        let bbox = BBox::new(-0.5, 51.0, 0.5, 52.0);
        let predicates: Vec<TagPredicate> = vec![
            r#""amenity"="kindergarten""#.parse().unwrap(),
            r#""amenity"="childcare""#.parse().unwrap(),
        ];

        let query = build_query(&bbox, &predicates, 180);
        assert_eq!(
            query,
            concat!(
                "[out:json][timeout:180];(",
                r#"node["amenity"="kindergarten"](51,-0.5,52,0.5);"#,
                r#"way["amenity"="kindergarten"](51,-0.5,52,0.5);"#,
                r#"relation["amenity"="kindergarten"](51,-0.5,52,0.5);"#,
                r#"node["amenity"="childcare"](51,-0.5,52,0.5);"#,
                r#"way["amenity"="childcare"](51,-0.5,52,0.5);"#,
                r#"relation["amenity"="childcare"](51,-0.5,52,0.5);"#,
                ");out center;"
            )
        );
    }

    #[test]
    fn test_parse_response_with_timestamp() {
        let json = r#"{
            "version": 0.6,
            "osm3s": {"timestamp_osm_base": "2024-03-01T10:00:00Z", "copyright": "ODbL"},
            "elements": [
                {"type": "node", "id": 1, "lat": 51.5, "lon": -0.1, "tags": {"amenity": "school", "name": "St Mary"}},
                {"type": "way", "id": 2, "center": {"lat": 51.6, "lon": -0.2}, "tags": {"amenity": "school"}}
            ]
        }"#;

        let data: OverpassResponse = serde_json::from_str(json).unwrap();
        assert_eq!(data.elements.len(), 2);
        assert_eq!(data.timestamp(), Some("2024-03-01T10:00:00Z"));
    }

    #[test]
    fn test_parse_empty_response() {
        let data: OverpassResponse = serde_json::from_str("{}").unwrap();
        assert!(data.elements.is_empty());
        assert!(data.timestamp().is_none());
    }
}

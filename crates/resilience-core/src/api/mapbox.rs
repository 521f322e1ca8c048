//! Mapbox Isochrone API client.

use std::time::Duration;

use anyhow::Result;
use geo::{Area, Coord, Polygon};
use geojson::{FeatureCollection, GeoJson};
use reqwest::Client;
use tracing::debug;

use super::{retry, ApiError, RetryPolicy};
use crate::config::{Config, TravelProfile};
use crate::resilience::{Isochrone, IsochroneProvider};
use crate::spatial::polygon_from_geojson;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Attempts per isochrone request; scoring must not stall on one point.
const MAX_ATTEMPTS: u32 = 2;

#[derive(Clone)]
pub struct MapboxIsochrones {
    client: Client,
    base_url: String,
    token: String,
    policy: RetryPolicy<ApiError>,
}

impl MapboxIsochrones {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("resilience-mapper/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            policy: RetryPolicy::interactive(MAX_ATTEMPTS),
        })
    }

    /// Client for the configured service. `token` comes from
    /// [`Config::resolve_token`] so a missing token fails before any work.
    pub fn from_config(config: &Config, token: impl Into<String>) -> Result<Self> {
        Self::new(config.isochrone_base_url.clone(), token)
    }

    fn url(&self, profile: TravelProfile, origin: Coord<f64>) -> String {
        format!(
            "{}/isochrone/v1/mapbox/{}/{},{}",
            self.base_url,
            profile.as_str(),
            origin.x,
            origin.y
        )
    }

    async fn fetch_once(
        &self,
        url: &str,
        contours: &str,
        intervals: &[u32],
    ) -> Result<Vec<Isochrone>, ApiError> {
        let response = self
            .client
            .get(url)
            .query(&[
                ("contours_minutes", contours),
                ("polygons", "true"),
                ("access_token", self.token.as_str()),
            ])
            .send()
            .await?;
        let response = ApiError::check(response).await?;
        let text = response.text().await?;
        parse_isochrones(&text, intervals)
    }
}

impl IsochroneProvider for MapboxIsochrones {
    async fn fetch(
        &self,
        origin: Coord<f64>,
        profile: TravelProfile,
        intervals: &[u32],
    ) -> Result<Vec<Isochrone>, ApiError> {
        let url = self.url(profile, origin);
        let contours = intervals
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        debug!(profile = profile.as_str(), x = origin.x, y = origin.y, contours = %contours, "Requesting isochrones");

        retry(&self.policy, |_| self.fetch_once(&url, &contours, intervals)).await
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Turn an isochrone `FeatureCollection` into bands ordered fastest first.
///
/// Features are ordered by their `contour` property. When any feature lacks
/// it, polygons are ordered by area instead and labelled with `intervals`
/// in ascending order.
pub fn parse_isochrones(body: &str, intervals: &[u32]) -> Result<Vec<Isochrone>, ApiError> {
    let geojson: GeoJson = body
        .parse()
        .map_err(|e| ApiError::InvalidResponse(format!("Isochrone GeoJSON: {}", e)))?;
    let collection: FeatureCollection = match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        _ => {
            return Err(ApiError::InvalidResponse(
                "Expected an isochrone FeatureCollection".into(),
            ))
        }
    };

    let mut bands: Vec<(Option<u32>, Polygon<f64>)> = collection
        .features
        .iter()
        .filter_map(|feature| {
            let polygon = feature.geometry.as_ref().and_then(|g| polygon_from_geojson(&g.value))?;
            let contour = feature
                .property("contour")
                .and_then(|v| v.as_f64())
                .filter(|m| m.is_finite() && *m >= 0.0)
                .map(|m| m.round() as u32);
            Some((contour, polygon))
        })
        .collect();

    if bands.is_empty() {
        return Err(ApiError::InvalidResponse(
            "Isochrone response contained no polygons".into(),
        ));
    }

    if bands.iter().all(|(contour, _)| contour.is_some()) {
        bands.sort_by_key(|(contour, _)| *contour);
        return Ok(bands
            .into_iter()
            .filter_map(|(contour, polygon)| Some(Isochrone { minutes: contour?, polygon }))
            .collect());
    }

    let mut polygons: Vec<Polygon<f64>> = bands.into_iter().map(|(_, polygon)| polygon).collect();
    polygons.sort_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()));
    let mut sorted_intervals = intervals.to_vec();
    sorted_intervals.sort_unstable();

    Ok(polygons
        .into_iter()
        .zip(sorted_intervals)
        .map(|(polygon, minutes)| Isochrone { minutes, polygon })
        .collect())
}

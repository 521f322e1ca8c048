//! Raw Overpass elements to point feature records.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::models::FeatureRecord;

/// Name given to features with neither a `name` nor a `ref` tag.
pub const UNNAMED: &str = "Unnamed";

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// One element of Overpass JSON output (`out center`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawElement {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Precomputed center, present for ways and relations.
    pub center: Option<LatLon>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Reduce an element to a WGS84 point record.
///
/// Nodes keep their coordinates; ways and relations use their center and are
/// dropped without one. Other element types are dropped.
pub fn normalize_element(element: &RawElement) -> Option<FeatureRecord> {
    let (lon, lat) = match element.kind.as_str() {
        "node" => (element.lon?, element.lat?),
        "way" | "relation" => {
            let center = element.center?;
            (center.lon, center.lat)
        }
        _ => return None,
    };
    if !lon.is_finite() || !lat.is_finite() {
        return None;
    }

    let name = element
        .tags
        .get("name")
        .or_else(|| element.tags.get("ref"))
        .cloned()
        .unwrap_or_else(|| UNNAMED.to_string());

    Some(FeatureRecord {
        source_id: element.id.to_string(),
        name,
        source_type: element.kind.clone(),
        tags: element.tags.clone(),
        x: lon,
        y: lat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RawElement {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_node_keeps_coordinates() {
        let element = parse(r#"{"type": "node", "id": 7, "lat": 51.5, "lon": -0.12, "tags": {"name": "Hill School", "amenity": "school"}}"#);
        let record = normalize_element(&element).unwrap();
        assert_eq!(record.source_id, "7");
        assert_eq!(record.source_type, "node");
        assert_eq!(record.name, "Hill School");
        assert_eq!((record.x, record.y), (-0.12, 51.5));
        assert_eq!(record.tags.get("amenity").map(String::as_str), Some("school"));
    }

    #[test]
    fn test_node_on_null_island_is_kept() {
        let element = parse(r#"{"type": "node", "id": 1, "lat": 0.0, "lon": 0.0}"#);
        assert!(normalize_element(&element).is_some());
    }

    #[test]
    fn test_way_uses_center() {
        let element = parse(r#"{"type": "way", "id": 99, "center": {"lat": 10.0, "lon": 20.0}, "tags": {"ref": "B12"}}"#);
        let record = normalize_element(&element).unwrap();
        assert_eq!((record.x, record.y), (20.0, 10.0));
        assert_eq!(record.name, "B12");
    }

    #[test]
    fn test_way_without_center_is_dropped() {
        let element = parse(r#"{"type": "way", "id": 5, "tags": {"name": "Park"}}"#);
        assert!(normalize_element(&element).is_none());
    }

    #[test]
    fn test_unnamed_placeholder() {
        let element = parse(r#"{"type": "relation", "id": 3, "center": {"lat": 1.0, "lon": 1.0}}"#);
        assert_eq!(normalize_element(&element).unwrap().name, UNNAMED);
    }
}

//! GeoJSON point datasets: the input points and the scored output.

use std::path::Path;

use anyhow::{Context, Result};
use geojson::{FeatureCollection, GeoJson, Value};
use geo::Coord;
use resilience_core::models::{BBox, ResilienceRecord};
use resilience_core::resilience::PointInput;
use serde_json::json;

/// Output field holding the point's longitude.
pub const X_FIELD: &str = "X_coord";
/// Output field holding the point's latitude.
pub const Y_FIELD: &str = "Y_coord";

/// A GeoJSON `FeatureCollection` of points (RFC 7946, so WGS84).
pub struct PointDataset {
    collection: FeatureCollection,
}

impl PointDataset {
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid dataset: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        match contents.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => Ok(Self { collection }),
            _ => anyhow::bail!("expected a FeatureCollection"),
        }
    }

    pub fn len(&self) -> usize {
        self.collection.features.len()
    }

    /// One input per feature, identified by its position in the collection.
    pub fn points(&self) -> Vec<PointInput> {
        self.collection
            .features
            .iter()
            .enumerate()
            .map(|(index, feature)| PointInput {
                id: index.to_string(),
                location: feature.geometry.as_ref().and_then(|g| point_of(&g.value)),
            })
            .collect()
    }

    /// Extent of all usable points.
    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_coords(self.points().into_iter().filter_map(|p| p.location))
    }

    /// Write the coordinates and every score onto the feature `id` refers to.
    /// Unknown ids are ignored.
    pub fn apply(&mut self, point: &PointInput, record: &ResilienceRecord) {
        let Some(feature) = point
            .id
            .parse::<usize>()
            .ok()
            .and_then(|index| self.collection.features.get_mut(index))
        else {
            return;
        };

        if let Some(location) = point.location {
            feature.set_property(X_FIELD, location.x);
            feature.set_property(Y_FIELD, location.y);
        }
        for (field, value) in record.fields() {
            feature.set_property(field, json!(value));
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(&GeoJson::FeatureCollection(self.collection.clone()))?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write dataset: {}", path.display()))
    }
}

/// Single-point geometries only; a multipoint with exactly one member counts.
fn point_of(value: &Value) -> Option<Coord<f64>> {
    let position = match value {
        Value::Point(position) => position,
        Value::MultiPoint(positions) if positions.len() == 1 => &positions[0],
        _ => return None,
    };
    match position.as_slice() {
        [x, y, ..] if x.is_finite() && y.is_finite() => Some(Coord { x: *x, y: *y }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const POINTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "a"}, "geometry": {"type": "Point", "coordinates": [0.5, 0.25]}},
            {"type": "Feature", "properties": {"name": "b"}, "geometry": null},
            {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [1.5, -0.5]}}
        ]
    }"#;

    #[test]
    fn test_points_and_bbox() {
        let dataset = PointDataset::parse(POINTS).unwrap();
        let points = dataset.points();
        assert_eq!(dataset.len(), 3);
        assert_eq!(points[0].location, Some(Coord { x: 0.5, y: 0.25 }));
        assert_eq!(points[1].location, None);
        assert_eq!(dataset.bbox(), Some(BBox::new(0.5, -0.5, 1.5, 0.25)));
    }

    #[test]
    fn test_apply_writes_fields_and_nulls() {
        let mut dataset = PointDataset::parse(POINTS).unwrap();
        let points = dataset.points();
        let record = ResilienceRecord {
            scores: BTreeMap::from([("parks".to_string(), Some(1.5)), ("schools".to_string(), None)]),
            total: None,
        };

        dataset.apply(&points[0], &record);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        dataset.write(&path).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let props = &written["features"][0]["properties"];
        assert_eq!(props["name"], "a");
        assert_eq!(props["X_coord"], 0.5);
        assert_eq!(props["Y_coord"], 0.25);
        assert_eq!(props["R_parks"], 1.5);
        assert!(props["R_schools"].is_null());
        assert!(props["R_total"].is_null());
        assert!(written["features"][2]["properties"].get("R_total").is_none());
    }

    #[test]
    fn test_rejects_non_collection() {
        assert!(PointDataset::parse(r#"{"type": "Point", "coordinates": [0, 0]}"#).is_err());
    }
}

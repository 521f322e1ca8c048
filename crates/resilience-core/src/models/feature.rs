//! Feature-level domain types.

use std::collections::BTreeMap;

use geo::{Coord, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Bounding box in the coordinate system of whatever it describes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    /// Smallest box covering every coordinate, or `None` for no coordinates.
    pub fn from_coords<I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = Coord<f64>>,
    {
        coords.into_iter().fold(None, |acc, c| {
            Some(match acc {
                None => Self::new(c.x, c.y, c.x, c.y),
                Some(b) => Self::new(b.xmin.min(c.x), b.ymin.min(c.y), b.xmax.max(c.x), b.ymax.max(c.y)),
            })
        })
    }

    /// Grow the box by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.xmin - margin,
            self.ymin - margin,
            self.xmax + margin,
            self.ymax + margin,
        )
    }

    /// Boundary-inclusive point test.
    pub fn contains(&self, c: Coord<f64>) -> bool {
        c.x >= self.xmin && c.x <= self.xmax && c.y >= self.ymin && c.y <= self.ymax
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord { x: self.xmin, y: self.ymin },
            Coord { x: self.xmax, y: self.ymax },
        )
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.xmin, self.ymin),
                (self.xmax, self.ymin),
                (self.xmax, self.ymax),
                (self.xmin, self.ymax),
                (self.xmin, self.ymin),
            ]),
            vec![],
        )
    }

    /// Rectangle as a WKT polygon, counter-clockwise from the lower-left corner.
    pub fn to_wkt(&self) -> String {
        format!(
            "POLYGON(({xmin} {ymin}, {xmax} {ymin}, {xmax} {ymax}, {xmin} {ymax}, {xmin} {ymin}))",
            xmin = self.xmin,
            ymin = self.ymin,
            xmax = self.xmax,
            ymax = self.ymax,
        )
    }
}

impl From<Rect<f64>> for BBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// One cached facility: a point plus the promoted OSM attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub source_id: String,
    pub name: String,
    /// OSM element type: node, way or relation.
    pub source_type: String,
    /// Every source tag, including the ones promoted to fields.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub x: f64,
    pub y: f64,
}

impl FeatureRecord {
    /// Identity that survives across bands: ids are only unique per element type.
    pub fn key(&self) -> String {
        format!("{}/{}", self.source_type, self.source_id)
    }

    pub fn location(&self) -> Coord<f64> {
        Coord { x: self.x, y: self.y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestFeature {
    pub record: FeatureRecord,
    pub distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_from_coords() {
        let bbox = BBox::from_coords(vec![
            Coord { x: 2.0, y: -1.0 },
            Coord { x: -3.0, y: 4.0 },
            Coord { x: 0.5, y: 0.5 },
        ])
        .unwrap();
        assert_eq!(bbox, BBox::new(-3.0, -1.0, 2.0, 4.0));
        assert!(BBox::from_coords(Vec::new()).is_none());
    }

    #[test]
    fn test_bbox_contains_is_boundary_inclusive() {
        let bbox = BBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(bbox.contains(Coord { x: 1.0, y: 0.5 }));
        assert!(bbox.contains(Coord { x: 0.0, y: 0.0 }));
        assert!(!bbox.contains(Coord { x: 1.0001, y: 0.5 }));
    }

    #[test]
    fn test_bbox_to_wkt() {
        let bbox = BBox::new(0.0, 0.0, 1.5, 2.0);
        assert_eq!(bbox.to_wkt(), "POLYGON((0 0, 1.5 0, 1.5 2, 0 2, 0 0))");
    }

    #[test]
    fn test_feature_key_includes_element_type() {
        let node = FeatureRecord {
            source_id: "42".into(),
            name: "A".into(),
            source_type: "node".into(),
            tags: BTreeMap::new(),
            x: 0.0,
            y: 0.0,
        };
        let way = FeatureRecord {
            source_type: "way".into(),
            ..node.clone()
        };
        assert_ne!(node.key(), way.key());
        assert_eq!(node.key(), "node/42");
    }
}

//! Coordinate reference handling and polygon checks.
//!
//! Cached features are stored in the study layer's CRS, isochrones arrive in
//! WGS84; `CrsTransform` bridges the two. Only the two systems web-mapping
//! inputs realistically arrive in are supported.

pub mod crs;

use geo::{Area, Coord, LineString, Polygon};
use geojson::Value;

pub use crs::{Crs, CrsTransform};

/// Minimal validity check for polygons coming back from the isochrone service.
///
/// Rejects rings that are unclosed, too short, non-finite or collapsed to zero
/// area. Interior rings are checked the same way.
pub fn is_valid_polygon(polygon: &Polygon<f64>) -> bool {
    let ring_ok = |ring: &geo::LineString<f64>| {
        ring.0.len() >= 4
            && ring.is_closed()
            && ring.0.iter().all(|c| c.x.is_finite() && c.y.is_finite())
    };

    ring_ok(polygon.exterior())
        && polygon.interiors().iter().all(ring_ok)
        && polygon.unsigned_area() > 0.0
}

/// Polygon from a GeoJSON geometry value.
///
/// A multipolygon yields its largest member. Other geometry types give `None`.
pub fn polygon_from_geojson(value: &Value) -> Option<Polygon<f64>> {
    match value {
        Value::Polygon(rings) => {
            let (exterior, interiors) = rings.split_first()?;
            Some(Polygon::new(
                ring_from_positions(exterior),
                interiors.iter().map(|ring| ring_from_positions(ring)).collect(),
            ))
        }
        Value::MultiPolygon(parts) => parts
            .iter()
            .filter_map(|rings| polygon_from_geojson(&Value::Polygon(rings.clone())))
            .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area())),
        _ => None,
    }
}

fn ring_from_positions(positions: &[Vec<f64>]) -> LineString<f64> {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect()
}

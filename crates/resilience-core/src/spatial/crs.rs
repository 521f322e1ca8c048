use std::fmt;
use std::str::FromStr;

use geo::{Coord, MapCoords, Polygon};

use crate::error::ConfigError;
use crate::models::BBox;

/// Semi-major axis of the WGS84 ellipsoid, used as the Web Mercator sphere radius.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude limit of the square Web Mercator world.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// EPSG:4326, longitude/latitude in degrees.
    Wgs84,
    /// EPSG:3857, spherical Web Mercator in metres.
    WebMercator,
}

impl Crs {
    pub fn authid(&self) -> &'static str {
        match self {
            Crs::Wgs84 => "EPSG:4326",
            Crs::WebMercator => "EPSG:3857",
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.authid())
    }
}

impl FromStr for Crs {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EPSG:4326" | "WGS84" | "OGC:CRS84" => Ok(Crs::Wgs84),
            "EPSG:3857" | "EPSG:900913" | "EPSG:3785" => Ok(Crs::WebMercator),
            _ => Err(ConfigError::UnsupportedCrs(s.to_string())),
        }
    }
}

/// Point-wise transform between two supported CRSs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrsTransform {
    source: Crs,
    target: Crs,
}

impl CrsTransform {
    pub fn new(source: Crs, target: Crs) -> Self {
        Self { source, target }
    }

    pub fn is_identity(&self) -> bool {
        self.source == self.target
    }

    pub fn transform(&self, c: Coord<f64>) -> Coord<f64> {
        match (self.source, self.target) {
            (Crs::Wgs84, Crs::WebMercator) => lonlat_to_mercator(c),
            (Crs::WebMercator, Crs::Wgs84) => mercator_to_lonlat(c),
            _ => c,
        }
    }

    pub fn transform_polygon(&self, polygon: &Polygon<f64>) -> Polygon<f64> {
        if self.is_identity() {
            return polygon.clone();
        }
        polygon.map_coords(|c| self.transform(c))
    }

    /// Transform both corners. Exact for these CRSs, both being axis-aligned.
    pub fn transform_bbox(&self, bbox: &BBox) -> BBox {
        let min = self.transform(Coord { x: bbox.xmin, y: bbox.ymin });
        let max = self.transform(Coord { x: bbox.xmax, y: bbox.ymax });
        BBox::new(min.x, min.y, max.x, max.y)
    }
}

fn lonlat_to_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    Coord {
        x: EARTH_RADIUS_M * c.x.to_radians(),
        y: EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

fn mercator_to_lonlat(c: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (c.x / EARTH_RADIUS_M).to_degrees(),
        y: (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees(),
    }
}

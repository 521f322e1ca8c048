//! Travel-time polygons and the service seam that produces them.

use std::future::Future;

use geo::{Coord, Polygon, SimplifyVwPreserve};

use crate::api::ApiError;
use crate::config::TravelProfile;

/// Area reachable from an origin within `minutes`, in WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct Isochrone {
    pub minutes: u32,
    pub polygon: Polygon<f64>,
}

impl Isochrone {
    /// Topology-preserving simplification.
    ///
    /// `tolerance` is a linear distance in polygon units; Visvalingam-Whyatt
    /// works on triangle areas, so it is squared. Zero or negative leaves the
    /// polygon as is.
    pub fn simplified(&self, tolerance: f64) -> Self {
        if tolerance <= 0.0 {
            return self.clone();
        }
        let epsilon = tolerance * tolerance;
        Self {
            minutes: self.minutes,
            polygon: self.polygon.simplify_vw_preserve(&epsilon),
        }
    }
}

/// Source of isochrones around one origin.
pub trait IsochroneProvider {
    /// One polygon per interval, ordered by ascending minutes.
    fn fetch(
        &self,
        origin: Coord<f64>,
        profile: TravelProfile,
        intervals: &[u32],
    ) -> impl Future<Output = Result<Vec<Isochrone>, ApiError>> + Send;
}

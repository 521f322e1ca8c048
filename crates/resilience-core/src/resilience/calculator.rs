use std::collections::{BTreeMap, BTreeSet, HashMap};

use futures::stream::{self, StreamExt};
use geo::Coord;
use tracing::{debug, warn};

use super::isochrone::{Isochrone, IsochroneProvider};
use super::scoring::{aggregate, remove_band_overlap, BandSet, BandWeights, FailurePolicy};
use crate::cache::FeatureStore;
use crate::config::{CategoryConfig, CategoryTable, Config};
use crate::error::StoreError;
use crate::models::ResilienceRecord;
use crate::query::LocalQueryEngine;
use crate::spatial::{Crs, CrsTransform};

#[derive(Debug, Clone, PartialEq)]
pub struct CalculatorOptions {
    /// Linear tolerance in degrees applied to isochrones before querying.
    pub simplify_tolerance: f64,
    /// Isochrone requests in flight for one point.
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub weights: BandWeights,
    /// CRS the cached features are stored in.
    pub store_crs: Crs,
}

impl Default for CalculatorOptions {
    fn default() -> Self {
        let config = Config::default();
        Self::from_config(&config, Crs::Wgs84)
    }
}

impl CalculatorOptions {
    pub fn from_config(config: &Config, store_crs: Crs) -> Self {
        Self {
            simplify_tolerance: config.simplify_tolerance,
            concurrency: config.isochrone_concurrency.max(1),
            failure_policy: config.failure_policy,
            weights: BandWeights::default(),
            store_crs,
        }
    }
}

pub struct ResilienceCalculator<P> {
    provider: P,
    categories: CategoryTable,
    options: CalculatorOptions,
}

impl<P: IsochroneProvider> ResilienceCalculator<P> {
    pub fn new(provider: P, categories: CategoryTable, options: CalculatorOptions) -> Self {
        Self {
            provider,
            categories,
            options,
        }
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    pub fn options(&self) -> &CalculatorOptions {
        &self.options
    }

    /// Score one point given in WGS84.
    ///
    /// Isochrones for all categories are fetched concurrently first; the
    /// local queries and scoring then run one category at a time. Failures
    /// never escape: they become `None` scores under the failure policy.
    /// A category with no table in the store was never downloaded and also
    /// scores `None`, without an isochrone request.
    pub async fn calculate<S: FeatureStore>(
        &self,
        origin: Coord<f64>,
        engine: &mut LocalQueryEngine<S>,
    ) -> ResilienceRecord {
        let mut unavailable = BTreeSet::new();
        for key in self.categories.keys() {
            match engine.has_table(key) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(category = key, "No cached table for category");
                    unavailable.insert(key);
                }
                Err(e) => {
                    warn!(category = key, error = %e, "Could not check cached table");
                    unavailable.insert(key);
                }
            }
        }

        let mut fetched: HashMap<&str, _> = stream::iter(
            self.categories
                .iter()
                .filter(|(key, _)| !unavailable.contains(key)),
        )
            .map(|(key, category)| async move {
                let result = self
                    .provider
                    .fetch(origin, category.profile, &category.intervals)
                    .await;
                (key, result)
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut scores = BTreeMap::new();
        for (key, category) in self.categories.iter() {
            let score = match fetched.remove(key) {
                Some(Ok(isochrones)) => match self.score_category(key, category, isochrones, engine) {
                    Ok(score) => Some(score),
                    Err(e) => {
                        warn!(category = key, error = %e, "Local query failed");
                        None
                    }
                },
                Some(Err(e)) => {
                    warn!(category = key, x = origin.x, y = origin.y, error = %e, "Isochrone fetch failed");
                    None
                }
                None => None,
            };
            debug!(category = key, score = ?score, "Scored category");
            scores.insert(key.to_string(), score);
        }

        aggregate(scores, self.options.failure_policy)
    }

    fn score_category<S: FeatureStore>(
        &self,
        key: &str,
        category: &CategoryConfig,
        mut isochrones: Vec<Isochrone>,
        engine: &mut LocalQueryEngine<S>,
    ) -> Result<f64, StoreError> {
        isochrones.sort_by_key(|iso| iso.minutes);
        let transform = CrsTransform::new(Crs::Wgs84, self.options.store_crs);

        let mut bands: Vec<BandSet> = Vec::with_capacity(isochrones.len());
        for isochrone in &isochrones {
            let simplified = isochrone.simplified(self.options.simplify_tolerance);
            let polygon = transform.transform_polygon(&simplified.polygon);

            let mut keys = BandSet::new();
            engine.for_each_within(key, &polygon, |record| {
                if category.predicates.iter().any(|p| p.matches(&record.tags)) {
                    keys.insert(record.key());
                }
            })?;
            bands.push(keys);
        }

        remove_band_overlap(&mut bands);
        Ok(self.options.weights.score(&bands))
    }
}

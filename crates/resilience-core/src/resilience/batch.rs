//! Sequential scoring of a point dataset with cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};

use geo::Coord;
use tracing::{debug, info, warn};

use super::calculator::ResilienceCalculator;
use super::isochrone::IsochroneProvider;
use crate::cache::FeatureStore;
use crate::models::{BatchSummary, ResilienceRecord};
use crate::query::LocalQueryEngine;

/// Points between progress log lines.
const PROGRESS_EVERY: usize = 25;

/// One input feature. `location` is WGS84 and `None` when the feature has
/// no usable point geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct PointInput {
    pub id: String,
    pub location: Option<Coord<f64>>,
}

/// Score `points` one after another, handing each record to `sink` as soon
/// as it is computed.
///
/// `cancel` is checked before every point; records already handed to
/// `sink` stay valid. Points are never scored concurrently.
pub async fn run_batch<P, S, F>(
    points: &[PointInput],
    calculator: &ResilienceCalculator<P>,
    engine: &mut LocalQueryEngine<S>,
    cancel: &AtomicBool,
    mut sink: F,
) -> BatchSummary
where
    P: IsochroneProvider,
    S: FeatureStore,
    F: FnMut(&PointInput, &ResilienceRecord),
{
    let mut summary = BatchSummary::default();
    let total = points.len();
    info!(points = total, categories = calculator.categories().len(), "Scoring points");

    for (index, point) in points.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            info!(processed = index, total, "Batch cancelled");
            summary.cancelled = true;
            break;
        }

        let Some(origin) = point.location else {
            warn!(id = %point.id, "Skipping feature without point geometry");
            summary.skipped += 1;
            continue;
        };

        let record = calculator.calculate(origin, engine).await;
        let outcome = record.outcome();
        debug!(id = %point.id, total = ?record.total, outcome = ?outcome, "Scored point");
        summary.record(outcome);
        sink(point, &record);

        if (index + 1) % PROGRESS_EVERY == 0 {
            info!(done = index + 1, total, failed = summary.failed, "Scoring progress");
        }
        tokio::task::yield_now().await;
    }

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        no_data = summary.no_data,
        partial = summary.partial,
        skipped = summary.skipped,
        cancelled = summary.cancelled,
        "Batch finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::cache::MemoryStore;
    use crate::config::{CategoryConfig, CategoryTable, TravelProfile};
    use crate::models::FeatureRecord;
    use crate::resilience::{CalculatorOptions, Isochrone};
    use geo::polygon;
    use std::collections::BTreeMap;

    /// Unit square around every origin; origins with negative x fail.
    struct UnitSquares;

    impl IsochroneProvider for UnitSquares {
        async fn fetch(
            &self,
            origin: Coord<f64>,
            _profile: TravelProfile,
            _intervals: &[u32],
        ) -> Result<Vec<Isochrone>, ApiError> {
            if origin.x < 0.0 {
                return Err(ApiError::Timeout);
            }
            let (x, y) = (origin.x, origin.y);
            Ok(vec![Isochrone {
                minutes: 5,
                polygon: polygon![
                    (x: x - 0.5, y: y - 0.5),
                    (x: x + 0.5, y: y - 0.5),
                    (x: x + 0.5, y: y + 0.5),
                    (x: x - 0.5, y: y + 0.5),
                    (x: x - 0.5, y: y - 0.5),
                ],
            }])
        }
    }

    fn setup() -> (ResilienceCalculator<UnitSquares>, LocalQueryEngine<MemoryStore>) {
        let categories = CategoryTable::new(BTreeMap::from([(
            "schools".to_string(),
            CategoryConfig {
                table: "osm_schools".to_string(),
                predicates: vec![r#""amenity""#.parse().unwrap()],
                profile: TravelProfile::Walking,
                intervals: vec![5],
            },
        )]))
        .unwrap();
        let school = FeatureRecord {
            source_id: "1".to_string(),
            name: "School".to_string(),
            source_type: "node".to_string(),
            tags: BTreeMap::from([("amenity".to_string(), "school".to_string())]),
            x: 0.0,
            y: 0.0,
        };
        let store = MemoryStore::new().with_table("osm_schools", vec![school]);
        let engine = LocalQueryEngine::with_store(store, categories.clone());
        let options = CalculatorOptions {
            simplify_tolerance: 0.0,
            ..CalculatorOptions::default()
        };
        (ResilienceCalculator::new(UnitSquares, categories, options), engine)
    }

    fn point(id: &str, location: Option<(f64, f64)>) -> PointInput {
        PointInput {
            id: id.to_string(),
            location: location.map(|(x, y)| Coord { x, y }),
        }
    }

    #[tokio::test]
    async fn test_summary_counts_every_outcome() {
        let (calculator, mut engine) = setup();
        let points = vec![
            point("hit", Some((0.1, 0.1))),
            point("empty", Some((10.0, 10.0))),
            point("failed", Some((-5.0, 0.0))),
            point("no-geometry", None),
        ];
        let mut written = Vec::new();

        let summary = run_batch(&points, &calculator, &mut engine, &AtomicBool::new(false), |p, r| {
            written.push((p.id.clone(), r.total));
        })
        .await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.no_data, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.cancelled);
        assert_eq!(
            written,
            vec![
                ("hit".to_string(), Some(1.0)),
                ("empty".to_string(), Some(0.0)),
                ("failed".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_point() {
        let (calculator, mut engine) = setup();
        let points = vec![point("a", Some((0.0, 0.0))), point("b", Some((0.0, 0.0)))];
        let cancel = AtomicBool::new(false);
        let mut written = Vec::new();

        let summary = run_batch(&points, &calculator, &mut engine, &cancel, |p, _| {
            written.push(p.id.clone());
            cancel.store(true, Ordering::Relaxed);
        })
        .await;

        assert!(summary.cancelled);
        assert_eq!(written, vec!["a".to_string()]);
        assert_eq!(summary.processed(), 1);
    }
}

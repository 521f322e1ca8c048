use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::Path;

use geo::{BoundingRect, Intersects, Point, Polygon};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use tracing::{debug, warn};

use crate::cache::{FeatureStore, SqliteStore};
use crate::config::CategoryTable;
use crate::error::StoreError;
use crate::models::{BBox, FeatureRecord, NearestFeature};
use crate::spatial::is_valid_polygon;

/// Search radius for [`LocalQueryEngine::nearest`] when none is given, in
/// store CRS units.
pub const DEFAULT_NEAREST_DISTANCE: f64 = 50_000.0;

type IndexEntry = GeomWithData<[f64; 2], usize>;

/// One category's rows plus a lazily built point index over them.
struct Layer {
    records: Vec<FeatureRecord>,
    index: OnceCell<RTree<IndexEntry>>,
}

impl Layer {
    fn new(records: Vec<FeatureRecord>) -> Self {
        Self {
            records,
            index: OnceCell::new(),
        }
    }

    fn index(&self) -> &RTree<IndexEntry> {
        self.index.get_or_init(|| {
            let entries = self
                .records
                .iter()
                .enumerate()
                .map(|(i, record)| GeomWithData::new([record.x, record.y], i))
                .collect();
            RTree::bulk_load(entries)
        })
    }

    /// Row indices inside `envelope`, in table order.
    fn candidates(&self, envelope: &AABB<[f64; 2]>) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .index()
            .locate_in_envelope_intersecting(envelope)
            .map(|entry| entry.data)
            .collect();
        hits.sort_unstable();
        hits
    }
}

/// Read-only spatial queries over the feature store.
///
/// Tables are loaded on first use and kept, with their index, until
/// [`clear_cache`](Self::clear_cache). Unknown categories and missing tables
/// behave as empty layers; [`has_table`](Self::has_table) tells a missing
/// table apart from an empty one.
pub struct LocalQueryEngine<S = SqliteStore> {
    store: S,
    categories: CategoryTable,
    layers: HashMap<String, Layer>,
    tables: HashMap<String, bool>,
}

impl LocalQueryEngine<SqliteStore> {
    pub fn open(path: &Path, categories: CategoryTable) -> Result<Self, StoreError> {
        Ok(Self::with_store(SqliteStore::open_read_only(path)?, categories))
    }
}

impl<S: FeatureStore> LocalQueryEngine<S> {
    pub fn with_store(store: S, categories: CategoryTable) -> Self {
        Self {
            store,
            categories,
            layers: HashMap::new(),
            tables: HashMap::new(),
        }
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    /// Whether `category` was downloaded into the store. A table with no
    /// rows counts; a category whose download failed has none.
    pub fn has_table(&mut self, category: &str) -> Result<bool, StoreError> {
        if let Some(&present) = self.tables.get(category) {
            return Ok(present);
        }
        let present = match self.categories.table_for(category) {
            Some(table) => self.store.table_exists(table)?,
            None => false,
        };
        self.tables.insert(category.to_string(), present);
        Ok(present)
    }

    fn layer(&mut self, category: &str) -> Result<Option<&Layer>, StoreError> {
        if !self.layers.contains_key(category) {
            let Some(table) = self.categories.table_for(category) else {
                warn!(category, "Unknown category, treating as empty");
                return Ok(None);
            };
            let records = match self.store.load_table(table)? {
                Some(records) => records,
                None => {
                    debug!(category, table, "No cached table for category");
                    Vec::new()
                }
            };
            debug!(category, features = records.len(), "Loaded category layer");
            self.layers.insert(category.to_string(), Layer::new(records));
        }
        Ok(self.layers.get(category))
    }

    /// Call `visit` for every feature of `category` intersecting `polygon`
    /// (boundary included), in table order.
    ///
    /// Degenerate polygons match nothing.
    pub fn for_each_within<F>(
        &mut self,
        category: &str,
        polygon: &Polygon<f64>,
        mut visit: F,
    ) -> Result<(), StoreError>
    where
        F: FnMut(&FeatureRecord),
    {
        if !is_valid_polygon(polygon) {
            warn!(category, "Invalid query polygon, returning no features");
            return Ok(());
        }
        let Some(rect) = polygon.bounding_rect() else {
            return Ok(());
        };
        let Some(layer) = self.layer(category)? else {
            return Ok(());
        };

        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        for i in layer.candidates(&envelope) {
            let record = &layer.records[i];
            if polygon.intersects(&Point::from(record.location())) {
                visit(record);
            }
        }
        Ok(())
    }

    pub fn features_within(
        &mut self,
        category: &str,
        polygon: &Polygon<f64>,
    ) -> Result<Vec<FeatureRecord>, StoreError> {
        let mut found = Vec::new();
        self.for_each_within(category, polygon, |record| found.push(record.clone()))?;
        Ok(found)
    }

    pub fn count_within(&mut self, category: &str, polygon: &Polygon<f64>) -> Result<usize, StoreError> {
        let mut count = 0;
        self.for_each_within(category, polygon, |_| count += 1)?;
        Ok(count)
    }

    pub fn named_features_within(
        &mut self,
        category: &str,
        polygon: &Polygon<f64>,
    ) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        self.for_each_within(category, polygon, |record| names.push(record.name.clone()))?;
        Ok(names)
    }

    /// Closest feature within `max_distance` (default
    /// [`DEFAULT_NEAREST_DISTANCE`]) of `(x, y)`.
    pub fn nearest(
        &mut self,
        category: &str,
        x: f64,
        y: f64,
        max_distance: Option<f64>,
    ) -> Result<Option<NearestFeature>, StoreError> {
        let max_distance = max_distance.unwrap_or(DEFAULT_NEAREST_DISTANCE);
        let Some(layer) = self.layer(category)? else {
            return Ok(None);
        };

        let envelope = AABB::from_corners(
            [x - max_distance, y - max_distance],
            [x + max_distance, y + max_distance],
        );
        let best = layer
            .candidates(&envelope)
            .into_iter()
            .map(|i| {
                let record = &layer.records[i];
                (i, (record.x - x).hypot(record.y - y))
            })
            .filter(|(_, distance)| *distance <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        Ok(best.map(|(i, distance)| NearestFeature {
            record: layer.records[i].clone(),
            distance,
        }))
    }

    /// Features inside `bbox` (edges included). Linear scan, no index.
    pub fn features_within_bbox(
        &mut self,
        category: &str,
        bbox: &BBox,
    ) -> Result<Vec<FeatureRecord>, StoreError> {
        let Some(layer) = self.layer(category)? else {
            return Ok(Vec::new());
        };
        Ok(layer
            .records
            .iter()
            .filter(|record| bbox.contains(record.location()))
            .cloned()
            .collect())
    }

    pub fn feature_count(&mut self, category: &str) -> Result<usize, StoreError> {
        Ok(self.layer(category)?.map_or(0, |layer| layer.records.len()))
    }

    /// Drop loaded tables and indexes.
    pub fn clear_cache(&mut self) {
        self.layers.clear();
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::config::{CategoryConfig, TravelProfile};
    use geo::polygon;
    use std::collections::BTreeMap;

    fn record(id: &str, name: &str, x: f64, y: f64) -> FeatureRecord {
        FeatureRecord {
            source_id: id.to_string(),
            name: name.to_string(),
            source_type: "node".to_string(),
            tags: BTreeMap::from([("amenity".to_string(), "school".to_string())]),
            x,
            y,
        }
    }

    fn engine(rows: Vec<FeatureRecord>) -> LocalQueryEngine<MemoryStore> {
        let categories = CategoryTable::new(BTreeMap::from([(
            "schools".to_string(),
            CategoryConfig {
                table: "osm_schools".to_string(),
                predicates: vec![r#""amenity"="school""#.parse().unwrap()],
                profile: TravelProfile::Walking,
                intervals: vec![5, 15, 30],
            },
        )]))
        .unwrap();
        LocalQueryEngine::with_store(MemoryStore::new().with_table("osm_schools", rows), categories)
    }

    fn unit_square() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)]
    }

    #[test]
    fn test_within_filters_exactly() {
        let triangle = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)];
        // (0.8, 0.8) is inside the triangle's bbox but outside the triangle
        let mut engine = engine(vec![
            record("1", "Inside", 0.2, 0.2),
            record("2", "Corner", 0.8, 0.8),
            record("3", "Far", 5.0, 5.0),
        ]);

        let names = engine.named_features_within("schools", &triangle).unwrap();
        assert_eq!(names, vec!["Inside".to_string()]);
        assert_eq!(engine.count_within("schools", &triangle).unwrap(), 1);
    }

    #[test]
    fn test_boundary_point_is_within() {
        let mut engine = engine(vec![record("1", "Edge", 1.0, 0.5), record("2", "Vertex", 0.0, 0.0)]);
        assert_eq!(engine.count_within("schools", &unit_square()).unwrap(), 2);
    }

    #[test]
    fn test_invalid_polygon_matches_nothing() {
        let mut engine = engine(vec![record("1", "A", 0.0, 0.0)]);
        let collapsed = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 2.0, y: 0.0), (x: 0.0, y: 0.0)];
        assert!(engine.features_within("schools", &collapsed).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_category_is_empty() {
        let mut engine = engine(vec![record("1", "A", 0.5, 0.5)]);
        assert_eq!(engine.count_within("zoos", &unit_square()).unwrap(), 0);
        assert!(engine.nearest("zoos", 0.0, 0.0, None).unwrap().is_none());
        assert_eq!(engine.feature_count("zoos").unwrap(), 0);
    }

    #[test]
    fn test_missing_table_is_empty() {
        let categories = engine(vec![]).categories().clone();
        let mut engine = LocalQueryEngine::with_store(MemoryStore::new(), categories);
        assert_eq!(engine.count_within("schools", &unit_square()).unwrap(), 0);
        assert!(!engine.has_table("schools").unwrap());
    }

    #[test]
    fn test_has_table_distinguishes_empty_from_missing() {
        let mut empty = engine(vec![]);
        assert!(empty.has_table("schools").unwrap());
        assert!(!empty.has_table("zoos").unwrap());
    }

    #[test]
    fn test_nearest_respects_radius() {
        let mut engine = engine(vec![
            record("1", "Near", 3.0, 4.0),
            record("2", "Nearer", 1.0, 1.0),
            record("3", "Outside", 100.0, 0.0),
        ]);

        let found = engine.nearest("schools", 0.0, 0.0, Some(10.0)).unwrap().unwrap();
        assert_eq!(found.record.name, "Nearer");
        assert!((found.distance - 2f64.sqrt()).abs() < 1e-12);

        // A corner of the search square is outside the radius
        assert!(engine.nearest("schools", 0.0, 0.0, Some(1.2)).unwrap().is_none());
    }

    #[test]
    fn test_bbox_filter_and_counts() {
        let mut engine = engine(vec![record("1", "A", 0.5, 0.5), record("2", "B", 2.0, 2.0)]);
        let inside = engine
            .features_within_bbox("schools", &BBox::new(0.0, 0.0, 1.0, 1.0))
            .unwrap();
        assert_eq!(inside.len(), 1);
        assert_eq!(engine.feature_count("schools").unwrap(), 2);

        engine.clear_cache();
        assert!(engine.layers.is_empty());
        assert_eq!(engine.feature_count("schools").unwrap(), 2);
    }
}

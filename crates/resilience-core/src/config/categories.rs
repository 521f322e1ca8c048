//! Facility categories: which OSM tags define them, how they are stored,
//! and which travel profile and time bands score them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::store::is_valid_table_name;
use crate::error::ConfigError;
use crate::osm::TagPredicate;

/// Travel mode passed to the isochrone service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TravelProfile {
    Walking,
    Cycling,
    Driving,
    DrivingTraffic,
}

impl TravelProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelProfile::Walking => "walking",
            TravelProfile::Cycling => "cycling",
            TravelProfile::Driving => "driving",
            TravelProfile::DrivingTraffic => "driving-traffic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Table holding this category's features in the cache store.
    pub table: String,
    pub predicates: Vec<TagPredicate>,
    pub profile: TravelProfile,
    /// Band limits in minutes, ascending.
    pub intervals: Vec<u32>,
}

/// The full set of categories for one analysis, keyed by category name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryTable {
    categories: BTreeMap<String, CategoryConfig>,
}

fn category(
    table: &str,
    predicates: &[&str],
    profile: TravelProfile,
    intervals: [u32; 3],
) -> CategoryConfig {
    CategoryConfig {
        table: table.to_string(),
        predicates: predicates
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect(),
        profile,
        intervals: intervals.to_vec(),
    }
}

impl CategoryTable {
    pub fn new(categories: BTreeMap<String, CategoryConfig>) -> Result<Self, ConfigError> {
        let table = Self { categories };
        table.validate()?;
        Ok(table)
    }

    /// The nine facility categories scored by default.
    pub fn builtin() -> Self {
        use TravelProfile::{Driving, Walking};

        let entries = [
            ("schools", category("osm_schools", &[r#""amenity"="school""#], Walking, [5, 15, 30])),
            (
                "kindergarden",
                category(
                    "osm_kindergarden",
                    &[r#""amenity"="kindergarten""#, r#""amenity"="childcare""#],
                    Walking,
                    [5, 15, 30],
                ),
            ),
            (
                "transportation",
                category(
                    "osm_transportation",
                    &[r#""highway"="bus_stop""#, r#""railway"="station""#],
                    Walking,
                    [5, 15, 30],
                ),
            ),
            ("airports", category("osm_airports", &[r#""aeroway"="terminal""#], Driving, [30, 60, 90])),
            (
                "leisure_and_parks",
                category(
                    "osm_leisure_parks",
                    &[
                        r#""leisure"~".""#,
                        r#""landuse"~"park|forest|meadow|grass|recreation_ground|village_green""#,
                        r#""natural"~"wood|grassland""#,
                        r#""boundary"="protected_area""#,
                    ],
                    Walking,
                    [5, 15, 30],
                ),
            ),
            ("shops", category("osm_shops", &[r#""shop"~".""#], Walking, [5, 15, 30])),
            (
                "higher_education",
                category("osm_higher_education", &[r#""amenity"="university""#], Walking, [5, 15, 30]),
            ),
            (
                "further_education",
                category("osm_further_education", &[r#""amenity"="college""#], Walking, [5, 15, 30]),
            ),
            ("hospitals", category("osm_hospitals", &[r#""healthcare"="hospital""#], Driving, [15, 30, 60])),
        ];

        Self {
            categories: entries
                .into_iter()
                .map(|(key, config)| (key.to_string(), config))
                .collect(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let table: Self = serde_json::from_str(&contents)?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: &str| ConfigError::InvalidCategory {
            category: key.to_string(),
            reason: reason.to_string(),
        };

        for (key, config) in &self.categories {
            if !is_valid_table_name(&config.table) {
                return Err(invalid(key, "table name must be [A-Za-z0-9_]+"));
            }
            if config.predicates.is_empty() {
                return Err(invalid(key, "at least one tag predicate is required"));
            }
            if config.intervals.is_empty() {
                return Err(invalid(key, "at least one time interval is required"));
            }
            if !config.intervals.windows(2).all(|pair| pair[0] < pair[1]) {
                return Err(invalid(key, "time intervals must be strictly ascending"));
            }
        }
        Ok(())
    }

    /// Restrict the table to the named categories.
    pub fn subset<S: AsRef<str>>(&self, keys: &[S]) -> Result<Self, ConfigError> {
        let mut categories = BTreeMap::new();
        for key in keys {
            let key = key.as_ref();
            let config = self
                .get(key)
                .ok_or_else(|| ConfigError::UnknownCategory(key.to_string()))?;
            categories.insert(key.to_string(), config.clone());
        }
        Ok(Self { categories })
    }

    pub fn get(&self, key: &str) -> Option<&CategoryConfig> {
        self.categories.get(key)
    }

    pub fn table_for(&self, key: &str) -> Option<&str> {
        self.get(key).map(|c| c.table.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryConfig)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        let table = CategoryTable::builtin();
        assert_eq!(table.len(), 9);
        table.validate().unwrap();

        let parks = table.get("leisure_and_parks").unwrap();
        assert_eq!(parks.predicates.len(), 4);
        assert_eq!(table.table_for("hospitals"), Some("osm_hospitals"));
        assert_eq!(table.get("airports").unwrap().intervals, vec![30, 60, 90]);
    }

    #[test]
    fn test_subset_rejects_unknown_category() {
        let table = CategoryTable::builtin();
        let subset = table.subset(&["schools", "shops"]).unwrap();
        assert_eq!(subset.keys().collect::<Vec<_>>(), vec!["schools", "shops"]);

        assert!(matches!(
            table.subset(&["schools", "casinos"]),
            Err(ConfigError::UnknownCategory(ref k)) if k == "casinos"
        ));
    }

    #[test]
    fn test_from_file_validates_intervals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(
            &path,
            r#"{"schools": {"table": "osm_schools", "predicates": ["\"amenity\"=\"school\""],
                "profile": "walking", "intervals": [15, 5]}}"#,
        )
        .unwrap();

        assert!(matches!(
            CategoryTable::from_file(&path),
            Err(ConfigError::InvalidCategory { .. })
        ));
    }

    #[test]
    fn test_from_file_round_trips_predicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(
            &path,
            r#"{"cafes": {"table": "osm_cafes", "predicates": ["\"amenity\"~\"cafe|coffee\""],
                "profile": "cycling", "intervals": [5, 10]}}"#,
        )
        .unwrap();

        let table = CategoryTable::from_file(&path).unwrap();
        let cafes = table.get("cafes").unwrap();
        assert_eq!(cafes.profile, TravelProfile::Cycling);
        assert_eq!(cafes.predicates[0].to_string(), r#""amenity"~"cafe|coffee""#);
    }
}

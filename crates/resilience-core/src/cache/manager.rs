use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::BBox;

/// Bumped when the metadata or store layout changes incompatibly.
pub const CACHE_VERSION: &str = "1.0";

const CACHE_SUBDIR: &str = "cache";
const METADATA_FILE: &str = "metadata.json";
const STORE_FILE: &str = "osm_data.sqlite";

/// SQLite side files that belong to the store and go with it on clear.
const STORE_SIDE_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Study-area geometry in the CRS the cache is built for.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyArea {
    pub wkt: String,
    pub crs: String,
    pub bbox: Option<BBox>,
}

impl StudyArea {
    pub fn new(wkt: impl Into<String>, crs: impl Into<String>, bbox: Option<BBox>) -> Self {
        Self {
            wkt: wkt.into(),
            crs: crs.into(),
            bbox,
        }
    }

    /// Rectangular study area covering `bbox`.
    pub fn from_bbox(bbox: BBox, crs: impl Into<String>) -> Self {
        Self::new(bbox.to_wkt(), crs, Some(bbox))
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.wkt, &self.crs, self.bbox.as_ref())
    }
}

/// SHA-256 over the study area and CRS.
///
/// The bbox corners are preferred since they do not depend on how a WKT
/// writer formats numbers; without a bbox the WKT is used with its
/// whitespace collapsed to single spaces between tokens.
pub fn fingerprint(wkt: &str, crs: &str, bbox: Option<&BBox>) -> String {
    let combined = match bbox {
        Some(b) => format!(
            "{},{},{},{}|{}",
            normalize_zero(b.xmin),
            normalize_zero(b.ymin),
            normalize_zero(b.xmax),
            normalize_zero(b.ymax),
            crs
        ),
        None => {
            format!("{}|{}", normalize_wkt(wkt), crs)
        }
    };

    let mut hasher = Sha256::new();
    hasher.update(combined.as_bytes());
    hex::encode(hasher.finalize())
}

/// Separate punctuation from numbers, then collapse runs of whitespace,
/// so `1 23` and `12 3` stay distinct.
fn normalize_wkt(wkt: &str) -> String {
    let padded = wkt
        .replace('(', " ( ")
        .replace(')', " ) ")
        .replace(',', " , ");
    padded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `-0.0` and `0.0` describe the same coordinate but print differently.
fn normalize_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub version: String,
    pub created: DateTime<Utc>,
    pub geometry_wkt: String,
    pub crs: String,
    pub geometry_hash: String,
    pub bbox: Option<BBox>,
    /// Data timestamp reported by the feature service.
    pub osm_timestamp: Option<String>,
    pub categories: Vec<String>,
}

impl CacheMetadata {
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.created).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", (minutes + 30) / 60)
        } else {
            format!("{}d ago", (minutes + 720) / 1440)
        }
    }
}

/// Human-oriented cache summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    pub created: DateTime<Utc>,
    pub age: String,
    pub osm_timestamp: Option<String>,
    pub crs: String,
    pub categories: Vec<String>,
    pub cache_size_mb: f64,
    pub bbox: Option<BBox>,
}

pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    /// Open the cache under `base_dir`, creating the directory if needed.
    ///
    /// Failing to create it is fatal: nothing downstream can run without it.
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let cache_dir = base_dir.join(CACHE_SUBDIR);
        std::fs::create_dir_all(&cache_dir).with_context(|| {
            format!("Cannot create cache directory at {}", cache_dir.display())
        })?;
        Ok(Self { cache_dir })
    }

    /// Open the cache in the platform's per-user cache directory.
    pub fn open_default() -> Result<Self> {
        Self::new(Config::cache_dir()?)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.cache_dir.join(METADATA_FILE)
    }

    pub fn store_path(&self) -> PathBuf {
        self.cache_dir.join(STORE_FILE)
    }

    /// True iff stored metadata exists and its fingerprint matches `area` exactly.
    pub fn is_valid(&self, area: &StudyArea) -> bool {
        match self.load() {
            Some(metadata) => {
                let current = area.fingerprint();
                let valid = metadata.geometry_hash == current;
                debug!(valid, stored = %metadata.geometry_hash, current = %current, "Checked cache fingerprint");
                valid
            }
            None => false,
        }
    }

    /// Write fresh metadata for `area`, replacing any previous file.
    ///
    /// Goes through a temp file and a rename so a crash never leaves a
    /// half-written metadata file behind.
    pub fn save(
        &self,
        area: &StudyArea,
        osm_timestamp: Option<&str>,
        categories: &[String],
    ) -> Result<CacheMetadata> {
        let metadata = CacheMetadata {
            version: CACHE_VERSION.to_string(),
            created: Utc::now(),
            geometry_wkt: area.wkt.clone(),
            crs: area.crs.clone(),
            geometry_hash: area.fingerprint(),
            bbox: area.bbox,
            osm_timestamp: osm_timestamp.map(str::to_string),
            categories: categories.to_vec(),
        };

        let path = self.metadata_path();
        let tmp_path = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write cache metadata: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to replace cache metadata: {}", path.display()))?;

        info!(crs = %metadata.crs, categories = metadata.categories.len(), "Saved cache metadata");
        Ok(metadata)
    }

    /// Stored metadata, or `None` when missing or unreadable.
    ///
    /// An unreadable file is treated like a missing one: the caller
    /// re-downloads instead of failing the run.
    pub fn load(&self) -> Option<CacheMetadata> {
        let path = self.metadata_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache metadata");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse cache metadata, ignoring it");
                None
            }
        }
    }

    /// Delete the store and the metadata. Missing files are not an error.
    pub fn clear(&self) -> Result<()> {
        let store = self.store_path();
        let mut paths = vec![store.clone(), self.metadata_path()];
        paths.extend(STORE_SIDE_SUFFIXES.iter().map(|suffix| {
            let mut name = store.clone().into_os_string();
            name.push(suffix);
            PathBuf::from(name)
        }));

        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed cache file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", path.display()))
                }
            }
        }
        info!("Cleared OSM cache");
        Ok(())
    }

    pub fn cache_exists(&self) -> bool {
        self.metadata_path().exists() && self.store_path().exists()
    }

    pub fn cache_info(&self) -> Option<CacheInfo> {
        let metadata = self.load()?;
        let size_bytes = std::fs::metadata(self.store_path())
            .map(|m| m.len())
            .unwrap_or(0);

        Some(CacheInfo {
            created: metadata.created,
            age: metadata.age_display(),
            osm_timestamp: metadata.osm_timestamp,
            crs: metadata.crs,
            categories: metadata.categories,
            cache_size_mb: size_bytes as f64 / (1024.0 * 1024.0),
            bbox: metadata.bbox,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn unit_area() -> StudyArea {
        StudyArea::from_bbox(BBox::new(0.0, 0.0, 1.0, 1.0), "EPSG:4326")
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = unit_area().fingerprint();
        let b = unit_area().fingerprint();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_wkt_whitespace() {
        let tight = fingerprint("POLYGON((0 0,1 0,1 1,0 1,0 0))", "EPSG:4326", None);
        let loose = fingerprint("POLYGON (( 0 0, 1 0,\n 1 1, 0 1,  0 0 ))", "EPSG:4326", None);
        assert_eq!(tight, loose);
    }

    #[test]
    fn test_fingerprint_keeps_wkt_numbers_apart() {
        let a = fingerprint("POLYGON((1 23, 4 5, 6 7, 1 23))", "EPSG:4326", None);
        let b = fingerprint("POLYGON((12 3, 4 5, 6 7, 12 3))", "EPSG:4326", None);
        assert_ne!(a, b);
        assert_eq!(normalize_wkt("POLYGON ((1  23,4 5))"), "POLYGON ( ( 1 23 , 4 5 ) )");
    }

    #[test]
    fn test_fingerprint_prefers_bbox_over_wkt() {
        let bbox = BBox::new(0.0, 0.0, 1.0, 1.0);
        let a = fingerprint("POLYGON((0 0,1 0,1 1,0 1,0 0))", "EPSG:4326", Some(&bbox));
        let b = fingerprint("POLYGON((0.0 0.0,1.0 0.0,1.0 1.0,0.0 1.0,0.0 0.0))", "EPSG:4326", Some(&bbox));
        assert_eq!(a, b);

        let negative_zero = BBox::new(-0.0, 0.0, 1.0, 1.0);
        assert_eq!(a, fingerprint("", "EPSG:4326", Some(&negative_zero)));
    }

    #[test]
    fn test_fingerprint_depends_on_crs_and_bbox() {
        let bbox = BBox::new(0.0, 0.0, 1.0, 1.0);
        let base = fingerprint("", "EPSG:4326", Some(&bbox));
        assert_ne!(base, fingerprint("", "EPSG:3857", Some(&bbox)));
        assert_ne!(base, fingerprint("", "EPSG:4326", Some(&BBox::new(0.0, 0.0, 1.0, 1.0 + 1e-12))));
    }

    #[test]
    fn test_is_valid_requires_exact_match() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        let area = unit_area();

        assert!(!cache.is_valid(&area));
        cache.save(&area, Some("2024-01-01T00:00:00Z"), &["schools".to_string()]).unwrap();
        assert!(cache.is_valid(&area));

        // A shrunk study area is not served from a larger cache
        let shrunk = StudyArea::from_bbox(BBox::new(0.0, 0.0, 0.5, 0.5), "EPSG:4326");
        assert!(!cache.is_valid(&shrunk));

        let moved = StudyArea::from_bbox(BBox::new(0.0, 0.0, 1.0, 1.000001), "EPSG:4326");
        assert!(!cache.is_valid(&moved));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        let saved = cache
            .save(&unit_area(), Some("2024-05-01T12:00:00Z"), &["schools".into(), "parks".into()])
            .unwrap();

        let loaded = cache.load().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.version, CACHE_VERSION);
        assert_eq!(loaded.categories, vec!["schools", "parks"]);
        assert!(!cache.metadata_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_metadata_is_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(cache.metadata_path(), "{ not json").unwrap();

        assert!(cache.load().is_none());
        assert!(!cache.is_valid(&unit_area()));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        cache.save(&unit_area(), None, &[]).unwrap();
        std::fs::write(cache.store_path(), b"data").unwrap();
        assert!(cache.cache_exists());

        cache.clear().unwrap();
        assert!(!cache.cache_exists());
        assert!(cache.load().is_none());

        cache.clear().unwrap();
    }

    #[test]
    fn test_new_fails_when_directory_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        assert!(CacheManager::new(blocker).is_err());
    }

    #[test]
    fn test_cache_info() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        assert!(cache.cache_info().is_none());

        cache.save(&unit_area(), Some("ts"), &["schools".into()]).unwrap();
        let info = cache.cache_info().unwrap();
        assert_eq!(info.age, "just now");
        assert_eq!(info.osm_timestamp.as_deref(), Some("ts"));
        assert_eq!(info.cache_size_mb, 0.0);
    }

    #[test]
    fn test_age_display() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        let mut metadata = cache.save(&unit_area(), None, &[]).unwrap();

        metadata.created = Utc::now() - Duration::minutes(61);
        assert_eq!(metadata.age_display(), "1h ago");
        metadata.created = Utc::now() - Duration::minutes(95);
        assert_eq!(metadata.age_display(), "2h ago");
        metadata.created = Utc::now() - Duration::days(3);
        assert_eq!(metadata.age_display(), "3d ago");
        metadata.created = Utc::now() + Duration::minutes(5);
        assert_eq!(metadata.age_display(), "just now");
    }
}

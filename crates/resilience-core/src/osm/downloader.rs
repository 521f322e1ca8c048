//! Category-by-category download of OSM features into the feature store.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::normalize::normalize_element;
use crate::api::{build_query, retry, ApiError, ElementSource, OverpassClient, RetryPolicy};
use crate::cache::{CacheManager, CacheMetadata, FeatureStore, SqliteStore, StudyArea};
use crate::config::{CategoryConfig, CategoryTable, Config};
use crate::error::ConfigError;
use crate::models::{BBox, FeatureRecord};
use crate::spatial::{Crs, CrsTransform};

/// Default attempts per category.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Reported before each category request. `index` is zero-based.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub index: usize,
    pub total: usize,
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadReport {
    /// Features written per category; zero for failed categories.
    pub counts: BTreeMap<String, usize>,
    /// Categories whose download or write failed after all retries.
    pub failed: Vec<String>,
    /// Upstream data timestamp from the first successful response.
    pub source_timestamp: Option<String>,
    pub cancelled: bool,
}

impl DownloadReport {
    /// Categories whose tables were written.
    pub fn written(&self) -> Vec<String> {
        self.counts
            .keys()
            .filter(|key| !self.failed.contains(key))
            .cloned()
            .collect()
    }

    pub fn total_features(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Outcome of [`ensure_cache`].
#[derive(Debug, Clone)]
pub enum CacheStatus {
    /// The stored cache matched the study area and held every category.
    Reused(CacheMetadata),
    /// Categories were downloaded. `resumed` is set when an existing cache
    /// for the same area was completed rather than rebuilt; metadata is
    /// `None` when nothing was saved.
    Downloaded {
        report: DownloadReport,
        metadata: Option<CacheMetadata>,
        resumed: bool,
    },
}

pub struct Downloader<S> {
    source: S,
    categories: CategoryTable,
    policy: RetryPolicy<ApiError>,
    timeout_secs: u64,
}

impl Downloader<OverpassClient> {
    pub fn from_config(config: &Config, categories: CategoryTable) -> Result<Self> {
        let client = OverpassClient::from_config(config)?;
        Ok(Self::new(client, categories)
            .with_policy(RetryPolicy::bulk_download(config.max_attempts))
            .with_timeout_secs(config.overpass_timeout_secs))
    }
}

impl<S: ElementSource> Downloader<S> {
    pub fn new(source: S, categories: CategoryTable) -> Self {
        Self {
            source,
            categories,
            policy: RetryPolicy::bulk_download(DEFAULT_MAX_ATTEMPTS),
            timeout_secs: crate::config::DEFAULT_OVERPASS_TIMEOUT_SECS,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy<ApiError>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    /// Download `only` (or every configured category) inside `bbox_wgs84`,
    /// reproject to `target_crs` and replace each category's table in `store`.
    ///
    /// A category that still fails after all retries counts zero features and
    /// is listed in `failed`; the others carry on. `progress` runs before each
    /// category and stops the download by returning `Break`.
    pub async fn download_and_cache<F>(
        &self,
        bbox_wgs84: &BBox,
        store: &mut impl FeatureStore,
        target_crs: Crs,
        only: Option<&[String]>,
        delay: Duration,
        mut progress: F,
    ) -> Result<DownloadReport, ConfigError>
    where
        F: FnMut(DownloadProgress) -> ControlFlow<()>,
    {
        let selected = match only {
            Some(keys) => self.categories.subset(keys)?,
            None => self.categories.clone(),
        };
        let transform = CrsTransform::new(Crs::Wgs84, target_crs);
        let total = selected.len();
        let mut report = DownloadReport::default();

        info!(categories = total, target_crs = %target_crs, "Starting OSM download");

        for (index, (key, category)) in selected.iter().enumerate() {
            let step = DownloadProgress {
                index,
                total,
                category: key.to_string(),
            };
            if progress(step).is_break() {
                info!(completed = index, total, "Download cancelled");
                report.cancelled = true;
                break;
            }

            if index > 0 && !delay.is_zero() {
                debug!(delay_secs = delay.as_secs_f64(), "Pausing between category requests");
                tokio::time::sleep(delay).await;
            }

            match self.download_category(key, category, bbox_wgs84, &transform).await {
                Ok((records, timestamp)) => {
                    if let Err(e) = store.write_table(&category.table, &records) {
                        warn!(category = %key, table = %category.table, error = %e, "Failed to write category table");
                        report.counts.insert(key.to_string(), 0);
                        report.failed.push(key.to_string());
                        continue;
                    }
                    info!(category = %key, features = records.len(), "Cached category");
                    if report.source_timestamp.is_none() {
                        report.source_timestamp = timestamp;
                    }
                    report.counts.insert(key.to_string(), records.len());
                }
                Err(e) => {
                    warn!(category = %key, error = %e, "Giving up on category");
                    report.counts.insert(key.to_string(), 0);
                    report.failed.push(key.to_string());
                }
            }
        }

        info!(
            features = report.total_features(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "OSM download finished"
        );
        Ok(report)
    }

    async fn download_category(
        &self,
        key: &str,
        category: &CategoryConfig,
        bbox_wgs84: &BBox,
        transform: &CrsTransform,
    ) -> Result<(Vec<FeatureRecord>, Option<String>), ApiError> {
        let query = build_query(bbox_wgs84, &category.predicates, self.timeout_secs);
        let response = retry(&self.policy, |attempt| {
            debug!(category = %key, attempt = attempt + 1, "Requesting category");
            self.source.fetch(&query)
        })
        .await?;

        let raw_count = response.elements.len();
        let records: Vec<FeatureRecord> = response
            .elements
            .iter()
            .filter_map(normalize_element)
            .map(|mut record| {
                let projected = transform.transform(record.location());
                record.x = projected.x;
                record.y = projected.y;
                record
            })
            .collect();

        if records.len() < raw_count {
            debug!(category = %key, dropped = raw_count - records.len(), "Dropped elements without a location");
        }
        Ok((records, response.timestamp().map(str::to_string)))
    }
}

/// Make sure the cache matches `area` and holds every configured category.
///
/// `area.crs` is the CRS features are stored in. An unsupported CRS is
/// rejected before any request is made. A cache for a different area (or
/// `force`) is cleared and rebuilt. A cache for the same area that lacks
/// some categories, after a cancelled or partly failed download, keeps its
/// tables and only the missing categories are fetched. Metadata lists the
/// categories actually stored and is saved whenever at least one is.
pub async fn ensure_cache<S, F>(
    downloader: &Downloader<S>,
    cache: &CacheManager,
    area: &StudyArea,
    bbox_wgs84: &BBox,
    delay: Duration,
    force: bool,
    progress: F,
) -> Result<CacheStatus>
where
    S: ElementSource,
    F: FnMut(DownloadProgress) -> ControlFlow<()>,
{
    let target_crs: Crs = area.crs.parse()?;

    let existing = if !force && cache.is_valid(area) {
        cache.load()
    } else {
        None
    };

    let (stored, missing) = match &existing {
        Some(metadata) => {
            let missing: Vec<String> = downloader
                .categories()
                .keys()
                .filter(|key| !metadata.categories.iter().any(|c| c == key))
                .map(str::to_string)
                .collect();
            if missing.is_empty() {
                info!(age = %metadata.age_display(), "Using cached OSM data");
                return Ok(CacheStatus::Reused(metadata.clone()));
            }
            info!(missing = ?missing, "Resuming cache for the missing categories");
            (metadata.categories.clone(), Some(missing))
        }
        None => {
            cache.clear()?;
            (Vec::new(), None)
        }
    };

    let store_path = cache.store_path();
    let mut store = SqliteStore::open(&store_path)
        .with_context(|| format!("Failed to open feature store at {}", store_path.display()))?;

    let report = downloader
        .download_and_cache(bbox_wgs84, &mut store, target_crs, missing.as_deref(), delay, progress)
        .await?;

    let written = report.written();
    if report.cancelled {
        warn!(stored = stored.len() + written.len(), "Download cancelled, run again to fetch the rest");
    }
    if !report.failed.is_empty() {
        warn!(failed = ?report.failed, "Some categories could not be downloaded, run again to retry them");
    }

    let mut categories = stored;
    for key in written {
        if !categories.contains(&key) {
            categories.push(key);
        }
    }
    categories.sort();

    let metadata = if categories.is_empty() {
        warn!("No category could be downloaded, cache metadata not saved");
        None
    } else {
        let timestamp = existing
            .as_ref()
            .and_then(|m| m.osm_timestamp.as_deref())
            .or(report.source_timestamp.as_deref());
        Some(cache.save(area, timestamp, &categories)?)
    };

    Ok(CacheStatus::Downloaded {
        report,
        metadata,
        resumed: existing.is_some(),
    })
}

// ============================================================================
// Tests
// ============================================================================

//! Scoring output types.

use std::collections::BTreeMap;

use serde::Serialize;

/// Field name prefix for per-category scores.
pub const SCORE_FIELD_PREFIX: &str = "R_";

/// Field name for the aggregate score.
pub const TOTAL_FIELD: &str = "R_total";

/// Resilience result for one input point.
///
/// `None` means the value could not be computed (a fetch or query failed),
/// which is distinct from `Some(0.0)`: computed, but no facilities in reach.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResilienceRecord {
    pub scores: BTreeMap<String, Option<f64>>,
    pub total: Option<f64>,
}

impl ResilienceRecord {
    /// A record with every category and the total set to the failure sentinel.
    pub fn failed<'a, I>(categories: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            scores: categories.into_iter().map(|c| (c.to_string(), None)).collect(),
            total: None,
        }
    }

    pub fn score(&self, category: &str) -> Option<f64> {
        self.scores.get(category).copied().flatten()
    }

    pub fn field_name(category: &str) -> String {
        format!("{}{}", SCORE_FIELD_PREFIX, category)
    }

    /// `(field, value)` pairs: `R_<category>` for every category, then `R_total`.
    pub fn fields(&self) -> Vec<(String, Option<f64>)> {
        self.scores
            .iter()
            .map(|(category, score)| (Self::field_name(category), *score))
            .chain(std::iter::once((TOTAL_FIELD.to_string(), self.total)))
            .collect()
    }

    /// A failed category outranks zeros: a record with one failure and
    /// nothing found elsewhere is `Partial`, not `NoData`.
    pub fn outcome(&self) -> PointOutcome {
        match self.total {
            None => PointOutcome::Failed,
            Some(_) if self.scores.values().any(Option::is_none) => PointOutcome::Partial,
            Some(_) if self.scores.values().flatten().all(|s| *s == 0.0) => PointOutcome::NoData,
            Some(_) => PointOutcome::Scored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointOutcome {
    Scored,
    /// Computed successfully, but no facility fell in any band.
    NoData,
    /// Total computed from the categories that succeeded; others failed.
    Partial,
    Failed,
}

/// Counts reported at the end of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub no_data: usize,
    pub partial: usize,
    /// Inputs without usable point geometry.
    pub skipped: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: PointOutcome) {
        match outcome {
            PointOutcome::Scored => self.succeeded += 1,
            PointOutcome::NoData => self.no_data += 1,
            PointOutcome::Partial => self.partial += 1,
            PointOutcome::Failed => self.failed += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.no_data + self.partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_record_fields() {
        let record = ResilienceRecord::failed(["parks", "schools"]);
        assert_eq!(record.outcome(), PointOutcome::Failed);
        assert_eq!(
            record.fields(),
            vec![
                ("R_parks".to_string(), None),
                ("R_schools".to_string(), None),
                ("R_total".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_zero_scores_are_no_data_not_failure() {
        let record = ResilienceRecord {
            scores: BTreeMap::from([("schools".to_string(), Some(0.0))]),
            total: Some(0.0),
        };
        assert_eq!(record.outcome(), PointOutcome::NoData);
        assert_eq!(record.score("schools"), Some(0.0));
    }

    #[test]
    fn test_failed_category_with_zeros_is_partial() {
        let record = ResilienceRecord {
            scores: BTreeMap::from([
                ("libraries".to_string(), None),
                ("schools".to_string(), Some(0.0)),
            ]),
            total: Some(0.0),
        };
        assert_eq!(record.outcome(), PointOutcome::Partial);

        let mut summary = BatchSummary::default();
        summary.record(record.outcome());
        assert_eq!((summary.partial, summary.no_data), (1, 0));
        assert_eq!(summary.processed(), 1);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = BatchSummary::default();
        summary.record(PointOutcome::Scored);
        summary.record(PointOutcome::Scored);
        summary.record(PointOutcome::Failed);
        summary.record(PointOutcome::NoData);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.no_data, 1);
        assert_eq!(summary.processed(), 4);
    }
}

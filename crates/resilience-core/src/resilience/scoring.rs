//! Band overlap removal, weighted category scores and the per-point total.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::ResilienceRecord;

/// Feature keys found in one travel-time band.
pub type BandSet = BTreeSet<String>;

/// What a failed category does to the rest of the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Any failed category nulls every score and the total.
    #[default]
    WholeRecord,
    /// Failed categories are null; the total is the mean of the others.
    PerCategory,
}

/// Per-band weights, fastest band first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandWeights(pub [f64; 3]);

impl Default for BandWeights {
    fn default() -> Self {
        Self([1.0, 0.75, 0.5])
    }
}

impl BandWeights {
    /// Sum of `count * weight` over the bands. Missing bands count as empty;
    /// bands past the last weight do not contribute.
    pub fn score(&self, bands: &[BandSet]) -> f64 {
        self.0
            .iter()
            .zip(bands.iter().map(|band| band.len() as f64).chain(std::iter::repeat(0.0)))
            .map(|(weight, count)| weight * count)
            .sum()
    }
}

/// Attribute each feature to the fastest band that reaches it.
///
/// `bands` must be ordered fastest first. Afterwards the sets are pairwise
/// disjoint and their union is unchanged.
pub fn remove_band_overlap(bands: &mut [BandSet]) {
    for i in 1..bands.len() {
        let (faster, slower) = bands.split_at_mut(i);
        slower[0].retain(|key| !faster.iter().any(|band| band.contains(key)));
    }
}

/// Combine per-category scores into a record under `policy`.
///
/// With no categories at all the total is zero.
pub fn aggregate(scores: BTreeMap<String, Option<f64>>, policy: FailurePolicy) -> ResilienceRecord {
    let any_failed = scores.values().any(Option::is_none);

    if any_failed && policy == FailurePolicy::WholeRecord {
        return ResilienceRecord::failed(scores.keys().map(String::as_str));
    }

    let computed: Vec<f64> = scores.values().flatten().copied().collect();
    let total = if scores.is_empty() {
        Some(0.0)
    } else if computed.is_empty() {
        None
    } else {
        Some(computed.iter().sum::<f64>() / computed.len() as f64)
    };

    ResilienceRecord { scores, total }
}

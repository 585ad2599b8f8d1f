//! Count correlations: many unrelated packages bumped by the same amount.
//!
//! A single actor replaying the same synthetic submission N times moves every
//! package in it by exactly N between two months. Legitimate growth almost
//! never lines up that precisely across three or more packages.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{CountCorrelation, Thresholds, MAX_RESULTS};
use crate::month::Month;
use crate::storage::{CounterStore, Dimension, IdentifierFilter, StoreError};

/// Smallest group of identical deltas that is reported.
pub const MIN_GROUP_SIZE: usize = 3;

/// Group packages by their `previous -> target` delta and report every group
/// of at least [`MIN_GROUP_SIZE`] with `delta >= min_correlation_count`.
pub fn detect_count_correlations<S: CounterStore>(
    store: &S,
    target: Month,
    previous: Month,
    thresholds: &Thresholds,
) -> Result<Vec<CountCorrelation>, StoreError> {
    let current = store.counts_in_month(Dimension::Package, target, IdentifierFilter::All)?;
    if current.is_empty() {
        return Ok(Vec::new());
    }
    let before: HashMap<String, u64> = store
        .counts_in_month(Dimension::Package, previous, IdentifierFilter::All)?
        .into_iter()
        .collect();

    let min_delta = i64::try_from(thresholds.min_correlation_count).unwrap_or(i64::MAX);
    let mut groups: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for (name, count) in current {
        let prev = before.get(&name).copied().unwrap_or(0);
        let delta = count as i64 - prev as i64;
        if delta >= min_delta {
            groups.entry(delta).or_default().push(name);
        }
    }

    let correlations: Vec<CountCorrelation> = groups
        .into_iter()
        .rev()
        .filter(|(_, names)| names.len() >= MIN_GROUP_SIZE)
        .take(MAX_RESULTS)
        .map(|(delta, mut packages)| {
            packages.sort();
            CountCorrelation {
                delta,
                package_count: packages.len(),
                packages,
            }
        })
        .collect();

    debug!(%target, %previous, groups = correlations.len(), "correlation check finished");
    Ok(correlations)
}

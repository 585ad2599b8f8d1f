//! Base-package check: compares packages against the near-universal ones.
//!
//! Packages like the package manager itself appear in virtually every honest
//! submission, so their median count approximates the number of real
//! submitters. Nothing should sit far above it.

use tracing::debug;

use super::stats::{median, ratio};
use super::{BasePackageResult, PackageRatio, Thresholds, MAX_RESULTS};
use crate::month::Month;
use crate::storage::{CounterStore, Dimension, IdentifierFilter, StoreError};

pub fn detect_base_package_anomalies<S: CounterStore>(
    store: &S,
    target: Month,
    expected: &[String],
    thresholds: &Thresholds,
) -> Result<BasePackageResult, StoreError> {
    if expected.is_empty() {
        return Ok(BasePackageResult::default());
    }

    let base_counts = store.counts_in_month(Dimension::Package, target, IdentifierFilter::Only(expected))?;
    let counts: Vec<u64> = base_counts.iter().map(|(_, c)| *c).collect();
    let median = match median(&counts) {
        Some(m) if m > 0 => m,
        _ => return Ok(BasePackageResult::default()),
    };
    let threshold = median as f64 * thresholds.base_package_deviation_threshold;

    let outliers = above_threshold(base_counts, median, threshold);

    let others = store.counts_in_month(Dimension::Package, target, IdentifierFilter::Excluding(expected))?;
    let packages_above_threshold = above_threshold(others, median, threshold);

    debug!(
        %target,
        median,
        threshold,
        outliers = outliers.len(),
        above = packages_above_threshold.len(),
        "base package check finished"
    );

    Ok(BasePackageResult {
        median,
        outliers,
        packages_above_threshold,
    })
}

fn above_threshold(rows: Vec<(String, u64)>, median: u64, threshold: f64) -> Vec<PackageRatio> {
    let mut flagged: Vec<PackageRatio> = rows
        .into_iter()
        .filter(|(_, count)| *count as f64 > threshold)
        .map(|(name, count)| PackageRatio {
            ratio: ratio(count, median),
            name,
            count,
        })
        .collect();
    flagged.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    flagged.truncate(MAX_RESULTS);
    flagged
}

//! Shared arithmetic for the detectors.

/// Round to two decimal places, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Relative increase of `current` over `baseline`, in percent.
/// Returns `None` for a non-positive baseline.
pub fn growth_percent(current: u64, baseline: f64) -> Option<f64> {
    if baseline <= 0.0 {
        return None;
    }
    Some((current as f64 - baseline) / baseline * 100.0)
}

/// Median of integer counts. An even number of values yields the truncated
/// mean of the two middle elements. `None` for an empty input.
pub fn median(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        // u128 so the sum of two large counts cannot overflow.
        Some(((sorted[mid - 1] as u128 + sorted[mid] as u128) / 2) as u64)
    } else {
        Some(sorted[mid])
    }
}

/// `count / median` rounded for display.
pub fn ratio(count: u64, median: u64) -> f64 {
    round2(count as f64 / median as f64)
}

//! Growth anomalies: target-month counts far above the baseline average.

use std::cmp::Ordering;

use tracing::debug;

use super::stats::{growth_percent, round2};
use super::{GrowthAnomaly, Thresholds, MAX_RESULTS};
use crate::month::Month;
use crate::storage::{CounterStore, Dimension, IdentifierFilter, StoreError};

/// Baseline rows an entity needs before its growth is judged at all.
pub const MIN_BASELINE_SAMPLES: usize = 3;

/// Flag identifiers of `dim` whose `target` count grew more than
/// `growth_threshold` percent over their `[baseline_start, baseline_end]` average.
pub fn detect_growth_anomalies<S: CounterStore>(
    store: &S,
    dim: Dimension,
    target: Month,
    baseline_start: Month,
    baseline_end: Month,
    thresholds: &Thresholds,
) -> Result<Vec<GrowthAnomaly>, StoreError> {
    let baseline = store.baseline_averages(dim, baseline_start, baseline_end, MIN_BASELINE_SAMPLES)?;
    if baseline.is_empty() {
        return Ok(Vec::new());
    }
    let current = store.counts_in_month(dim, target, IdentifierFilter::All)?;

    let min_baseline = thresholds.min_baseline_count as f64;
    let mut flagged: Vec<(String, u64, f64, f64)> = Vec::new();
    for (id, count) in current {
        let Some(&avg) = baseline.get(&id) else { continue };
        if avg < min_baseline {
            continue;
        }
        let Some(growth) = growth_percent(count, avg) else { continue };
        if growth > thresholds.growth_threshold {
            flagged.push((id, count, avg, growth));
        }
    }

    // Rank on the unrounded growth, identifier breaks ties.
    flagged.sort_by(|a, b| {
        b.3.partial_cmp(&a.3)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    flagged.truncate(MAX_RESULTS);

    debug!(%dim, %target, baseline = baseline.len(), flagged = flagged.len(), "growth check finished");

    Ok(flagged
        .into_iter()
        .map(|(identifier, count, avg, growth)| GrowthAnomaly {
            identifier,
            count,
            baseline_avg: round2(avg),
            growth_percent: round2(growth),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCounterStore;

    fn month(v: u32) -> Month {
        Month::from_yyyymm(v).unwrap()
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            min_baseline_count: 50,
            min_correlation_count: 100,
            ..Thresholds::default()
        }
    }

    fn run(store: &MemoryCounterStore) -> Vec<GrowthAnomaly> {
        detect_growth_anomalies(
            store,
            Dimension::Mirror,
            month(202407),
            month(202401),
            month(202406),
            &thresholds(),
        )
        .unwrap()
    }

    #[test]
    fn test_flags_fivefold_growth() {
        let mut store = MemoryCounterStore::new();
        for m in 202401..=202406 {
            store.insert(Dimension::Mirror, "https://mirror.example.com/", month(m), 100);
        }
        store.insert(Dimension::Mirror, "https://mirror.example.com/", month(202407), 500);

        let result = run(&store);
        assert_eq!(
            result,
            vec![GrowthAnomaly {
                identifier: "https://mirror.example.com/".to_string(),
                count: 500,
                baseline_avg: 100.0,
                growth_percent: 400.0,
            }]
        );
    }

    #[test]
    fn test_growth_exactly_at_threshold_is_not_flagged() {
        let mut store = MemoryCounterStore::new();
        for m in 202401..=202406 {
            store.insert(Dimension::Mirror, "m", month(m), 100);
        }
        store.insert(Dimension::Mirror, "m", month(202407), 400);
        assert!(run(&store).is_empty());
    }

    #[test]
    fn test_requires_three_baseline_samples() {
        let mut store = MemoryCounterStore::new();
        store.insert(Dimension::Mirror, "m", month(202405), 100);
        store.insert(Dimension::Mirror, "m", month(202406), 100);
        store.insert(Dimension::Mirror, "m", month(202407), 10_000);
        assert!(run(&store).is_empty());

        store.insert(Dimension::Mirror, "m", month(202404), 100);
        assert_eq!(run(&store).len(), 1);
    }

    #[test]
    fn test_small_baseline_is_ignored() {
        let mut store = MemoryCounterStore::new();
        for m in 202401..=202406 {
            store.insert(Dimension::Mirror, "tiny", month(m), 10);
        }
        store.insert(Dimension::Mirror, "tiny", month(202407), 1000);
        assert!(run(&store).is_empty());
    }

    #[test]
    fn test_zero_baseline_with_zero_floor_is_skipped() {
        let mut store = MemoryCounterStore::new();
        for m in 202401..=202406 {
            store.insert(Dimension::Mirror, "zero", month(m), 0);
        }
        store.insert(Dimension::Mirror, "zero", month(202407), 1000);
        let t = Thresholds {
            min_baseline_count: 0,
            ..thresholds()
        };
        let result = detect_growth_anomalies(
            &store,
            Dimension::Mirror,
            month(202407),
            month(202401),
            month(202406),
            &t,
        )
        .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_sorted_by_growth_and_rounded() {
        let mut store = MemoryCounterStore::new();
        for (m, c) in [(202401, 100), (202402, 100), (202403, 101)] {
            store.insert(Dimension::Mirror, "a", month(m), c);
            store.insert(Dimension::Mirror, "b", month(m), c);
        }
        store.insert(Dimension::Mirror, "a", month(202407), 500);
        store.insert(Dimension::Mirror, "b", month(202407), 900);

        let result = run(&store);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].identifier, "b");
        assert_eq!(result[1].identifier, "a");
        // avg = 100.333..., growth(a) = 398.34...
        assert_eq!(result[1].baseline_avg, 100.33);
        assert_eq!(result[1].growth_percent, 398.34);
    }

    #[test]
    fn test_capped_at_fifty() {
        let mut store = MemoryCounterStore::new();
        for i in 0..60u64 {
            let id = format!("mirror-{i:02}");
            for m in 202401..=202406 {
                store.insert(Dimension::Mirror, &id, month(m), 100);
            }
            store.insert(Dimension::Mirror, &id, month(202407), 1000 + i);
        }
        let result = run(&store);
        assert_eq!(result.len(), MAX_RESULTS);
        assert_eq!(result[0].identifier, "mirror-59");
    }

    #[test]
    fn test_baseline_equal_to_floor_is_evaluated() {
        let mut store = MemoryCounterStore::new();
        for m in 202401..=202406 {
            store.insert(Dimension::Mirror, "at-floor", month(m), 50);
            store.insert(Dimension::Mirror, "below-floor", month(m), 49);
        }
        store.insert(Dimension::Mirror, "at-floor", month(202407), 1000);
        store.insert(Dimension::Mirror, "below-floor", month(202407), 1000);

        let result = run(&store);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].identifier, "at-floor");
        assert_eq!(result[0].baseline_avg, 50.0);
        assert_eq!(result[0].growth_percent, 1900.0);
    }
}

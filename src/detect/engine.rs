use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::base_package::detect_base_package_anomalies;
use super::correlation::detect_count_correlations;
use super::growth::detect_growth_anomalies;
use super::spike::detect_new_spikes;
use super::{DetectError, DetectionResult, Thresholds};
use crate::month::Month;
use crate::storage::{CounterStore, Dimension};

/// Target month plus the baseline it is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionWindow {
    pub target_month: Month,
    pub baseline_start: Month,
    pub baseline_end: Month,
}

impl DetectionWindow {
    /// Baseline covering the `lookback_months` months right before `target`.
    pub fn for_target(target: Month, lookback_months: u32) -> Self {
        let lookback = i32::try_from(lookback_months).unwrap_or(i32::MAX);
        Self {
            target_month: target,
            baseline_start: target.offset(-lookback),
            baseline_end: target.offset(-1),
        }
    }

    /// True when the baseline is non-empty and ends before the target month.
    pub fn is_well_ordered(&self) -> bool {
        self.baseline_start <= self.baseline_end && self.baseline_end < self.target_month
    }
}

/// Runs every check for one target month and assembles the report.
pub struct AnomalyEngine<S> {
    store: S,
    thresholds: Thresholds,
    expected_packages: Vec<String>,
}

impl<S: CounterStore> AnomalyEngine<S> {
    pub fn new(store: S, thresholds: Thresholds, expected_packages: Vec<String>) -> Self {
        Self {
            store,
            thresholds,
            expected_packages,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn expected_packages(&self) -> &[String] {
        &self.expected_packages
    }

    /// Run all checks. Month bounds are not validated; a degenerate window
    /// simply produces empty sections.
    pub fn detect(
        &self,
        target_month: Month,
        baseline_start: Month,
        baseline_end: Month,
    ) -> Result<DetectionResult, DetectError> {
        let window = DetectionWindow {
            target_month,
            baseline_start,
            baseline_end,
        };
        if !window.is_well_ordered() {
            warn!(
                %target_month,
                %baseline_start,
                %baseline_end,
                "baseline window is empty or overlaps the target month"
            );
        }

        info!(%target_month, %baseline_start, %baseline_end, "Running anomaly detection");

        let store = &self.store;
        let t = &self.thresholds;
        let growth = |dim: Dimension| detect_growth_anomalies(store, dim, target_month, baseline_start, baseline_end, t);

        let result = DetectionResult {
            count_correlations: detect_count_correlations(store, target_month, baseline_end, t)?,
            new_package_spikes: detect_new_spikes(store, Dimension::Package, target_month, baseline_start, t)?,
            mirror_anomalies: growth(Dimension::Mirror)?,
            new_mirror_spikes: detect_new_spikes(store, Dimension::Mirror, target_month, baseline_start, t)?,
            system_arch_anomalies: growth(Dimension::SystemArchitecture)?,
            os_arch_anomalies: growth(Dimension::OsArchitecture)?,
            country_anomalies: growth(Dimension::Country)?,
            base_package_result: detect_base_package_anomalies(
                store,
                target_month,
                &self.expected_packages,
                t,
            )?,
        };

        info!(
            severity = ?result.severity(t.extreme_growth_threshold),
            correlations = result.count_correlations.len(),
            mirror = result.mirror_anomalies.len() + result.new_mirror_spikes.len(),
            arch = result.system_arch_anomalies.len() + result.os_arch_anomalies.len(),
            base = result.base_package_result.has_anomalies(),
            "Anomaly detection finished"
        );

        Ok(result)
    }

    /// [`detect`](Self::detect) over a precomputed window.
    pub fn detect_window(&self, window: &DetectionWindow) -> Result<DetectionResult, DetectError> {
        self.detect(window.target_month, window.baseline_start, window.baseline_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCounterStore;

    fn month(v: u32) -> Month {
        Month::from_yyyymm(v).unwrap()
    }

    #[test]
    fn test_window_for_target() {
        let w = DetectionWindow::for_target(month(202401), 6);
        assert_eq!(w.baseline_start, month(202307));
        assert_eq!(w.baseline_end, month(202312));
        assert!(w.is_well_ordered());

        let degenerate = DetectionWindow {
            target_month: month(202403),
            baseline_start: month(202401),
            baseline_end: month(202406),
        };
        assert!(!degenerate.is_well_ordered());
    }

    #[test]
    fn test_thresholds_accessor() {
        let t = Thresholds {
            lookback_months: 12,
            ..Thresholds::default()
        };
        let engine = AnomalyEngine::new(MemoryCounterStore::new(), t, vec![]);
        assert_eq!(engine.thresholds().lookback_months, 12);
        assert!(engine.expected_packages().is_empty());
    }

    #[test]
    fn test_empty_store_yields_empty_result() {
        let engine = AnomalyEngine::new(
            MemoryCounterStore::new(),
            Thresholds::default(),
            vec!["pacman".to_string()],
        );
        let result = engine.detect(month(202407), month(202401), month(202406)).unwrap();
        assert_eq!(result, DetectionResult::default());
    }

    #[test]
    fn test_inverted_window_is_permissive() {
        let store = MemoryCounterStore::new().with(Dimension::Mirror, "m", month(202407), 5000);
        let engine = AnomalyEngine::new(store, Thresholds::default(), vec![]);
        let result = engine.detect(month(202407), month(202406), month(202401)).unwrap();
        assert!(result.mirror_anomalies.is_empty());
        // No history in [202406, 202407) so the mirror still shows as new.
        assert_eq!(result.new_mirror_spikes.len(), 1);
    }

    #[test]
    fn test_engine_borrows_store() {
        let store = MemoryCounterStore::new();
        let engine = AnomalyEngine::new(&store, Thresholds::default(), vec![]);
        assert!(engine.detect(month(202407), month(202401), month(202406)).is_ok());
    }
}

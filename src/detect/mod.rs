//! Anomaly detection over monthly popularity counters.

pub mod base_package;
pub mod correlation;
pub mod engine;
pub mod growth;
pub mod report;
pub mod spike;
pub mod stats;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StoreError;

pub use self::engine::{AnomalyEngine, DetectionWindow};

/// Reporting cap applied to every result list.
pub const MAX_RESULTS: usize = 50;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Tunable sensitivity parameters for one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Size of the default baseline window, in months.
    pub lookback_months: u32,
    /// Minimum baseline average for an entity to be eligible for growth checks.
    pub min_baseline_count: u64,
    /// Minimum delta for correlation groups and minimum count for new-entity spikes.
    pub min_correlation_count: u64,
    /// Growth percentage above which an entity is flagged.
    pub growth_threshold: f64,
    /// Growth percentage that marks mirror growth as extreme.
    pub extreme_growth_threshold: f64,
    /// Multiplier on the base-package median giving the outlier threshold.
    pub base_package_deviation_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            lookback_months: 6,
            min_baseline_count: 100,
            min_correlation_count: 1000,
            growth_threshold: 300.0,
            extreme_growth_threshold: 1000.0,
            base_package_deviation_threshold: 1.5,
        }
    }
}

/// Severity of a detection result as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Process exit code used by the report command.
    pub fn exit_code(self) -> i32 {
        match self {
            Severity::Info => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
        }
    }
}

/// An entity whose target-month count grew far beyond its baseline average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthAnomaly {
    pub identifier: String,
    pub count: u64,
    pub baseline_avg: f64,
    pub growth_percent: f64,
}

/// An entity with no baseline history that already exceeds the volume floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spike {
    pub identifier: String,
    pub count: u64,
}

/// Packages that all moved by exactly the same delta between two months.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCorrelation {
    pub delta: i64,
    pub package_count: usize,
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRatio {
    pub name: String,
    pub count: u64,
    pub ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasePackageResult {
    pub median: u64,
    pub outliers: Vec<PackageRatio>,
    pub packages_above_threshold: Vec<PackageRatio>,
}

impl BasePackageResult {
    pub fn has_anomalies(&self) -> bool {
        !self.outliers.is_empty() || !self.packages_above_threshold.is_empty()
    }
}

/// Aggregate output of one detection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub count_correlations: Vec<CountCorrelation>,
    pub new_package_spikes: Vec<Spike>,
    pub mirror_anomalies: Vec<GrowthAnomaly>,
    pub new_mirror_spikes: Vec<Spike>,
    pub system_arch_anomalies: Vec<GrowthAnomaly>,
    pub os_arch_anomalies: Vec<GrowthAnomaly>,
    pub country_anomalies: Vec<GrowthAnomaly>,
    pub base_package_result: BasePackageResult,
}

impl DetectionResult {
    pub fn has_mirror_anomalies(&self) -> bool {
        !self.mirror_anomalies.is_empty() || !self.new_mirror_spikes.is_empty()
    }

    pub fn has_architecture_anomalies(&self) -> bool {
        !self.system_arch_anomalies.is_empty() || !self.os_arch_anomalies.is_empty()
    }

    pub fn has_country_anomalies(&self) -> bool {
        !self.country_anomalies.is_empty()
    }

    pub fn has_base_package_anomalies(&self) -> bool {
        self.base_package_result.has_anomalies()
    }

    pub fn has_extreme_mirror_growth(&self, threshold: f64) -> bool {
        self.mirror_anomalies.iter().any(|a| a.growth_percent > threshold)
    }

    /// Base-package anomalies, mirror and architecture anomalies together, or
    /// extreme mirror growth are each strong enough to warrant investigation.
    pub fn is_high_confidence(&self, extreme_growth_threshold: f64) -> bool {
        self.has_base_package_anomalies()
            || (self.has_mirror_anomalies() && self.has_architecture_anomalies())
            || self.has_extreme_mirror_growth(extreme_growth_threshold)
    }

    pub fn severity(&self, extreme_growth_threshold: f64) -> Severity {
        if self.is_high_confidence(extreme_growth_threshold) {
            Severity::Critical
        } else if self.has_mirror_anomalies()
            || self.has_architecture_anomalies()
            || self.has_country_anomalies()
        {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

//! In-process counter store. Aggregates raw rows in Rust instead of SQL.

use std::collections::{BTreeMap, HashMap};

use super::{CounterStore, Dimension, IdentifierFilter, StoreError};
use crate::month::Month;

#[derive(Debug, Default, Clone)]
pub struct MemoryCounterStore {
    rows: HashMap<Dimension, BTreeMap<String, BTreeMap<Month, u64>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the count of one `(identifier, month)` row.
    pub fn insert(&mut self, dim: Dimension, identifier: &str, month: Month, count: u64) {
        self.rows
            .entry(dim)
            .or_default()
            .entry(identifier.to_string())
            .or_default()
            .insert(month, count);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, dim: Dimension, identifier: &str, month: Month, count: u64) -> Self {
        self.insert(dim, identifier, month, count);
        self
    }

    fn series(&self, dim: Dimension) -> impl Iterator<Item = (&String, &BTreeMap<Month, u64>)> {
        self.rows.get(&dim).into_iter().flat_map(|m| m.iter())
    }
}

impl CounterStore for MemoryCounterStore {
    fn count_in_month(&self, dim: Dimension, identifier: &str, month: Month) -> Result<u64, StoreError> {
        Ok(self
            .rows
            .get(&dim)
            .and_then(|ids| ids.get(identifier))
            .and_then(|months| months.get(&month))
            .copied()
            .unwrap_or(0))
    }

    fn baseline_averages(
        &self,
        dim: Dimension,
        start: Month,
        end: Month,
        min_samples: usize,
    ) -> Result<BTreeMap<String, f64>, StoreError> {
        let mut averages = BTreeMap::new();
        if start > end {
            return Ok(averages);
        }
        for (id, months) in self.series(dim) {
            let window: Vec<u64> = months.range(start..=end).map(|(_, c)| *c).collect();
            if window.is_empty() || window.len() < min_samples {
                continue;
            }
            let sum: f64 = window.iter().map(|&c| c as f64).sum();
            averages.insert(id.clone(), sum / window.len() as f64);
        }
        Ok(averages)
    }

    fn exists_before_month(
        &self,
        dim: Dimension,
        identifier: &str,
        from: Month,
        to_exclusive: Month,
    ) -> Result<bool, StoreError> {
        if from >= to_exclusive {
            return Ok(false);
        }
        Ok(self
            .rows
            .get(&dim)
            .and_then(|ids| ids.get(identifier))
            .map(|months| months.range(from..to_exclusive).next().is_some())
            .unwrap_or(false))
    }

    fn counts_in_month(
        &self,
        dim: Dimension,
        month: Month,
        filter: IdentifierFilter<'_>,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        Ok(self
            .series(dim)
            .filter(|(id, _)| filter.admits(id))
            .filter_map(|(id, months)| months.get(&month).map(|c| (id.clone(), *c)))
            .collect())
    }
}

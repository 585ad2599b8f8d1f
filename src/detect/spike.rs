//! New-entity spikes: identifiers with no history that arrive at high volume.

use tracing::debug;

use super::{Spike, Thresholds, MAX_RESULTS};
use crate::month::Month;
use crate::storage::{CounterStore, Dimension, IdentifierFilter, StoreError};

/// Identifiers of `dim` counting at least `min_correlation_count` in `target`
/// that have no row at all in `[baseline_start, target)`.
pub fn detect_new_spikes<S: CounterStore>(
    store: &S,
    dim: Dimension,
    target: Month,
    baseline_start: Month,
    thresholds: &Thresholds,
) -> Result<Vec<Spike>, StoreError> {
    let mut spikes = Vec::new();
    for (identifier, count) in store.counts_in_month(dim, target, IdentifierFilter::All)? {
        if count < thresholds.min_correlation_count {
            continue;
        }
        if store.exists_before_month(dim, &identifier, baseline_start, target)? {
            continue;
        }
        spikes.push(Spike { identifier, count });
    }

    spikes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.identifier.cmp(&b.identifier)));
    spikes.truncate(MAX_RESULTS);

    debug!(%dim, %target, spikes = spikes.len(), "new-entity check finished");
    Ok(spikes)
}

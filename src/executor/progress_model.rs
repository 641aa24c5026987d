//! Progress-band math and the monotonicity write-guard (spec.md §4.F).
//!
//! The executor owns the band `[30, 100]`; everything below 30 is the
//! caller's responsibility. `ProgressModel` tracks how much of that band
//! has been earned so far and enforces I1 through a read-modify-write
//! guard against the Progress Store — the store itself is a last-writer-
//! wins cache, not the source of the guarantee (spec.md §5, §9).

use crate::store::ProgressStore;

/// Cumulative progress is clamped here until `finish` explicitly advances
/// to 100 (spec.md §4.F).
const PRE_FINALISATION_CEILING: f64 = 95.0;
const FLOOR: f64 = 30.0;

pub struct ProgressModel {
    post_id: String,
    per_item: f64,
    /// Sum of perItem allocations for items already fully accounted for.
    base: f64,
}

impl ProgressModel {
    /// `item_count` must be ≥ 1 (spec.md §8 rejects empty jobs earlier).
    pub fn new(post_id: impl Into<String>, item_count: usize) -> Self {
        Self {
            post_id: post_id.into(),
            per_item: 70.0 / item_count as f64,
            base: 0.0,
        }
    }

    pub fn per_item(&self) -> f64 {
        self.per_item
    }

    /// Advances `base` by a full item's allotment — used both when an item
    /// completes in this attempt and when resuming a previously-completed
    /// item (spec.md §4.F "Resumption" step 1).
    pub fn credit_full_item(&mut self) {
        self.base += self.per_item;
    }

    /// Computes the absolute cumulative percentage for a partial
    /// within-item contribution (download ping or live encode weighting)
    /// and applies the monotonicity write-guard.
    pub async fn report_partial(&self, store: &dyn ProgressStore, item_fraction: f64) -> f64 {
        let calculated = (FLOOR + self.base + self.per_item * item_fraction)
            .min(PRE_FINALISATION_CEILING);
        self.write_guarded(store, calculated).await
    }

    /// Reports the cumulative value after `credit_full_item` has been
    /// called for the just-finished item.
    pub async fn report_after_credit(&self, store: &dyn ProgressStore) -> f64 {
        let calculated = (FLOOR + self.base).min(PRE_FINALISATION_CEILING);
        self.write_guarded(store, calculated).await
    }

    /// Finalisation: unconditionally advances to 100 (spec.md §4.F
    /// "Finalisation" step 3).
    pub async fn finish(&self, store: &dyn ProgressStore) {
        store.set_max_progress(&self.post_id, 100.0).await;
    }

    async fn write_guarded(&self, store: &dyn ProgressStore, calculated: f64) -> f64 {
        let stored = store.get_max_progress(&self.post_id).await;
        if calculated > stored {
            store.set_max_progress(&self.post_id, calculated).await;
            calculated
        } else {
            stored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::in_memory::InMemoryProgressStore;

    #[tokio::test]
    async fn progress_never_regresses_across_partial_reports() {
        let store = InMemoryProgressStore::new();
        let model = ProgressModel::new("post-1", 2);

        let first = model.report_partial(&store, 0.9).await;
        let second = model.report_partial(&store, 0.1).await;

        assert!(second >= first, "progress regressed: {first} -> {second}");
    }

    #[tokio::test]
    async fn completed_item_credits_full_per_item_allocation() {
        let store = InMemoryProgressStore::new();
        let mut model = ProgressModel::new("post-1", 2);

        model.credit_full_item();
        let value = model.report_after_credit(&store).await;

        assert!((value - (30.0 + model.per_item())).abs() < 1e-9);
    }
}

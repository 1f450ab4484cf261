//! Per-batch decisions.

use tandem_core::{DiffBatch, SyncDecision};

/// Decides what to do with each batch of a round.
///
/// Interactive front ends ask a person; unattended runs use
/// [`FixedDecider`]. Any `Fn(&DiffBatch) -> SyncDecision` closure also
/// works.
pub trait Decider {
    /// Returns the decision for `batch`.
    fn decide(&self, batch: &DiffBatch) -> SyncDecision;
}

impl<F> Decider for F
where
    F: Fn(&DiffBatch) -> SyncDecision,
{
    fn decide(&self, batch: &DiffBatch) -> SyncDecision {
        self(batch)
    }
}

/// Returns the same decision for every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDecider(pub SyncDecision);

impl FixedDecider {
    /// Always sync low to high.
    pub const fn low_to_high() -> Self {
        Self(SyncDecision::LowToHigh)
    }

    /// Always sync high to low.
    pub const fn high_to_low() -> Self {
        Self(SyncDecision::HighToLow)
    }
}

impl Decider for FixedDecider {
    fn decide(&self, _batch: &DiffBatch) -> SyncDecision {
        self.0
    }
}

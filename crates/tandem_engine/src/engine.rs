//! Reconciliation round state machine.

use crate::config::EngineConfig;
use crate::decision::Decider;
use crate::error::{EngineError, EngineResult};
use crate::sink::{Ack, StateSink};
use crate::source::SnapshotSource;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tandem_core::{
    build_batches, order_batches, BatchFingerprint, EntityKind, NodeDiff, PolicyRegistry,
    ResolvedState, Resolver, Side, SyncDecision, Uid,
};
use tracing::{debug, info, warn};

/// The current state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// No round has run yet.
    Idle,
    /// Fetching both snapshots.
    Fetching,
    /// Diffing, batching and ordering.
    Diffing,
    /// Deciding and resolving batches.
    Resolving,
    /// Writing resolved states.
    Persisting,
    /// The last round completed.
    Done,
    /// The last round failed.
    Error,
}

impl ReconcileState {
    /// Returns true while a round is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReconcileState::Fetching
                | ReconcileState::Diffing
                | ReconcileState::Resolving
                | ReconcileState::Persisting
        )
    }

    /// Returns true if a new round may start.
    pub fn can_start_round(&self) -> bool {
        matches!(
            self,
            ReconcileState::Idle | ReconcileState::Done | ReconcileState::Error
        )
    }
}

/// Statistics across rounds.
#[derive(Debug, Clone, Default)]
pub struct RoundStats {
    /// Rounds completed successfully.
    pub rounds_completed: u64,
    /// Rounds that failed or were cancelled.
    pub rounds_failed: u64,
    /// Batches handed to the decider.
    pub batches_decided: u64,
    /// Batches resolved with a sync decision.
    pub batches_synced: u64,
    /// Batches the decider chose to ignore.
    pub batches_ignored: u64,
    /// Batches hidden by an earlier ignore.
    pub batches_suppressed: u64,
    /// Batches skipped because nothing changed.
    pub batches_unchanged: u64,
    /// States written to the sink.
    pub states_persisted: u64,
    /// Last successful round time.
    pub last_round_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// What happened to one batch in a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Root identity.
    pub root: Uid,
    /// Root kind.
    pub root_kind: EntityKind,
    /// Number of members.
    pub size: usize,
    /// Decision taken.
    pub decision: SyncDecision,
    /// Fingerprint at decision time.
    pub fingerprint: BatchFingerprint,
}

/// Result of one round.
#[derive(Debug, Clone)]
pub struct RoundReport {
    /// Decided batches, in review order.
    pub outcomes: Vec<BatchOutcome>,
    /// Batches hidden by an earlier ignore.
    pub suppressed: usize,
    /// Batches skipped because nothing changed.
    pub unchanged: usize,
    /// Changes resolved for the low side.
    pub low: ResolvedState,
    /// Changes resolved for the high side.
    pub high: ResolvedState,
    /// Acknowledgements of persisted states.
    pub acks: Vec<Ack>,
    /// Duration of the round.
    pub duration: Duration,
}

impl RoundReport {
    /// Number of batches resolved with a sync decision.
    pub fn synced(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.decision.is_sync())
            .count()
    }

    /// Returns true if nothing was written.
    pub fn is_noop(&self) -> bool {
        self.acks.is_empty()
    }
}

/// Runs reconciliation rounds between two snapshot sources.
pub struct ReconcileEngine<L: SnapshotSource, H: SnapshotSource, S: StateSink> {
    config: EngineConfig,
    registry: PolicyRegistry,
    low: L,
    high: H,
    sink: S,
    state: RwLock<ReconcileState>,
    stats: RwLock<RoundStats>,
    cancelled: AtomicBool,
}

impl<L: SnapshotSource, H: SnapshotSource, S: StateSink> ReconcileEngine<L, H, S> {
    /// Creates a new engine.
    pub fn new(config: EngineConfig, registry: PolicyRegistry, low: L, high: H, sink: S) -> Self {
        Self {
            config,
            registry,
            low,
            high,
            sink,
            state: RwLock::new(ReconcileState::Idle),
            stats: RwLock::new(RoundStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> ReconcileState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> RoundStats {
        self.stats.read().clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Gets the policy registry.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Gets the low side source.
    pub fn low_source(&self) -> &L {
        &self.low
    }

    /// Gets the high side source.
    pub fn high_source(&self) -> &H {
        &self.high
    }

    /// Gets the state sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Cancels the running round at its next phase boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> EngineResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: ReconcileState) {
        *self.state.write() = state;
    }

    /// Runs one round: fetch, diff, decide, resolve, persist.
    pub fn run_round<D: Decider + ?Sized>(&self, decider: &D) -> EngineResult<RoundReport> {
        let start = Instant::now();
        self.reset_cancel();

        if !self.state().can_start_round() {
            return Err(EngineError::InvalidStateTransition {
                from: format!("{:?}", self.state()),
                to: "Fetching".into(),
            });
        }

        match self.round(decider, start) {
            Ok(report) => {
                self.set_state(ReconcileState::Done);
                let mut stats = self.stats.write();
                stats.rounds_completed += 1;
                stats.batches_decided += report.outcomes.len() as u64;
                stats.batches_synced += report.synced() as u64;
                stats.batches_ignored += report
                    .outcomes
                    .iter()
                    .filter(|outcome| outcome.decision == SyncDecision::Ignore)
                    .count() as u64;
                stats.batches_suppressed += report.suppressed as u64;
                stats.batches_unchanged += report.unchanged as u64;
                stats.states_persisted += report.acks.len() as u64;
                stats.last_round_time = Some(Instant::now());
                stats.last_error = None;
                Ok(report)
            }
            Err(err) => {
                self.handle_error(&err);
                Err(err)
            }
        }
    }

    fn round<D: Decider + ?Sized>(&self, decider: &D, start: Instant) -> EngineResult<RoundReport> {
        self.set_state(ReconcileState::Fetching);
        let low = self.low.fetch_snapshot()?;
        let high = self.high.fetch_snapshot()?;
        self.check_cancelled()?;

        self.set_state(ReconcileState::Diffing);
        let node_diff = NodeDiff::from_snapshots(&low, &high, &self.registry)?;
        let batches = order_batches(build_batches(&node_diff, &self.registry)?, &self.registry);
        self.check_cancelled()?;

        self.set_state(ReconcileState::Resolving);
        let resolver = Resolver::new(&self.registry).with_options(self.config.resolve_options());
        let mut low_state = ResolvedState::new(Side::Low);
        let mut high_state = ResolvedState::new(Side::High);
        let mut outcomes = Vec::new();
        let mut ignores = Vec::new();
        let mut suppressed = 0;
        let mut unchanged = 0;

        for batch in &batches {
            if !self.config.include_suppressed && node_diff.is_suppressed(batch) {
                suppressed += 1;
                continue;
            }
            if self.config.skip_unchanged && batch.is_unchanged() {
                unchanged += 1;
                continue;
            }
            if self
                .config
                .max_batches
                .is_some_and(|max| outcomes.len() >= max)
            {
                break;
            }

            let decision = decider.decide(batch);
            let fingerprint = batch.fingerprint();
            (low_state, high_state) = resolver.resolve(batch, decision, &low_state, &high_state)?;
            if decision == SyncDecision::Ignore {
                ignores.push((batch.root_id(), fingerprint));
            }
            debug!(
                root = %batch.root_id(),
                kind = %batch.root_kind(),
                size = batch.len(),
                %decision,
                "decided batch"
            );
            outcomes.push(BatchOutcome {
                root: batch.root_id(),
                root_kind: batch.root_kind(),
                size: batch.len(),
                decision,
                fingerprint,
            });
        }
        self.check_cancelled()?;

        self.set_state(ReconcileState::Persisting);
        for (root, fingerprint) in ignores {
            self.sink.record_ignored(root, fingerprint)?;
        }
        let mut acks = Vec::new();
        for state in [&low_state, &high_state] {
            if !state.is_empty() {
                acks.push(self.sink.persist(state)?);
            }
        }

        info!(
            batches = batches.len(),
            decided = outcomes.len(),
            suppressed,
            unchanged,
            persisted = acks.len(),
            "round complete"
        );

        Ok(RoundReport {
            outcomes,
            suppressed,
            unchanged,
            low: low_state,
            high: high_state,
            acks,
            duration: start.elapsed(),
        })
    }

    fn handle_error(&self, error: &EngineError) {
        warn!(%error, "round failed");
        self.set_state(ReconcileState::Error);
        let mut stats = self.stats.write();
        stats.rounds_failed += 1;
        stats.last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::FixedDecider;
    use crate::sink::MemorySink;
    use crate::source::MemorySource;
    use tandem_core::{Entity, NodeIdentity, Snapshot};

    fn snapshot(name: &str, entities: Vec<Entity>) -> Snapshot {
        Snapshot::builder(NodeIdentity::new(name))
            .objects(entities)
            .build()
    }

    fn engine(
        low: Vec<Entity>,
        high: Vec<Entity>,
    ) -> ReconcileEngine<MemorySource, MemorySource, MemorySink> {
        ReconcileEngine::new(
            EngineConfig::default(),
            PolicyRegistry::standard(),
            MemorySource::new(Side::Low, snapshot("low", low)),
            MemorySource::new(Side::High, snapshot("high", high)),
            MemorySink::new(),
        )
    }

    fn job(n: u128, status: &str) -> Entity {
        Entity::new(Uid::from_u128(n), EntityKind::Job).with_attr("status", status)
    }

    #[test]
    fn state_predicates() {
        assert!(ReconcileState::Idle.can_start_round());
        assert!(ReconcileState::Resolving.is_active());
        assert!(!ReconcileState::Persisting.can_start_round());
    }

    #[test]
    fn round_moves_to_done() {
        let engine = engine(vec![job(1, "done")], vec![]);
        assert_eq!(engine.state(), ReconcileState::Idle);

        let report = engine.run_round(&FixedDecider::low_to_high()).unwrap();
        assert_eq!(engine.state(), ReconcileState::Done);
        assert_eq!(report.synced(), 1);
        assert_eq!(report.high.create, vec![job(1, "done")]);
        assert!(report.low.is_empty());
        assert_eq!(report.acks.len(), 1);
        assert_eq!(engine.stats().rounds_completed, 1);
    }

    #[test]
    fn source_failure_moves_to_error() {
        let engine = engine(vec![], vec![]);
        engine.high_source().fail_with("timeout");

        let err = engine.run_round(&FixedDecider::low_to_high()).unwrap_err();
        assert!(matches!(err, EngineError::Source { side: Side::High, .. }));
        assert_eq!(engine.state(), ReconcileState::Error);
        assert_eq!(engine.stats().rounds_failed, 1);
        assert!(engine.stats().last_error.is_some());

        engine.high_source().clear_failure();
        assert!(engine.run_round(&FixedDecider::low_to_high()).is_ok());
    }

    #[test]
    fn cancel_during_decisions_persists_nothing() {
        let engine = engine(vec![job(1, "done")], vec![]);
        let decider = |_: &tandem_core::DiffBatch| {
            engine.cancel();
            SyncDecision::LowToHigh
        };

        let err = engine.run_round(&decider).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(engine.sink().persisted().is_empty());
    }
}

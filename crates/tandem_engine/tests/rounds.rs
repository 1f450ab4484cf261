//! End-to-end reconciliation rounds over in-memory collaborators.

use parking_lot::Mutex;
use tandem_core::{DiffBatch, PermissionGrant, PolicyRegistry, Side, Snapshot, SyncDecision, Uid};
use tandem_engine::{
    EngineConfig, EngineError, FixedDecider, MemorySink, MemorySource, ReconcileEngine,
    ReconcileState,
};
use tandem_testkit::prelude::*;

type MemoryEngine = ReconcileEngine<MemorySource, MemorySource, MemorySink>;

fn engine_for(pair: SnapshotPair, config: EngineConfig) -> MemoryEngine {
    ReconcileEngine::new(
        config,
        PolicyRegistry::standard(),
        MemorySource::new(Side::Low, pair.low),
        MemorySource::new(Side::High, pair.high),
        MemorySink::new(),
    )
}

#[test]
fn identical_sides_need_no_decisions() {
    let engine = engine_for(
        SnapshotPair::identical(request_tree("running")),
        EngineConfig::default(),
    );
    let report = engine
        .run_round(&|_: &DiffBatch| -> SyncDecision { panic!("nothing to decide") })
        .unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(report.unchanged, 1);
    assert!(report.is_noop());
    assert!(engine.sink().persisted().is_empty());
}

#[test]
fn unchanged_batches_can_be_reviewed() {
    let engine = engine_for(
        SnapshotPair::identical(request_tree("running")),
        EngineConfig::new().with_skip_unchanged(false),
    );
    let report = engine.run_round(&FixedDecider::low_to_high()).unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].size, 4);
    assert!(report.high.is_empty());
    assert!(report.is_noop());
}

#[test]
fn diverged_job_syncs_high_to_low() {
    let engine = engine_for(
        SnapshotPair::diverged_job("running", "done"),
        EngineConfig::default(),
    );
    let report = engine.run_round(&FixedDecider::high_to_low()).unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].root, uid(REQUEST));
    assert_eq!(report.low.update, vec![job(JOB, "done")]);
    assert!(report.high.is_empty());

    let persisted = engine.sink().persisted();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].alias, Side::Low);
    assert_eq!(engine.stats().states_persisted, 1);
}

#[test]
fn ignored_batch_stays_hidden_until_it_changes() {
    let pair = SnapshotPair::diverged_job("running", "done");
    let engine = engine_for(pair.clone(), EngineConfig::default());

    let report = engine
        .run_round(&FixedDecider(SyncDecision::Ignore))
        .unwrap();
    assert!(report.is_noop());
    let ignored = engine.sink().ignored();
    let fingerprint = ignored[&uid(REQUEST)];
    assert_eq!(fingerprint, report.outcomes[0].fingerprint);

    // The low side now carries the ignore record.
    engine.low_source().set_snapshot(
        request_tree_builder(low_node(), "running")
            .ignore(uid(REQUEST), fingerprint)
            .build(),
    );
    let report = engine.run_round(&FixedDecider::low_to_high()).unwrap();
    assert_eq!(report.suppressed, 1);
    assert!(report.outcomes.is_empty());

    // A further change on the high side resurfaces the batch.
    engine
        .high_source()
        .set_snapshot(request_tree_on(high_node(), "failed"));
    let report = engine.run_round(&FixedDecider::low_to_high()).unwrap();
    assert_eq!(report.suppressed, 0);
    assert_eq!(report.synced(), 1);
    assert_eq!(report.high.update, vec![job(JOB, "running")]);
}

#[test]
fn suppressed_batches_can_be_included() {
    let pair = SnapshotPair::diverged_job("running", "done");
    let first = engine_for(pair.clone(), EngineConfig::default());
    let fingerprint = first
        .run_round(&FixedDecider(SyncDecision::Skip))
        .unwrap()
        .outcomes[0]
        .fingerprint;

    let low = request_tree_builder(low_node(), "running")
        .ignore(uid(REQUEST), fingerprint)
        .build();
    let engine = engine_for(
        SnapshotPair::new(low, pair.high),
        EngineConfig::new().with_include_suppressed(true),
    );
    let report = engine.run_round(&FixedDecider::low_to_high()).unwrap();
    assert_eq!(report.suppressed, 0);
    assert_eq!(report.synced(), 1);
}

#[test]
fn deletes_propagate_only_when_configured() {
    let pair = SnapshotPair::high_only([job(7, "done")]);

    let engine = engine_for(pair.clone(), EngineConfig::default());
    let report = engine.run_round(&FixedDecider::low_to_high()).unwrap();
    assert!(report.high.delete.is_empty());
    assert!(report.is_noop());

    let engine = engine_for(pair, EngineConfig::new().with_propagate_deletes(true));
    let report = engine.run_round(&FixedDecider::low_to_high()).unwrap();
    assert_eq!(report.high.delete, vec![job(7, "done")]);
}

#[test]
fn batches_are_decided_in_review_order() {
    let low = request_tree_builder(low_node(), "running")
        .object(code_status(10, &[("low", "APPROVED")]))
        .object(log(11, "hello"))
        .depends(uid(10), uid(CODE))
        .build();
    let engine = engine_for(
        SnapshotPair::new(low, Snapshot::empty(high_node())),
        EngineConfig::default(),
    );

    let seen = Mutex::new(Vec::new());
    let decider = |batch: &DiffBatch| {
        seen.lock().push(batch.root_id());
        SyncDecision::LowToHigh
    };
    let report = engine.run_round(&decider).unwrap();

    // CodeStatus and Request share the code entity; the CodeStatus batch
    // claims it and is reviewed first. The log has no code owner.
    let seen: Vec<Uid> = seen.into_inner();
    assert_eq!(seen, vec![uid(10), uid(REQUEST), uid(11)]);
    assert_eq!(report.high.create.len(), 6);
}

#[test]
fn max_batches_caps_a_round() {
    let pair = SnapshotPair::low_only([job(1, "a"), job(2, "b"), job(3, "c")]);
    let engine = engine_for(pair, EngineConfig::new().with_max_batches(2));
    let report = engine.run_round(&FixedDecider::low_to_high()).unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.high.create.len(), 2);
}

#[test]
fn persist_failure_fails_the_round() {
    let engine = engine_for(
        SnapshotPair::low_only([job(1, "done")]),
        EngineConfig::default(),
    );
    engine.sink().fail_with("read-only store");

    let err = engine.run_round(&FixedDecider::low_to_high()).unwrap_err();
    assert!(matches!(err, EngineError::Persist(_)));
    assert!(err.is_retryable());
    assert_eq!(engine.state(), ReconcileState::Error);

    engine.sink().clear_failure();
    let report = engine.run_round(&FixedDecider::low_to_high()).unwrap();
    assert_eq!(report.acks.len(), 1);
    assert_eq!(engine.stats().rounds_completed, 1);
    assert_eq!(engine.stats().rounds_failed, 1);
}

#[test]
fn grant_only_changes_are_synced() {
    let grant = PermissionGrant::read(uid(JOB), "alice");
    let low = Snapshot::builder(low_node())
        .object(job(JOB, "done"))
        .grant(grant.clone())
        .build();
    let high = Snapshot::builder(high_node()).object(job(JOB, "done")).build();
    let engine = engine_for(SnapshotPair::new(low, high), EngineConfig::default());

    let report = engine.run_round(&FixedDecider::low_to_high()).unwrap();
    assert_eq!(report.unchanged, 0);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.high.new_permissions, vec![grant]);
    assert!(report.high.update.is_empty());
    assert_eq!(engine.sink().persisted().len(), 1);
}

//! Resolve command implementation.

use super::diff::{batch_report, print_batch, BatchReport};
use super::document::load_snapshot;
use super::{DecisionArg, OutputFormat};
use serde::Serialize;
use std::path::Path;
use tandem_core::{
    compute_diff, Entity, PolicyRegistry, ResolveOptions, ResolvedState, Resolver, Side,
    Snapshot, SyncDecision,
};

/// Resolve result for output.
#[derive(Debug, Serialize)]
pub struct ResolveReport {
    /// Applied decision.
    pub decision: SyncDecision,
    /// Batches the decision was applied to.
    pub batches: Vec<BatchReport>,
    /// Batches hidden by a matching ignore record.
    pub suppressed_batches: usize,
    /// Changes for the low side.
    pub low: ResolvedState,
    /// Changes for the high side.
    pub high: ResolvedState,
}

impl ResolveReport {
    fn receiving(&self) -> &ResolvedState {
        match self.decision.source() {
            Some(Side::High) => &self.low,
            _ => &self.high,
        }
    }
}

/// Runs the resolve command.
pub fn run(
    low: &Path,
    high: &Path,
    decision: DecisionArg,
    propagate_deletes: bool,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let low = load_snapshot(low)?;
    let high = load_snapshot(high)?;
    let options = ResolveOptions::new().with_propagate_deletes(propagate_deletes);
    let report = resolve_all(
        &low,
        &high,
        &PolicyRegistry::standard(),
        decision.into(),
        options,
    )?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text_output(&report),
    }

    Ok(())
}

/// Applies `decision` to every changed, unsuppressed batch.
pub fn resolve_all(
    low: &Snapshot,
    high: &Snapshot,
    registry: &PolicyRegistry,
    decision: SyncDecision,
    options: ResolveOptions,
) -> Result<ResolveReport, Box<dyn std::error::Error>> {
    let resolver = Resolver::new(registry).with_options(options);
    let mut low_state = ResolvedState::new(Side::Low);
    let mut high_state = ResolvedState::new(Side::High);
    let mut batches = Vec::new();
    let mut suppressed_batches = 0;

    for batch in compute_diff(low, high, registry)? {
        if low.is_ignored(&batch) || high.is_ignored(&batch) {
            suppressed_batches += 1;
            continue;
        }
        if batch.is_unchanged() {
            continue;
        }
        let (next_low, next_high) = resolver.resolve(&batch, decision, &low_state, &high_state)?;
        low_state = next_low;
        high_state = next_high;
        batches.push(batch_report(&batch));
    }

    tracing::info!(
        %decision,
        batches = batches.len(),
        low_changes = low_state.change_count(),
        high_changes = high_state.change_count(),
        "resolved snapshots"
    );

    Ok(ResolveReport {
        decision,
        batches,
        suppressed_batches,
        low: low_state,
        high: high_state,
    })
}

fn print_text_output(report: &ResolveReport) {
    println!("Decision: {}", report.decision);
    println!(
        "Batches: {} ({} suppressed)",
        report.batches.len(),
        report.suppressed_batches
    );
    for batch in &report.batches {
        println!();
        print_batch(batch);
    }

    let state = report.receiving();
    println!();
    println!("Changes for {} side:", state.alias);
    print_entities("create", &state.create);
    print_entities("update", &state.update);
    print_entities("delete", &state.delete);
    for grant in &state.new_permissions {
        println!("  grant  {grant}");
    }
    if state.is_empty() {
        println!("  (none)");
    }
}

fn print_entities(action: &str, entities: &[Entity]) {
    for entity in entities {
        println!("  {action:<6} {} {}", entity.kind, entity.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tandem_core::{EntityKind, NodeIdentity, PermissionGrant, Uid};
    use tempfile::NamedTempFile;

    fn uid(n: u128) -> Uid {
        Uid::from_u128(n)
    }

    fn job(n: u128, status: &str) -> Entity {
        Entity::new(uid(n), EntityKind::Job).with_attr("status", status)
    }

    fn snapshot(name: &str, objects: Vec<Entity>) -> Snapshot {
        Snapshot::builder(NodeIdentity::new(name))
            .objects(objects)
            .build()
    }

    #[test]
    fn resolves_toward_the_receiving_side() {
        let low = snapshot("low", vec![job(1, "done"), job(2, "running")]);
        let high = snapshot("high", vec![job(2, "failed"), job(3, "queued")]);
        let registry = PolicyRegistry::standard();

        let report = resolve_all(
            &low,
            &high,
            &registry,
            SyncDecision::LowToHigh,
            ResolveOptions::default(),
        )
        .unwrap();

        assert_eq!(report.batches.len(), 3);
        assert!(report.low.is_empty());
        assert_eq!(report.high.create, vec![job(1, "done")]);
        assert_eq!(report.high.update, vec![job(2, "running")]);
        assert!(report.high.delete.is_empty());
        assert_eq!(report.receiving().alias, Side::High);
    }

    #[test]
    fn propagates_deletes_on_request() {
        let low = snapshot("low", vec![]);
        let high = snapshot("high", vec![job(3, "queued")]);
        let options = ResolveOptions::new().with_propagate_deletes(true);

        let report = resolve_all(
            &low,
            &high,
            &PolicyRegistry::standard(),
            SyncDecision::LowToHigh,
            options,
        )
        .unwrap();
        assert_eq!(report.high.delete, vec![job(3, "queued")]);

        let report = resolve_all(
            &low,
            &high,
            &PolicyRegistry::standard(),
            SyncDecision::HighToLow,
            options,
        )
        .unwrap();
        assert_eq!(report.low.create, vec![job(3, "queued")]);
        assert_eq!(report.receiving().alias, Side::Low);
    }

    #[test]
    fn grant_only_changes_reach_the_receiving_side() {
        let grant = PermissionGrant::read(uid(4), "alice");
        let low = snapshot("low", vec![job(4, "done")]);
        let high = Snapshot::builder(NodeIdentity::new("high"))
            .object(job(4, "done"))
            .grant(grant.clone())
            .build();

        let report = resolve_all(
            &low,
            &high,
            &PolicyRegistry::standard(),
            SyncDecision::HighToLow,
            ResolveOptions::default(),
        )
        .unwrap();
        assert_eq!(report.batches.len(), 1);
        assert_eq!(report.low.new_permissions, vec![grant]);
        assert!(report.low.update.is_empty());
        assert!(report.high.is_empty());
    }

    #[test]
    fn run_reads_documents_from_disk() {
        let mut low = NamedTempFile::new().unwrap();
        low.write_all(br#"{"objects": [{"id": "00000000-0000-0000-0000-000000000001", "kind": "log"}]}"#)
            .unwrap();
        let mut high = NamedTempFile::new().unwrap();
        high.write_all(b"{}").unwrap();

        run(
            low.path(),
            high.path(),
            DecisionArg::LowToHigh,
            false,
            OutputFormat::Json,
        )
        .unwrap();
    }
}

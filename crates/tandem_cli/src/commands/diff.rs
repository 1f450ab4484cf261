//! Diff command implementation.

use super::document::load_snapshot;
use super::OutputFormat;
use serde::Serialize;
use std::path::Path;
use tandem_core::{compute_diff, DiffBatch, DiffStatus, EntityKind, PolicyRegistry, Snapshot};

/// Diff result for output.
#[derive(Debug, Serialize)]
pub struct DiffReport {
    /// Low side node name.
    pub low: String,
    /// High side node name.
    pub high: String,
    /// Total batch count, including hidden ones.
    pub total_batches: usize,
    /// Batches hidden because nothing changed.
    pub unchanged_batches: usize,
    /// Batches hidden by an ignore record whose fingerprint still matches.
    pub suppressed_batches: usize,
    /// Reported batches, in review order.
    pub batches: Vec<BatchReport>,
}

/// One batch in a [`DiffReport`].
#[derive(Debug, Serialize)]
pub struct BatchReport {
    /// Root identity.
    pub root: String,
    /// Root kind.
    pub kind: EntityKind,
    /// Batch fingerprint, hex encoded.
    pub fingerprint: String,
    /// Code entity the batch is grouped under.
    pub code_owner: Option<String>,
    /// Members in traversal order.
    pub members: Vec<MemberReport>,
}

/// One member of a [`BatchReport`].
#[derive(Debug, Serialize)]
pub struct MemberReport {
    /// Member identity.
    pub id: String,
    /// Member kind.
    pub kind: EntityKind,
    /// Distance from the root.
    pub level: usize,
    /// Diff status.
    pub status: DiffStatus,
    /// Side holding the object when it is new.
    pub new_on: Option<String>,
    /// Names of attributes that differ.
    pub changed: Vec<String>,
}

/// Runs the diff command.
pub fn run(
    low: &Path,
    high: &Path,
    all: bool,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let low = load_snapshot(low)?;
    let high = load_snapshot(high)?;
    let report = build_report(&low, &high, &PolicyRegistry::standard(), all)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text_output(&report),
    }

    Ok(())
}

/// Diffs two snapshots into a report.
pub fn build_report(
    low: &Snapshot,
    high: &Snapshot,
    registry: &PolicyRegistry,
    all: bool,
) -> Result<DiffReport, Box<dyn std::error::Error>> {
    let batches = compute_diff(low, high, registry)?;

    let mut report = DiffReport {
        low: low.node().name.clone(),
        high: high.node().name.clone(),
        total_batches: batches.len(),
        unchanged_batches: 0,
        suppressed_batches: 0,
        batches: Vec::new(),
    };

    for batch in &batches {
        if low.is_ignored(batch) || high.is_ignored(batch) {
            report.suppressed_batches += 1;
            if !all {
                continue;
            }
        } else if batch.is_unchanged() {
            report.unchanged_batches += 1;
            if !all {
                continue;
            }
        }
        report.batches.push(batch_report(batch));
    }

    Ok(report)
}

pub(crate) fn batch_report(batch: &DiffBatch) -> BatchReport {
    let members = batch
        .iter()
        .map(|(diff, level)| MemberReport {
            id: diff.id().to_string(),
            kind: diff.kind(),
            level,
            status: diff.status(),
            new_on: diff.new_on().map(|side| side.to_string()),
            changed: diff
                .attr_diffs()
                .iter()
                .map(|attr| attr.attr_name().to_string())
                .collect(),
        })
        .collect();

    BatchReport {
        root: batch.root_id().to_string(),
        kind: batch.root_kind(),
        fingerprint: batch.fingerprint().to_string(),
        code_owner: batch.code_owner().map(|uid| uid.to_string()),
        members,
    }
}

fn print_text_output(report: &DiffReport) {
    println!("Diff {} <-> {}", report.low, report.high);
    println!(
        "Batches: {} ({} unchanged, {} suppressed)",
        report.total_batches, report.unchanged_batches, report.suppressed_batches
    );

    for batch in &report.batches {
        println!();
        print_batch(batch);
    }
}

pub(crate) fn print_batch(batch: &BatchReport) {
    println!("{} {} [{}]", batch.kind, batch.root, &batch.fingerprint[..12]);
    for member in &batch.members {
        let indent = "  ".repeat(member.level + 1);
        let mut line = format!("{indent}{} {} {}", member.status, member.kind, member.id);
        if let Some(side) = &member.new_on {
            line.push_str(&format!(" (only on {side})"));
        }
        if !member.changed.is_empty() {
            line.push_str(&format!(" changed: {}", member.changed.join(", ")));
        }
        println!("{line}");
    }
}

//! Deterministic review order for batches.

use crate::graph::DiffBatch;
use crate::policy::PolicyRegistry;
use crate::uid::Uid;
use std::collections::BTreeMap;

/// Orders batches for review.
///
/// Batches that reached a code entity are grouped by it, groups in code
/// uid order, and sorted within a group by `(root priority, root uid)`.
/// The owner need not be a member of the batch: a batch that reached
/// code already claimed by an earlier batch is still grouped under it.
/// Batches without a code owner follow, sorted by root uid. The result
/// does not depend on the input order.
pub fn order_batches(batches: Vec<DiffBatch>, registry: &PolicyRegistry) -> Vec<DiffBatch> {
    let total = batches.len();
    let mut groups: BTreeMap<Uid, Vec<DiffBatch>> = BTreeMap::new();
    let mut ungrouped = Vec::new();

    for batch in batches {
        match batch.code_owner() {
            Some(code) => groups.entry(code).or_default().push(batch),
            None => ungrouped.push(batch),
        }
    }

    let mut ordered = Vec::with_capacity(total);
    for (_, mut group) in groups {
        group.sort_by_key(|batch| group_key(batch, registry));
        ordered.extend(group);
    }
    ungrouped.sort_by_key(DiffBatch::root_id);
    ordered.extend(ungrouped);
    ordered
}

fn group_key(batch: &DiffBatch, registry: &PolicyRegistry) -> (usize, Uid) {
    let priority = registry
        .root_priority(batch.root_kind())
        .unwrap_or(usize::MAX);
    (priority, batch.root_id())
}

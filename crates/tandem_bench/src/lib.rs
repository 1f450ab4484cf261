//! Synthetic workloads for the Tandem benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tandem_core::{Entity, EntityKind, NodeIdentity, Snapshot, SnapshotBuilder, Uid, Value};

const JOB_STATUSES: [&str; 4] = ["created", "processing", "completed", "errored"];

/// A pair of snapshots sharing a forest of request trees.
pub struct Workload {
    /// Low side snapshot.
    pub low: Snapshot,
    /// High side snapshot.
    pub high: Snapshot,
}

/// Builds `requests` request trees on both sides.
///
/// Each tree is a request, its code, a code status, a job, a log and an
/// output, six objects in all. Roughly `diverged` of the jobs get a
/// different status on the high side and `high_only` of the trees exist
/// only there. Every fifth tree shares its code with the previous one.
pub fn request_forest(requests: usize, diverged: f64, high_only: f64, seed: u64) -> Workload {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut low = Snapshot::builder(NodeIdentity::with_uid(Uid::from_u128(1 << 64), "low"));
    let mut high = Snapshot::builder(NodeIdentity::with_uid(Uid::from_u128(2 << 64), "high"));

    for tree in 0..requests {
        let base = (tree as u128 + 1) * 16;
        let code = if tree % 5 == 4 { base - 16 + 1 } else { base + 1 };
        let status = JOB_STATUSES[rng.gen_range(0..JOB_STATUSES.len())];
        let high_status = if rng.gen_bool(diverged) {
            JOB_STATUSES[rng.gen_range(0..JOB_STATUSES.len())]
        } else {
            status
        };

        high = add_tree(high, base, code, high_status);
        if !rng.gen_bool(high_only) {
            low = add_tree(low, base, code, status);
        }
    }

    Workload {
        low: low.build(),
        high: high.build(),
    }
}

fn add_tree(builder: SnapshotBuilder, base: u128, code: u128, job_status: &str) -> SnapshotBuilder {
    let id = |offset: u128| Uid::from_u128(base + offset);
    let code_id = Uid::from_u128(code);

    builder
        .object(
            Entity::new(id(0), EntityKind::Request)
                .with_attr("status", "PENDING")
                .with_attr("requesting_user", "bench@example.org"),
        )
        .object(
            Entity::new(code_id, EntityKind::Code)
                .with_attr("func_name", format!("compute_{code}"))
                .with_attr("raw_code", "def compute(): pass"),
        )
        .object(Entity::new(id(2), EntityKind::CodeStatus).with_attr(
            "status_dict",
            Value::Map(
                [("low".to_string(), "APPROVED".into()), ("high".to_string(), "PENDING".into())]
                    .into_iter()
                    .collect(),
            ),
        ))
        .object(Entity::new(id(3), EntityKind::Job).with_attr("status", job_status))
        .object(Entity::new(id(4), EntityKind::Log).with_attr("stdout", "ok"))
        .object(Entity::new(id(5), EntityKind::Output).with_attr("job_id", id(3)))
        .depends(id(0), code_id)
        .depends(id(2), code_id)
        .depends(code_id, id(3))
        .depends(id(3), id(4))
        .depends(id(5), id(3))
}

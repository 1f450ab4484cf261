//! Entity and snapshot fixtures.
//!
//! Every fixture uses fixed identities from [`uid`], so tests can refer to
//! objects by number.

use tandem_core::{Entity, EntityKind, NodeIdentity, Snapshot, SnapshotBuilder, Uid, Value};

/// Identity of the review request in [`request_tree`].
pub const REQUEST: u128 = 1;
/// Identity of the code submission in [`request_tree`].
pub const CODE: u128 = 2;
/// Identity of the first job in [`request_tree`].
pub const JOB: u128 = 3;
/// Identity of the second job in [`request_tree`].
pub const JOB2: u128 = 4;

/// Deterministic identity for test object `n`.
pub fn uid(n: u128) -> Uid {
    Uid::from_u128(n)
}

/// The low side node.
pub fn low_node() -> NodeIdentity {
    NodeIdentity::with_uid(uid(0x10_0000), "low")
}

/// The high side node.
pub fn high_node() -> NodeIdentity {
    NodeIdentity::with_uid(uid(0x20_0000), "high")
}

/// A request with the given status and no changes.
pub fn request(n: u128, status: &str) -> Entity {
    Entity::new(uid(n), EntityKind::Request)
        .with_attr("requesting_user", "alice@low")
        .with_attr("status", status)
        .with_attr("changes", Value::List(Vec::new()))
}

/// A code submission.
pub fn code(n: u128, func_name: &str) -> Entity {
    Entity::new(uid(n), EntityKind::Code)
        .with_attr("func_name", func_name)
        .with_attr("raw_code", format!("def {func_name}(): pass"))
}

/// A code status map from party name to status.
pub fn code_status(n: u128, parties: &[(&str, &str)]) -> Entity {
    Entity::new(uid(n), EntityKind::CodeStatus)
        .with_attr("status_dict", Value::map(parties.iter().copied()))
}

/// A job with the given status.
pub fn job(n: u128, status: &str) -> Entity {
    Entity::new(uid(n), EntityKind::Job).with_attr("status", status)
}

/// A log with the given stdout.
pub fn log(n: u128, stdout: &str) -> Entity {
    Entity::new(uid(n), EntityKind::Log)
        .with_attr("stdout", stdout)
        .with_attr("stderr", "")
}

/// An output produced by `job_id`.
pub fn output(n: u128, job_id: u128) -> Entity {
    Entity::new(uid(n), EntityKind::Output).with_attr("job_id", uid(job_id))
}

/// A generic action result.
pub fn action_result(n: u128, payload: impl Into<Value>) -> Entity {
    Entity::new(uid(n), EntityKind::ActionResult).with_attr("payload", payload)
}

/// `Request → Code → [Job, Job2]` on the low node, with the first job at
/// `job_status`.
pub fn request_tree(job_status: &str) -> Snapshot {
    request_tree_on(low_node(), job_status)
}

/// [`request_tree`] on an explicit node.
pub fn request_tree_on(node: NodeIdentity, job_status: &str) -> Snapshot {
    request_tree_builder(node, job_status).build()
}

/// Builder for [`request_tree_on`], for adding grants or ignore records.
pub fn request_tree_builder(node: NodeIdentity, job_status: &str) -> SnapshotBuilder {
    Snapshot::builder(node)
        .object(request(REQUEST, "PENDING"))
        .object(code(CODE, "train"))
        .object(job(JOB, job_status))
        .object(job(JOB2, "queued"))
        .depends(uid(REQUEST), uid(CODE))
        .depends_all(uid(CODE), [uid(JOB), uid(JOB2)])
}

/// Two snapshots to diff against each other.
#[derive(Debug, Clone)]
pub struct SnapshotPair {
    /// Low side.
    pub low: Snapshot,
    /// High side.
    pub high: Snapshot,
}

impl SnapshotPair {
    /// Wraps two snapshots.
    pub fn new(low: Snapshot, high: Snapshot) -> Self {
        Self { low, high }
    }

    /// The same snapshot on both sides.
    pub fn identical(snapshot: Snapshot) -> Self {
        Self {
            low: snapshot.clone(),
            high: snapshot,
        }
    }

    /// An empty low side and a high side holding `entities`.
    pub fn high_only(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            low: Snapshot::empty(low_node()),
            high: Snapshot::builder(high_node()).objects(entities).build(),
        }
    }

    /// A low side holding `entities` and an empty high side.
    pub fn low_only(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            low: Snapshot::builder(low_node()).objects(entities).build(),
            high: Snapshot::empty(high_node()),
        }
    }

    /// The request tree on both sides, with the first job's status differing.
    pub fn diverged_job(low_status: &str, high_status: &str) -> Self {
        Self {
            low: request_tree_on(low_node(), low_status),
            high: request_tree_on(high_node(), high_status),
        }
    }
}

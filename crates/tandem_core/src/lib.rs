//! # Tandem Core
//!
//! Two-party state reconciliation for Tandem.
//!
//! This crate provides:
//! - `Snapshot` for immutable captures of one side's object graph
//! - `ObjectDiff` for per-identity comparison under type-specific equality
//! - `NodeDiff` and `build_batches` for dependency-aware batching
//! - `order_batches` for deterministic review order
//! - `Resolver` for turning a decision into per-side create/update/delete lists
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Usage
//!
//! ```
//! use tandem_core::{
//!     compute_diff, objects_needing_sync, Entity, EntityKind, NodeIdentity, PolicyRegistry,
//!     Snapshot, Uid,
//! };
//!
//! let registry = PolicyRegistry::standard();
//! let request = Entity::new(Uid::from_u128(1), EntityKind::Request);
//!
//! let low = Snapshot::empty(NodeIdentity::new("low"));
//! let high = Snapshot::builder(NodeIdentity::new("high"))
//!     .object(request.clone())
//!     .build();
//!
//! let batches = compute_diff(&low, &high, &registry).unwrap();
//! assert_eq!(batches.len(), 1);
//! assert_eq!(objects_needing_sync(&batches), vec![request]);
//! ```
//!
//! ## Key Invariants
//!
//! - Snapshots are never mutated after construction
//! - Diff status is derived, never stored
//! - A batch never contains the same identity twice
//! - Batch construction terminates on cyclic dependency maps
//! - Resolution is idempotent

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod diff;
mod entity;
mod error;
mod graph;
mod ordering;
mod policy;
mod resolve;
mod snapshot;
mod uid;
mod value;

pub use diff::{compare_entities, AttrDiff, DiffStatus, ListDiff, ObjectDiff, Side, OBJECT_ATTR};
pub use entity::{Entity, EntityKind, Permission, PermissionGrant};
pub use error::{DiffError, DiffResult, PersistError, RegistryError};
pub use graph::{build_batches, BatchFingerprint, DiffBatch, NodeDiff};
pub use ordering::order_batches;
pub use policy::{Comparator, EqualityPolicy, PolicyRegistry, PolicyRegistryBuilder};
pub use resolve::{ResolveOptions, ResolvedState, Resolver, SyncDecision};
pub use snapshot::{NodeIdentity, Snapshot, SnapshotBuilder};
pub use uid::{EntityId, LineageId, Uid};
pub use value::Value;

use std::collections::BTreeSet;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Diffs two snapshots and returns their batches in review order.
///
/// This is the single entry point for callers that want the whole
/// pipeline: per-identity diffs, batch construction and ordering.
pub fn compute_diff(
    low: &Snapshot,
    high: &Snapshot,
    registry: &PolicyRegistry,
) -> DiffResult<Vec<DiffBatch>> {
    let node_diff = NodeDiff::from_snapshots(low, high, registry)?;
    let batches = build_batches(&node_diff, registry)?;
    Ok(order_batches(batches, registry))
}

/// Returns every NEW entity across `batches`, once each, in batch order.
pub fn objects_needing_sync(batches: &[DiffBatch]) -> Vec<Entity> {
    let mut seen = BTreeSet::new();
    batches
        .iter()
        .flat_map(|batch| batch.diffs())
        .filter_map(ObjectDiff::new_entity)
        .filter(|entity| seen.insert(entity.uid()))
        .cloned()
        .collect()
}

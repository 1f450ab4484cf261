//! Immutable captures of one side's object graph.

use crate::diff::{DiffStatus, ObjectDiff};
use crate::entity::{Entity, PermissionGrant};
use crate::error::DiffResult;
use crate::graph::{BatchFingerprint, DiffBatch, NodeDiff};
use crate::policy::PolicyRegistry;
use crate::uid::Uid;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

static NO_GRANTS: BTreeSet<PermissionGrant> = BTreeSet::new();

/// The node a snapshot was taken on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Node identity.
    pub uid: Uid,
    /// Display name.
    pub name: String,
}

impl NodeIdentity {
    /// Creates a node identity with a random uid.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_uid(Uid::random(), name)
    }

    /// Creates a node identity with a fixed uid.
    pub fn with_uid(uid: Uid, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
        }
    }
}

/// An immutable capture of one side's objects, dependencies and permissions.
///
/// Only [`SnapshotBuilder`] creates snapshots, so every child listed in
/// `dependencies` is guaranteed to be a key of `objects`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    node: NodeIdentity,
    objects: BTreeMap<Uid, Entity>,
    dependencies: BTreeMap<Uid, Vec<Uid>>,
    permissions: BTreeMap<Uid, BTreeSet<PermissionGrant>>,
    ignored_batches: BTreeMap<Uid, BatchFingerprint>,
    previous: Option<Arc<Snapshot>>,
}

impl Snapshot {
    /// Starts a builder for a snapshot of `node`.
    pub fn builder(node: NodeIdentity) -> SnapshotBuilder {
        SnapshotBuilder::new(node)
    }

    /// An empty snapshot.
    pub fn empty(node: NodeIdentity) -> Self {
        SnapshotBuilder::new(node).build()
    }

    /// Starts a builder for the next snapshot of the same node, linked to this one.
    pub fn successor(self: &Arc<Self>) -> SnapshotBuilder {
        SnapshotBuilder::new(self.node.clone()).previous(Arc::clone(self))
    }

    /// The node this snapshot was taken on.
    pub fn node(&self) -> &NodeIdentity {
        &self.node
    }

    /// All objects, keyed by base identity.
    pub fn objects(&self) -> &BTreeMap<Uid, Entity> {
        &self.objects
    }

    /// Looks up an object.
    pub fn get(&self, uid: &Uid) -> Option<&Entity> {
        self.objects.get(uid)
    }

    /// Returns true if the snapshot holds `uid`.
    pub fn contains(&self, uid: &Uid) -> bool {
        self.objects.contains_key(uid)
    }

    /// Object identities in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = Uid> + '_ {
        self.objects.keys().copied()
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the snapshot holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Parent → children adjacency map.
    pub fn dependencies(&self) -> &BTreeMap<Uid, Vec<Uid>> {
        &self.dependencies
    }

    /// Children of `uid` (empty if none).
    pub fn children(&self, uid: &Uid) -> &[Uid] {
        self.dependencies
            .get(uid)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Permission grants held on `uid`.
    pub fn permissions(&self, uid: &Uid) -> &BTreeSet<PermissionGrant> {
        self.permissions.get(uid).unwrap_or(&NO_GRANTS)
    }

    /// Batches this side has durably ignored, keyed by root.
    pub fn ignored_batches(&self) -> &BTreeMap<Uid, BatchFingerprint> {
        &self.ignored_batches
    }

    /// Returns true if `batch` was ignored and has not changed since.
    pub fn is_ignored(&self, batch: &DiffBatch) -> bool {
        self.ignored_batches
            .get(&batch.root_id())
            .is_some_and(|fingerprint| *fingerprint == batch.fingerprint())
    }

    /// The snapshot this one succeeded, if any.
    pub fn previous(&self) -> Option<&Arc<Snapshot>> {
        self.previous.as_ref()
    }

    /// Diffs the predecessor (low) against this snapshot (high).
    ///
    /// With no predecessor every object is NEW.
    pub fn previous_diff(&self, registry: &PolicyRegistry) -> DiffResult<NodeDiff> {
        match &self.previous {
            Some(previous) => NodeDiff::from_snapshots(previous, self, registry),
            None => NodeDiff::from_snapshots(&Snapshot::empty(self.node.clone()), self, registry),
        }
    }

    /// Status of `uid` relative to the predecessor, if this snapshot holds it.
    ///
    /// Only `uid` is diffed, so other objects cannot fail the call.
    pub fn status_since_previous(
        &self,
        uid: &Uid,
        registry: &PolicyRegistry,
    ) -> DiffResult<Option<DiffStatus>> {
        let Some(current) = self.get(uid) else {
            return Ok(None);
        };
        let (before, before_permissions) = match &self.previous {
            Some(previous) => (previous.get(uid).cloned(), previous.permissions(uid).clone()),
            None => (None, BTreeSet::new()),
        };
        let diff = ObjectDiff::new(
            *uid,
            before,
            Some(current.clone()),
            before_permissions,
            self.permissions(uid).clone(),
            registry,
        )?;
        Ok(Some(diff.status()))
    }
}

/// Builder for [`Snapshot`].
///
/// Dependencies are recomputed on [`build`](Self::build): edges whose
/// parent or child is not among the objects are dropped, as are
/// self-edges and repeated children.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    node: NodeIdentity,
    objects: BTreeMap<Uid, Entity>,
    edges: Vec<(Uid, Uid)>,
    grants: Vec<PermissionGrant>,
    ignored_batches: BTreeMap<Uid, BatchFingerprint>,
    previous: Option<Arc<Snapshot>>,
}

impl SnapshotBuilder {
    /// Creates a builder for `node`.
    pub fn new(node: NodeIdentity) -> Self {
        Self {
            node,
            objects: BTreeMap::new(),
            edges: Vec::new(),
            grants: Vec::new(),
            ignored_batches: BTreeMap::new(),
            previous: None,
        }
    }

    /// Adds an object; a later object with the same base identity replaces it.
    #[must_use]
    pub fn object(mut self, entity: Entity) -> Self {
        self.objects.insert(entity.uid(), entity);
        self
    }

    /// Adds several objects.
    #[must_use]
    pub fn objects(mut self, entities: impl IntoIterator<Item = Entity>) -> Self {
        for entity in entities {
            self.objects.insert(entity.uid(), entity);
        }
        self
    }

    /// Declares that `parent` depends on `child`.
    #[must_use]
    pub fn depends(mut self, parent: Uid, child: Uid) -> Self {
        self.edges.push((parent, child));
        self
    }

    /// Declares several children of `parent`, in order.
    #[must_use]
    pub fn depends_all(mut self, parent: Uid, children: impl IntoIterator<Item = Uid>) -> Self {
        self.edges
            .extend(children.into_iter().map(|child| (parent, child)));
        self
    }

    /// Adds a permission grant.
    #[must_use]
    pub fn grant(mut self, grant: PermissionGrant) -> Self {
        self.grants.push(grant);
        self
    }

    /// Records a batch as durably ignored.
    #[must_use]
    pub fn ignore(mut self, root: Uid, fingerprint: BatchFingerprint) -> Self {
        self.ignored_batches.insert(root, fingerprint);
        self
    }

    /// Links the predecessor snapshot.
    #[must_use]
    pub fn previous(mut self, previous: Arc<Snapshot>) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Normalizes dependencies and permissions and builds the snapshot.
    pub fn build(self) -> Snapshot {
        let mut dependencies: BTreeMap<Uid, Vec<Uid>> = BTreeMap::new();
        let mut dropped = 0usize;

        for (parent, child) in self.edges {
            if parent == child {
                continue;
            }
            if !self.objects.contains_key(&parent) || !self.objects.contains_key(&child) {
                dropped += 1;
                continue;
            }
            let children = dependencies.entry(parent).or_default();
            if !children.contains(&child) {
                children.push(child);
            }
        }

        let mut permissions: BTreeMap<Uid, BTreeSet<PermissionGrant>> = BTreeMap::new();
        for grant in self.grants {
            if self.objects.contains_key(&grant.uid) {
                permissions.entry(grant.uid).or_default().insert(grant);
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            debug!(
                node = %self.node.name,
                dropped,
                "dropped edges and grants referencing unknown objects"
            );
        }

        Snapshot {
            node: self.node,
            objects: self.objects,
            dependencies,
            permissions,
            ignored_batches: self.ignored_batches,
            previous: self.previous,
        }
    }
}

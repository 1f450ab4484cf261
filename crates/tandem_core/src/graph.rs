//! Dependency-aware batching of per-identity diffs.
//!
//! A [`NodeDiff`] holds one [`ObjectDiff`] per identity found on either
//! side, plus the union of both sides' dependency maps. [`build_batches`]
//! turns it into a forest of [`DiffBatch`]es, each a depth-first walk from
//! one root.
//!
//! The walk uses an explicit worklist rather than recursion, and an
//! identity is emitted at most once per build, so cyclic or heavily shared
//! graphs always terminate.

use crate::diff::{DiffStatus, ObjectDiff, Side};
use crate::entity::{Entity, EntityKind};
use crate::error::{DiffError, DiffResult};
use crate::policy::PolicyRegistry;
use crate::snapshot::Snapshot;
use crate::uid::Uid;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

/// Content hash of a batch, used to remember ignore decisions.
///
/// Any change to a member's status, level, kind, version or attributes
/// changes the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchFingerprint([u8; 32]);

impl BatchFingerprint {
    /// Wraps raw digest bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BatchFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Per-identity diffs of two snapshots plus their union dependency map.
#[derive(Debug, Clone)]
pub struct NodeDiff {
    diffs: BTreeMap<Uid, ObjectDiff>,
    dependencies: BTreeMap<Uid, Vec<Uid>>,
    dangling: Vec<DiffError>,
    low_ignored: BTreeMap<Uid, BatchFingerprint>,
    high_ignored: BTreeMap<Uid, BatchFingerprint>,
}

impl NodeDiff {
    /// Diffs every identity held by either snapshot.
    ///
    /// Children are merged low side first, keeping first-seen order.
    pub fn from_snapshots(
        low: &Snapshot,
        high: &Snapshot,
        registry: &PolicyRegistry,
    ) -> DiffResult<Self> {
        let ids: BTreeSet<Uid> = low.ids().chain(high.ids()).collect();
        let diffs = ids
            .into_iter()
            .map(|id| ObjectDiff::from_snapshots(id, low, high, registry).map(|diff| (id, diff)))
            .collect::<DiffResult<BTreeMap<_, _>>>()?;

        let mut dependencies: BTreeMap<Uid, Vec<Uid>> = BTreeMap::new();
        for (parent, children) in low.dependencies().iter().chain(high.dependencies()) {
            let merged = dependencies.entry(*parent).or_default();
            for child in children {
                if !merged.contains(child) {
                    merged.push(*child);
                }
            }
        }

        debug!(
            low = %low.node().name,
            high = %high.node().name,
            diffs = diffs.len(),
            "diffed snapshots"
        );

        Ok(Self {
            diffs,
            dependencies,
            dangling: Vec::new(),
            low_ignored: low.ignored_batches().clone(),
            high_ignored: high.ignored_batches().clone(),
        })
    }

    /// Builds a node diff from precomputed diffs and an external dependency map.
    ///
    /// Edges whose parent or child has no diff are dropped and kept as
    /// [`DiffError::DanglingDependency`] values, see [`dangling`](Self::dangling).
    /// Self-edges and repeated children are dropped silently.
    pub fn from_parts(
        diffs: impl IntoIterator<Item = ObjectDiff>,
        dependencies: BTreeMap<Uid, Vec<Uid>>,
    ) -> Self {
        let diffs: BTreeMap<Uid, ObjectDiff> =
            diffs.into_iter().map(|diff| (diff.id(), diff)).collect();

        let mut kept: BTreeMap<Uid, Vec<Uid>> = BTreeMap::new();
        let mut dangling = Vec::new();
        for (parent, children) in dependencies {
            for child in children {
                if parent == child {
                    continue;
                }
                if !diffs.contains_key(&parent) || !diffs.contains_key(&child) {
                    warn!(%parent, %child, "dropping dangling dependency");
                    dangling.push(DiffError::dangling(parent, child));
                    continue;
                }
                let entry = kept.entry(parent).or_default();
                if !entry.contains(&child) {
                    entry.push(child);
                }
            }
        }

        Self {
            diffs,
            dependencies: kept,
            dangling,
            low_ignored: BTreeMap::new(),
            high_ignored: BTreeMap::new(),
        }
    }

    /// Replaces the ignore records of one side.
    #[must_use]
    pub fn with_ignored(mut self, side: Side, ignored: BTreeMap<Uid, BatchFingerprint>) -> Self {
        match side {
            Side::Low => self.low_ignored = ignored,
            Side::High => self.high_ignored = ignored,
        }
        self
    }

    /// Edges dropped because an endpoint had no diff.
    pub fn dangling(&self) -> &[DiffError] {
        &self.dangling
    }

    /// Fails with the first dropped edge, if any.
    pub fn ensure_no_dangling(&self) -> DiffResult<()> {
        match self.dangling.first() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// All diffs, keyed by identity.
    pub fn diffs(&self) -> &BTreeMap<Uid, ObjectDiff> {
        &self.diffs
    }

    /// Looks up the diff of one identity.
    pub fn diff(&self, uid: &Uid) -> Option<&ObjectDiff> {
        self.diffs.get(uid)
    }

    /// Union dependency map.
    pub fn dependencies(&self) -> &BTreeMap<Uid, Vec<Uid>> {
        &self.dependencies
    }

    /// Children of `uid` in the union map.
    pub fn children(&self, uid: &Uid) -> &[Uid] {
        self.dependencies
            .get(uid)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Identities that are nobody's child, ascending.
    pub fn roots(&self) -> Vec<Uid> {
        let children: BTreeSet<&Uid> = self.dependencies.values().flatten().collect();
        self.diffs
            .keys()
            .filter(|uid| !children.contains(uid))
            .copied()
            .collect()
    }

    /// Ignore records of one side.
    pub fn ignored(&self, side: Side) -> &BTreeMap<Uid, BatchFingerprint> {
        match side {
            Side::Low => &self.low_ignored,
            Side::High => &self.high_ignored,
        }
    }

    /// Returns true if either side ignored `batch` and it has not changed since.
    pub fn is_suppressed(&self, batch: &DiffBatch) -> bool {
        let root = batch.root_id();
        let fingerprint = batch.fingerprint();
        [Side::Low, Side::High]
            .into_iter()
            .any(|side| self.ignored(side).get(&root) == Some(&fingerprint))
    }

    /// Number of diffs.
    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    /// Returns true if neither side holds any object.
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }
}

/// A depth-first slice of the diff forest, synced as one unit.
///
/// `diffs[0]` is the root. Every member is a key of `dependencies`
/// (restricted to members) and of `dependents` (its inverse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffBatch {
    diffs: Vec<ObjectDiff>,
    levels: Vec<usize>,
    dependencies: BTreeMap<Uid, Vec<Uid>>,
    dependents: BTreeMap<Uid, Vec<Uid>>,
    code_owner: Option<Uid>,
}

impl DiffBatch {
    fn assemble(
        diffs: Vec<ObjectDiff>,
        levels: Vec<usize>,
        graph: &BTreeMap<Uid, Vec<Uid>>,
        code_owner: Option<Uid>,
    ) -> Self {
        let root = diffs[0].id();
        let members: BTreeSet<Uid> = diffs.iter().map(ObjectDiff::id).collect();

        let mut dependencies = BTreeMap::new();
        let mut dependents: BTreeMap<Uid, Vec<Uid>> =
            members.iter().map(|uid| (*uid, Vec::new())).collect();

        for diff in &diffs {
            let parent = diff.id();
            let children: Vec<Uid> = graph
                .get(&parent)
                .into_iter()
                .flatten()
                .filter(|child| **child != root && members.contains(*child))
                .copied()
                .collect();
            for child in &children {
                if let Some(parents) = dependents.get_mut(child) {
                    parents.push(parent);
                }
            }
            dependencies.insert(parent, children);
        }

        Self {
            diffs,
            levels,
            dependencies,
            dependents,
            code_owner,
        }
    }

    /// The root diff.
    pub fn root(&self) -> &ObjectDiff {
        &self.diffs[0]
    }

    /// Identity of the root.
    pub fn root_id(&self) -> Uid {
        self.root().id()
    }

    /// Kind of the root.
    pub fn root_kind(&self) -> EntityKind {
        self.root().kind()
    }

    /// Members in depth-first order.
    pub fn diffs(&self) -> &[ObjectDiff] {
        &self.diffs
    }

    /// Depth of each member, parallel to [`diffs`](Self::diffs).
    pub fn levels(&self) -> &[usize] {
        &self.levels
    }

    /// Members paired with their depth.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectDiff, usize)> {
        self.diffs.iter().zip(self.levels.iter().copied())
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    /// Always false; batches hold at least their root.
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    /// Returns true if `uid` is a member.
    pub fn contains(&self, uid: &Uid) -> bool {
        self.dependencies.contains_key(uid)
    }

    /// Looks up a member's diff.
    pub fn get(&self, uid: &Uid) -> Option<&ObjectDiff> {
        self.diffs.iter().find(|diff| diff.id() == *uid)
    }

    /// Parent → children within the batch.
    pub fn dependencies(&self) -> &BTreeMap<Uid, Vec<Uid>> {
        &self.dependencies
    }

    /// Child → parents within the batch.
    pub fn dependents(&self) -> &BTreeMap<Uid, Vec<Uid>> {
        &self.dependents
    }

    /// Children of a member.
    pub fn dependencies_of(&self, uid: &Uid) -> &[Uid] {
        self.dependencies
            .get(uid)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Parents of a member.
    pub fn dependents_of(&self, uid: &Uid) -> &[Uid] {
        self.dependents
            .get(uid)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First code entity met while walking this batch, if any.
    pub fn code_owner(&self) -> Option<Uid> {
        self.code_owner
    }

    /// Returns true if every member is SAME and neither side holds a grant
    /// the other lacks.
    pub fn is_unchanged(&self) -> bool {
        self.diffs.iter().all(|diff| {
            diff.status() == DiffStatus::Same
                && diff.new_permissions(Side::Low).next().is_none()
                && diff.new_permissions(Side::High).next().is_none()
        })
    }

    /// Entities present on only one side.
    pub fn new_entities(&self) -> impl Iterator<Item = &Entity> {
        self.diffs.iter().filter_map(ObjectDiff::new_entity)
    }

    /// Content hash of the batch.
    pub fn fingerprint(&self) -> BatchFingerprint {
        let mut hasher = Sha256::new();
        for (diff, level) in self.iter() {
            hasher.update(diff.id().as_bytes());
            hasher.update([diff.status().to_code()]);
            hasher.update((level as u64).to_le_bytes());
            for side in [Side::Low, Side::High] {
                match diff.side(side) {
                    None => hasher.update([0u8]),
                    Some(entity) => {
                        hasher.update([1u8, entity.kind.index() as u8]);
                        hasher.update(entity.version.to_le_bytes());
                        hash_map(&mut hasher, &entity.attributes);
                    }
                }
            }
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        BatchFingerprint(bytes)
    }
}

fn hash_map(hasher: &mut Sha256, map: &BTreeMap<String, Value>) {
    hasher.update((map.len() as u64).to_le_bytes());
    for (key, value) in map {
        hash_text(hasher, key);
        hash_value(hasher, value);
    }
}

fn hash_text(hasher: &mut Sha256, text: &str) {
    hasher.update((text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}

fn hash_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update([0u8]),
        Value::Bool(b) => hasher.update([1u8, u8::from(*b)]),
        Value::Integer(i) => {
            hasher.update([2u8]);
            hasher.update(i.to_le_bytes());
        }
        Value::Text(s) => {
            hasher.update([3u8]);
            hash_text(hasher, s);
        }
        Value::List(items) => {
            hasher.update([4u8]);
            hasher.update((items.len() as u64).to_le_bytes());
            for item in items {
                hash_value(hasher, item);
            }
        }
        Value::Map(map) => {
            hasher.update([5u8]);
            hash_map(hasher, map);
        }
    }
}

struct Frame {
    uid: Uid,
    level: usize,
    visited: BTreeSet<Uid>,
}

/// Splits a node diff into batches.
///
/// Roots (identities nobody depends on) are expanded in `(root priority,
/// uid)` order, so higher-priority roots claim shared descendants first.
/// Identities left unreached afterwards can only sit on cycles; they are
/// expanded as extra roots in uid order.
///
/// Fails with [`DiffError::UnknownRootKind`] if a root's kind may not head
/// a batch.
pub fn build_batches(node_diff: &NodeDiff, registry: &PolicyRegistry) -> DiffResult<Vec<DiffBatch>> {
    let mut roots = Vec::new();
    for uid in node_diff.roots() {
        roots.push((root_priority(node_diff, registry, uid)?, uid));
    }
    roots.sort_unstable();

    let mut emitted = BTreeSet::new();
    let mut batches = Vec::with_capacity(roots.len());
    for (_, root) in roots {
        batches.push(expand(root, node_diff, &mut emitted));
    }

    let unreached: Vec<Uid> = node_diff
        .diffs()
        .keys()
        .filter(|uid| !emitted.contains(*uid))
        .copied()
        .collect();
    for root in unreached {
        if emitted.contains(&root) {
            continue;
        }
        root_priority(node_diff, registry, root)?;
        debug!(%root, "seeding batch from cycle");
        batches.push(expand(root, node_diff, &mut emitted));
    }

    debug!(
        batches = batches.len(),
        diffs = node_diff.len(),
        "built batches"
    );
    Ok(batches)
}

fn root_priority(node_diff: &NodeDiff, registry: &PolicyRegistry, uid: Uid) -> DiffResult<usize> {
    let kind = node_diff
        .diff(&uid)
        .map(ObjectDiff::kind)
        .ok_or(DiffError::invalid_diff(uid))?;
    registry
        .root_priority(kind)
        .ok_or(DiffError::unknown_root_kind(uid, kind))
}

fn expand(root: Uid, node_diff: &NodeDiff, emitted: &mut BTreeSet<Uid>) -> DiffBatch {
    let mut diffs = Vec::new();
    let mut levels = Vec::new();
    let mut code_owner = None;

    let mut stack = vec![Frame {
        uid: root,
        level: 0,
        visited: BTreeSet::new(),
    }];

    while let Some(frame) = stack.pop() {
        let Some(diff) = node_diff.diff(&frame.uid) else {
            continue;
        };
        if code_owner.is_none() && diff.kind().is_code() {
            code_owner = Some(frame.uid);
        }
        if !emitted.insert(frame.uid) {
            continue;
        }
        diffs.push(diff.clone());
        levels.push(frame.level);

        let mut visited = frame.visited;
        visited.insert(frame.uid);

        // Siblings are marked visited for each child, so a node reachable
        // both directly and through a sibling lands at the shallower level.
        let children = node_diff.children(&frame.uid);
        for child in children.iter().rev() {
            if visited.contains(child) {
                continue;
            }
            let mut seeded = visited.clone();
            seeded.extend(children.iter().filter(|c| *c != child).copied());
            stack.push(Frame {
                uid: *child,
                level: frame.level + 1,
                visited: seeded,
            });
        }
    }

    DiffBatch::assemble(diffs, levels, node_diff.dependencies(), code_owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PermissionGrant;
    use crate::snapshot::NodeIdentity;
    use proptest::prelude::*;

    fn uid(n: u128) -> Uid {
        Uid::from_u128(n)
    }

    fn new_diff(n: u128, kind: EntityKind) -> ObjectDiff {
        ObjectDiff::new(
            uid(n),
            Some(Entity::new(uid(n), kind)),
            None,
            BTreeSet::new(),
            BTreeSet::new(),
            &PolicyRegistry::standard(),
        )
        .unwrap()
    }

    fn deps(edges: &[(u128, &[u128])]) -> BTreeMap<Uid, Vec<Uid>> {
        edges
            .iter()
            .map(|(parent, children)| (uid(*parent), children.iter().map(|c| uid(*c)).collect()))
            .collect()
    }

    fn ids(batch: &DiffBatch) -> Vec<Uid> {
        batch.diffs().iter().map(ObjectDiff::id).collect()
    }

    #[test]
    fn request_code_jobs_form_one_batch() {
        let registry = PolicyRegistry::standard();
        let node_diff = NodeDiff::from_parts(
            [
                new_diff(1, EntityKind::Request),
                new_diff(2, EntityKind::Code),
                new_diff(3, EntityKind::Job),
                new_diff(4, EntityKind::Job),
            ],
            deps(&[(1, &[2]), (2, &[3, 4])]),
        );

        let batches = build_batches(&node_diff, &registry).unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.root_id(), uid(1));
        assert_eq!(ids(batch), vec![uid(1), uid(2), uid(3), uid(4)]);
        assert_eq!(batch.levels(), &[0, 1, 2, 2]);
        assert_eq!(batch.dependents_of(&uid(3)), &[uid(2)]);
        assert_eq!(batch.dependents_of(&uid(1)), &[] as &[Uid]);
        assert_eq!(batch.dependencies_of(&uid(4)), &[] as &[Uid]);
        assert_eq!(batch.code_owner(), Some(uid(2)));
    }

    #[test]
    fn two_cycle_yields_one_batch() {
        let registry = PolicyRegistry::standard();
        let node_diff = NodeDiff::from_parts(
            [new_diff(1, EntityKind::Job), new_diff(2, EntityKind::Job)],
            deps(&[(1, &[2]), (2, &[1])]),
        );
        assert!(node_diff.roots().is_empty());

        let batches = build_batches(&node_diff, &registry).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(ids(&batches[0]), vec![uid(1), uid(2)]);
        // Edge back into the root is dropped.
        assert_eq!(batches[0].dependencies_of(&uid(2)), &[] as &[Uid]);
        assert!(batches[0].dependents_of(&uid(1)).is_empty());
    }

    #[test]
    fn sibling_reachable_through_sibling_stays_shallow() {
        let registry = PolicyRegistry::standard();
        let node_diff = NodeDiff::from_parts(
            [
                new_diff(1, EntityKind::Output),
                new_diff(2, EntityKind::Job),
                new_diff(3, EntityKind::ActionResult),
            ],
            deps(&[(1, &[2, 3]), (2, &[3])]),
        );
        let batches = build_batches(&node_diff, &registry).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(ids(&batches[0]), vec![uid(1), uid(2), uid(3)]);
        assert_eq!(batches[0].levels(), &[0, 1, 1]);
        assert_eq!(batches[0].dependents_of(&uid(3)), &[uid(1), uid(2)]);
    }

    #[test]
    fn shared_descendant_goes_to_higher_priority_root() {
        let registry = PolicyRegistry::standard();
        // Job (uid 1) sorts first by uid, but Request outranks it.
        let node_diff = NodeDiff::from_parts(
            [
                new_diff(1, EntityKind::Job),
                new_diff(2, EntityKind::Request),
                new_diff(3, EntityKind::Log),
            ],
            deps(&[(1, &[3]), (2, &[3])]),
        );
        let batches = build_batches(&node_diff, &registry).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(ids(&batches[0]), vec![uid(2), uid(3)]);
        assert_eq!(ids(&batches[1]), vec![uid(1)]);
        assert!(batches[1].dependencies_of(&uid(1)).is_empty());
    }

    #[test]
    fn code_owner_counts_already_claimed_code() {
        let registry = PolicyRegistry::standard();
        let node_diff = NodeDiff::from_parts(
            [
                new_diff(1, EntityKind::Request),
                new_diff(2, EntityKind::Code),
                new_diff(3, EntityKind::Job),
            ],
            deps(&[(1, &[2]), (3, &[2])]),
        );
        let batches = build_batches(&node_diff, &registry).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].code_owner(), Some(uid(2)));
        assert_eq!(ids(&batches[1]), vec![uid(3)]);
        assert_eq!(batches[1].code_owner(), Some(uid(2)));
    }

    #[test]
    fn restricted_root_kinds_are_enforced() {
        let registry = PolicyRegistry::builder()
            .with_standard_policies()
            .root_kinds([EntityKind::Request])
            .build()
            .unwrap();
        let node_diff = NodeDiff::from_parts(
            [new_diff(1, EntityKind::Request), new_diff(2, EntityKind::Job)],
            deps(&[(1, &[2])]),
        );
        assert!(build_batches(&node_diff, &registry).is_ok());

        let node_diff = NodeDiff::from_parts([new_diff(5, EntityKind::Log)], BTreeMap::new());
        assert_eq!(
            build_batches(&node_diff, &registry).unwrap_err(),
            DiffError::unknown_root_kind(uid(5), EntityKind::Log)
        );
    }

    #[test]
    fn dangling_edges_are_recorded() {
        let node_diff = NodeDiff::from_parts(
            [new_diff(1, EntityKind::Request)],
            deps(&[(1, &[1, 9])]),
        );
        assert_eq!(node_diff.dangling(), &[DiffError::dangling(uid(1), uid(9))]);
        assert!(node_diff.children(&uid(1)).is_empty());
        assert!(node_diff.ensure_no_dangling().is_err());
    }

    #[test]
    fn union_dependencies_keep_low_side_first() {
        let registry = PolicyRegistry::standard();
        let node = NodeIdentity::with_uid(uid(100), "n");
        let objects = || {
            [
                Entity::new(uid(1), EntityKind::Code),
                Entity::new(uid(2), EntityKind::Job),
                Entity::new(uid(3), EntityKind::Job),
            ]
        };
        let low = Snapshot::builder(node.clone())
            .objects(objects())
            .depends(uid(1), uid(3))
            .build();
        let high = Snapshot::builder(node)
            .objects(objects())
            .depends_all(uid(1), [uid(2), uid(3)])
            .build();

        let node_diff = NodeDiff::from_snapshots(&low, &high, &registry).unwrap();
        assert_eq!(node_diff.children(&uid(1)), &[uid(3), uid(2)]);
        assert_eq!(node_diff.roots(), vec![uid(1)]);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let registry = PolicyRegistry::standard();
        let batch_of = |status: &str| {
            let node_diff = NodeDiff::from_parts(
                [ObjectDiff::new(
                    uid(1),
                    Some(Entity::new(uid(1), EntityKind::Job).with_attr("status", status)),
                    None,
                    BTreeSet::new(),
                    BTreeSet::new(),
                    &registry,
                )
                .unwrap()],
                BTreeMap::new(),
            );
            build_batches(&node_diff, &registry).unwrap().remove(0)
        };

        assert_eq!(batch_of("a").fingerprint(), batch_of("a").fingerprint());
        assert_ne!(batch_of("a").fingerprint(), batch_of("b").fingerprint());
        assert_eq!(batch_of("a").fingerprint().to_string().len(), 64);
    }

    #[test]
    fn one_sided_grant_counts_as_a_change() {
        let registry = PolicyRegistry::standard();
        let job = Entity::new(uid(1), EntityKind::Job).with_attr("status", "done");
        let batch_with = |low_grants: BTreeSet<PermissionGrant>| {
            let diff = ObjectDiff::new(
                uid(1),
                Some(job.clone()),
                Some(job.clone()),
                low_grants,
                BTreeSet::new(),
                &registry,
            )
            .unwrap();
            assert_eq!(diff.status(), DiffStatus::Same);
            let node_diff = NodeDiff::from_parts([diff], BTreeMap::new());
            build_batches(&node_diff, &registry).unwrap().remove(0)
        };

        assert!(batch_with(BTreeSet::new()).is_unchanged());
        let grants = [PermissionGrant::read(uid(1), "alice")].into_iter().collect();
        assert!(!batch_with(grants).is_unchanged());
    }

    #[test]
    fn suppression_needs_matching_fingerprint() {
        let registry = PolicyRegistry::standard();
        let node_diff = NodeDiff::from_parts([new_diff(1, EntityKind::Job)], BTreeMap::new());
        let batch = build_batches(&node_diff, &registry).unwrap().remove(0);

        let stale = BatchFingerprint::from_bytes([0; 32]);
        let ignored = node_diff
            .clone()
            .with_ignored(Side::High, [(uid(1), stale)].into_iter().collect());
        assert!(!ignored.is_suppressed(&batch));

        let ignored = node_diff.with_ignored(
            Side::Low,
            [(uid(1), batch.fingerprint())].into_iter().collect(),
        );
        assert!(ignored.is_suppressed(&batch));
    }

    fn arb_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (1usize..24).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..n * 3)))
    }

    proptest! {
        #[test]
        fn batches_partition_any_graph((n, edges) in arb_graph()) {
            let registry = PolicyRegistry::standard();
            let diffs: Vec<_> = (0..n)
                .map(|i| new_diff(i as u128, EntityKind::ALL[i % EntityKind::COUNT]))
                .collect();
            let mut dependencies: BTreeMap<Uid, Vec<Uid>> = BTreeMap::new();
            for (parent, child) in edges {
                dependencies.entry(uid(parent as u128)).or_default().push(uid(child as u128));
            }
            let node_diff = NodeDiff::from_parts(diffs, dependencies);
            let batches = build_batches(&node_diff, &registry).unwrap();

            let mut seen = BTreeSet::new();
            for batch in &batches {
                prop_assert_eq!(batch.levels()[0], 0);
                prop_assert_eq!(batch.levels().len(), batch.len());
                prop_assert!(batch.dependents_of(&batch.root_id()).is_empty());
                for diff in batch.diffs() {
                    prop_assert!(seen.insert(diff.id()));
                    prop_assert!(batch.dependencies().contains_key(&diff.id()));
                }
                for (parent, children) in batch.dependencies() {
                    for child in children {
                        prop_assert!(batch.dependents_of(child).contains(parent));
                    }
                }
            }
            prop_assert_eq!(seen.len(), n);
        }
    }
}

//! Pairwise comparison of one identity across two snapshots.

use crate::entity::{Entity, EntityKind, PermissionGrant};
use crate::error::{DiffError, DiffResult};
use crate::policy::{Comparator, EqualityPolicy, PolicyRegistry};
use crate::snapshot::Snapshot;
use crate::uid::Uid;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::trace;

/// Attribute name reported by the synthetic whole-object diff.
pub const OBJECT_ATTR: &str = "<object>";

/// One of the two parties being reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The low side.
    Low,
    /// The high side.
    High,
}

impl Side {
    /// The opposite side.
    pub const fn other(self) -> Self {
        match self {
            Side::Low => Side::High,
            Side::High => Side::Low,
        }
    }

    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Side::Low => "low",
            Side::High => "high",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of comparing one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffStatus {
    /// Present on exactly one side.
    New,
    /// Present on both sides with no relevant difference.
    Same,
    /// Present on both sides with at least one relevant difference.
    Diff,
}

impl DiffStatus {
    /// Uppercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            DiffStatus::New => "NEW",
            DiffStatus::Same => "SAME",
            DiffStatus::Diff => "DIFF",
        }
    }

    /// Converts to a numeric code.
    pub const fn to_code(self) -> u8 {
        match self {
            DiffStatus::New => 1,
            DiffStatus::Same => 2,
            DiffStatus::Diff => 3,
        }
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index-level difference between two ordered sequences.
///
/// The common prefix (up to the shorter length) is compared index by
/// index; the remaining indices belong to whichever side is longer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListDiff {
    /// Attribute name.
    pub attr_name: String,
    /// Low side sequence.
    pub low: Vec<Value>,
    /// High side sequence.
    pub high: Vec<Value>,
    /// Indices in the common prefix whose values differ.
    pub diff_ids: Vec<usize>,
    /// Indices that exist only on the low side.
    pub new_low_ids: Vec<usize>,
    /// Indices that exist only on the high side.
    pub new_high_ids: Vec<usize>,
}

impl ListDiff {
    /// Compares two sequences.
    pub fn from_lists(attr_name: impl Into<String>, low: &[Value], high: &[Value]) -> Self {
        let common = low.len().min(high.len());
        Self {
            attr_name: attr_name.into(),
            low: low.to_vec(),
            high: high.to_vec(),
            diff_ids: (0..common).filter(|&i| low[i] != high[i]).collect(),
            new_low_ids: (common..low.len()).collect(),
            new_high_ids: (common..high.len()).collect(),
        }
    }

    /// Returns true if the sequences are identical.
    pub fn is_empty(&self) -> bool {
        self.diff_ids.is_empty() && self.new_low_ids.is_empty() && self.new_high_ids.is_empty()
    }
}

/// One reported difference between the two sides of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttrDiff {
    /// An attribute whose values differ.
    Scalar {
        /// Attribute name.
        attr_name: String,
        /// Low side value.
        low: Value,
        /// High side value.
        high: Value,
    },
    /// A sequence attribute with index-level detail.
    Sequence(ListDiff),
    /// Whole-object difference, for kinds compared structurally.
    Object {
        /// Low side version and attributes.
        low: Value,
        /// High side version and attributes.
        high: Value,
    },
}

impl AttrDiff {
    /// Name of the differing attribute ([`OBJECT_ATTR`] for whole objects).
    pub fn attr_name(&self) -> &str {
        match self {
            AttrDiff::Scalar { attr_name, .. } => attr_name,
            AttrDiff::Sequence(list) => &list.attr_name,
            AttrDiff::Object { .. } => OBJECT_ATTR,
        }
    }

    /// The sequence detail, if this is a sequence diff.
    pub fn as_sequence(&self) -> Option<&ListDiff> {
        match self {
            AttrDiff::Sequence(list) => Some(list),
            _ => None,
        }
    }
}

/// Comparison of one identity across the low and high snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDiff {
    id: Uid,
    kind: EntityKind,
    low: Option<Entity>,
    high: Option<Entity>,
    low_permissions: BTreeSet<PermissionGrant>,
    high_permissions: BTreeSet<PermissionGrant>,
    attr_diffs: Vec<AttrDiff>,
}

impl ObjectDiff {
    /// Compares the two sides of `id`.
    ///
    /// Fails with [`DiffError::InvalidDiff`] when both sides are absent,
    /// with [`DiffError::IdentityMismatch`] when an entity belongs to another
    /// identity and with [`DiffError::KindMismatch`] when the sides disagree
    /// on kind.
    pub fn new(
        id: Uid,
        low: Option<Entity>,
        high: Option<Entity>,
        low_permissions: BTreeSet<PermissionGrant>,
        high_permissions: BTreeSet<PermissionGrant>,
        registry: &PolicyRegistry,
    ) -> DiffResult<Self> {
        for entity in low.iter().chain(high.iter()) {
            if entity.uid() != id {
                return Err(DiffError::IdentityMismatch {
                    uid: id,
                    found: entity.uid(),
                });
            }
        }

        let kind = match (&low, &high) {
            (None, None) => return Err(DiffError::invalid_diff(id)),
            (Some(l), Some(h)) if l.kind != h.kind => {
                return Err(DiffError::KindMismatch {
                    uid: id,
                    low: l.kind,
                    high: h.kind,
                })
            }
            (Some(entity), _) | (None, Some(entity)) => entity.kind,
        };

        let attr_diffs = match (&low, &high) {
            (Some(l), Some(h)) => compare_entities(l, h, registry.policy(kind)),
            _ => Vec::new(),
        };
        trace!(%id, %kind, differences = attr_diffs.len(), "compared object");

        Ok(Self {
            id,
            kind,
            low,
            high,
            low_permissions,
            high_permissions,
            attr_diffs,
        })
    }

    /// Compares `id` as held by two snapshots.
    pub fn from_snapshots(
        id: Uid,
        low: &Snapshot,
        high: &Snapshot,
        registry: &PolicyRegistry,
    ) -> DiffResult<Self> {
        Self::new(
            id,
            low.get(&id).cloned(),
            high.get(&id).cloned(),
            low.permissions(&id).clone(),
            high.permissions(&id).clone(),
            registry,
        )
    }

    /// The compared identity.
    pub fn id(&self) -> Uid {
        self.id
    }

    /// Kind of the compared object.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Low side entity.
    pub fn low(&self) -> Option<&Entity> {
        self.low.as_ref()
    }

    /// High side entity.
    pub fn high(&self) -> Option<&Entity> {
        self.high.as_ref()
    }

    /// Entity on `side`.
    pub fn side(&self, side: Side) -> Option<&Entity> {
        match side {
            Side::Low => self.low(),
            Side::High => self.high(),
        }
    }

    /// Grants held on `side`.
    pub fn permissions(&self, side: Side) -> &BTreeSet<PermissionGrant> {
        match side {
            Side::Low => &self.low_permissions,
            Side::High => &self.high_permissions,
        }
    }

    /// Grants held on `from` but not on the other side.
    pub fn new_permissions(&self, from: Side) -> impl Iterator<Item = &PermissionGrant> {
        let theirs = self.permissions(from.other());
        self.permissions(from)
            .iter()
            .filter(move |grant| !theirs.contains(*grant))
    }

    /// Attribute-level differences, in allow-list order.
    pub fn attr_diffs(&self) -> &[AttrDiff] {
        &self.attr_diffs
    }

    /// Derived status.
    pub fn status(&self) -> DiffStatus {
        match (&self.low, &self.high) {
            (Some(_), Some(_)) if self.attr_diffs.is_empty() => DiffStatus::Same,
            (Some(_), Some(_)) => DiffStatus::Diff,
            _ => DiffStatus::New,
        }
    }

    /// Whichever side is present (low first).
    pub fn entity(&self) -> &Entity {
        match (&self.low, &self.high) {
            (Some(entity), _) | (None, Some(entity)) => entity,
            (None, None) => unreachable!("ObjectDiff::new rejects diffs with no side"),
        }
    }

    /// The entity if the status is NEW.
    pub fn new_entity(&self) -> Option<&Entity> {
        (self.status() == DiffStatus::New).then(|| self.entity())
    }

    /// The side holding the entity if the status is NEW.
    pub fn new_on(&self) -> Option<Side> {
        match (&self.low, &self.high) {
            (Some(_), None) => Some(Side::Low),
            (None, Some(_)) => Some(Side::High),
            _ => None,
        }
    }
}

/// Compares two entities of the same kind under `policy`.
pub fn compare_entities(low: &Entity, high: &Entity, policy: &EqualityPolicy) -> Vec<AttrDiff> {
    let Some(allow_list) = policy.allow_list() else {
        if low == high {
            return Vec::new();
        }
        return vec![AttrDiff::Object {
            low: object_value(low),
            high: object_value(high),
        }];
    };

    allow_list
        .iter()
        .filter_map(|name| {
            let (l, h) = (low.attr(name), high.attr(name));
            compare_attr(name, l, h, policy.comparator_for(name, l, h))
        })
        .collect()
}

fn compare_attr(name: &str, low: &Value, high: &Value, comparator: Comparator) -> Option<AttrDiff> {
    match comparator {
        Comparator::Equality => scalar_diff(name, low, high),
        Comparator::Sequence => match (low.as_list(), high.as_list()) {
            (Some(l), Some(h)) => {
                let list = ListDiff::from_lists(name, l, h);
                (!list.is_empty()).then_some(AttrDiff::Sequence(list))
            }
            _ => scalar_diff(name, low, high),
        },
        Comparator::PartyStatus => match (low.as_map(), high.as_map()) {
            (Some(l), Some(h)) if parties_agree(l, h) => None,
            (Some(_), Some(_)) => Some(AttrDiff::Scalar {
                attr_name: name.to_string(),
                low: low.clone(),
                high: high.clone(),
            }),
            _ => scalar_diff(name, low, high),
        },
    }
}

fn scalar_diff(name: &str, low: &Value, high: &Value) -> Option<AttrDiff> {
    (low != high).then(|| AttrDiff::Scalar {
        attr_name: name.to_string(),
        low: low.clone(),
        high: high.clone(),
    })
}

/// Parties present on only one side do not count as a difference.
fn parties_agree(low: &BTreeMap<String, Value>, high: &BTreeMap<String, Value>) -> bool {
    low.iter()
        .all(|(party, status)| high.get(party).map_or(true, |other| other == status))
}

fn object_value(entity: &Entity) -> Value {
    Value::map([
        ("version", Value::from(entity.version)),
        ("attributes", Value::Map(entity.attributes.clone())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Permission;

    fn uid(n: u128) -> Uid {
        Uid::from_u128(n)
    }

    fn diff(low: Option<Entity>, high: Option<Entity>) -> DiffResult<ObjectDiff> {
        ObjectDiff::new(
            uid(1),
            low,
            high,
            BTreeSet::new(),
            BTreeSet::new(),
            &PolicyRegistry::standard(),
        )
    }

    fn request(changes: Vec<Value>) -> Entity {
        Entity::new(uid(1), EntityKind::Request)
            .with_attr("requesting_user", "alice")
            .with_attr("status", "PENDING")
            .with_attr("changes", Value::List(changes))
    }

    #[test]
    fn both_sides_absent_is_invalid() {
        assert_eq!(
            diff(None, None).unwrap_err(),
            DiffError::InvalidDiff { uid: uid(1) }
        );
    }

    #[test]
    fn foreign_entity_is_rejected() {
        let err = diff(Some(Entity::new(uid(2), EntityKind::Job)), None).unwrap_err();
        assert_eq!(
            err,
            DiffError::IdentityMismatch {
                uid: uid(1),
                found: uid(2),
            }
        );

        let err = diff(
            Some(Entity::new(uid(1), EntityKind::Job)),
            Some(Entity::new(uid(3), EntityKind::Job)),
        )
        .unwrap_err();
        assert!(matches!(err, DiffError::IdentityMismatch { found, .. } if found == uid(3)));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let err = diff(
            Some(Entity::new(uid(1), EntityKind::Job)),
            Some(Entity::new(uid(1), EntityKind::Log)),
        )
        .unwrap_err();
        assert!(matches!(err, DiffError::KindMismatch { .. }));
    }

    #[test]
    fn one_side_is_new_without_attr_diffs() {
        let d = diff(None, Some(request(vec![]))).unwrap();
        assert_eq!(d.status(), DiffStatus::New);
        assert!(d.attr_diffs().is_empty());
        assert_eq!(d.new_on(), Some(Side::High));
        assert_eq!(d.new_entity().map(Entity::uid), Some(uid(1)));
    }

    #[test]
    fn identical_allow_listed_attributes_are_same() {
        let low = request(vec![Value::from("a")]).with_attr("ignored_note", "x");
        let high = request(vec![Value::from("a")]).with_attr("ignored_note", "y");
        let d = diff(Some(low), Some(high)).unwrap();
        assert_eq!(d.status(), DiffStatus::Same);
        assert!(d.attr_diffs().is_empty());
        assert_eq!(d.new_entity(), None);
    }

    #[test]
    fn changed_change_list_reports_indices() {
        let low = request(vec![Value::from("a"), Value::from("b"), Value::from("c")]);
        let high = request(vec![Value::from("a"), Value::from("B")]);
        let d = diff(Some(low), Some(high)).unwrap();

        assert_eq!(d.status(), DiffStatus::Diff);
        assert_eq!(d.attr_diffs().len(), 1);
        let list = d.attr_diffs()[0].as_sequence().unwrap();
        assert_eq!(list.attr_name, "changes");
        assert_eq!(list.diff_ids, vec![1]);
        assert_eq!(list.new_low_ids, vec![2]);
        assert!(list.new_high_ids.is_empty());
    }

    #[test]
    fn list_diff_longer_high_side() {
        let low = [Value::from(1)];
        let high = [Value::from(1), Value::from(2), Value::from(3)];
        let list = ListDiff::from_lists("xs", &low, &high);
        assert!(list.diff_ids.is_empty());
        assert!(list.new_low_ids.is_empty());
        assert_eq!(list.new_high_ids, vec![1, 2]);
        assert!(ListDiff::from_lists("xs", &low, &low).is_empty());
    }

    #[test]
    fn scalar_attributes_report_in_allow_list_order() {
        let low = request(vec![]).with_attr("status", "PENDING");
        let high = request(vec![])
            .with_attr("status", "APPROVED")
            .with_attr("requesting_user", "bob");
        let d = diff(Some(low), Some(high)).unwrap();
        let names: Vec<_> = d.attr_diffs().iter().map(AttrDiff::attr_name).collect();
        assert_eq!(names, vec!["requesting_user", "status"]);
    }

    #[test]
    fn party_status_ignores_one_sided_parties() {
        let status = |pairs: &[(&str, &str)]| {
            Entity::new(uid(1), EntityKind::CodeStatus)
                .with_attr("status_dict", Value::map(pairs.iter().copied()))
        };

        let low = status(&[("low-node", "APPROVED")]);
        let high = status(&[("low-node", "APPROVED"), ("high-node", "PENDING")]);
        let d = diff(Some(low), Some(high)).unwrap();
        assert_eq!(d.status(), DiffStatus::Same);

        let low = status(&[("low-node", "APPROVED")]);
        let high = status(&[("low-node", "DENIED")]);
        let d = diff(Some(low), Some(high)).unwrap();
        assert_eq!(d.status(), DiffStatus::Diff);
        assert_eq!(d.attr_diffs()[0].attr_name(), "status_dict");
    }

    #[test]
    fn compare_everything_reports_one_object_diff() {
        let low = Entity::new(uid(1), EntityKind::ActionResult)
            .with_attr("a", 1)
            .with_attr("b", 2);
        let high = Entity::new(uid(1), EntityKind::ActionResult)
            .with_attr("a", 10)
            .with_attr("b", 20);
        let d = diff(Some(low.clone()), Some(high)).unwrap();
        assert_eq!(d.status(), DiffStatus::Diff);
        assert_eq!(d.attr_diffs().len(), 1);
        assert_eq!(d.attr_diffs()[0].attr_name(), OBJECT_ATTR);

        let d = diff(Some(low.clone()), Some(low)).unwrap();
        assert_eq!(d.status(), DiffStatus::Same);
    }

    #[test]
    fn new_permissions_are_one_sided() {
        let shared = PermissionGrant::read(uid(1), "alice");
        let low_only = PermissionGrant::new(uid(1), "bob", Permission::Write);
        let d = ObjectDiff::new(
            uid(1),
            Some(Entity::new(uid(1), EntityKind::Job)),
            Some(Entity::new(uid(1), EntityKind::Job)),
            [shared.clone(), low_only.clone()].into_iter().collect(),
            [shared].into_iter().collect(),
            &PolicyRegistry::standard(),
        )
        .unwrap();
        let from_low: Vec<_> = d.new_permissions(Side::Low).collect();
        assert_eq!(from_low, vec![&low_only]);
        assert_eq!(d.new_permissions(Side::High).count(), 0);
    }
}

//! Equality policies and the registry that maps kinds to them.
//!
//! The registry is built once and passed by reference into diffing,
//! batching, ordering and resolution. Construction checks that every
//! [`EntityKind`] has a policy, so lookups never fail afterwards.

use crate::entity::EntityKind;
use crate::error::RegistryError;
use crate::value::Value;
use std::collections::BTreeMap;

/// How one attribute is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Plain equality.
    Equality,
    /// Index-wise comparison of ordered sequences.
    Sequence,
    /// Party → status maps, compared on shared parties only.
    PartyStatus,
}

/// Equality policy of one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqualityPolicy {
    allow_list: Option<Vec<String>>,
    comparators: BTreeMap<String, Comparator>,
}

impl EqualityPolicy {
    /// A policy that compares whole entities structurally.
    pub fn compare_everything() -> Self {
        Self {
            allow_list: None,
            comparators: BTreeMap::new(),
        }
    }

    /// A policy that only compares the named attributes, in order.
    pub fn allow<S: Into<String>>(attrs: impl IntoIterator<Item = S>) -> Self {
        Self {
            allow_list: Some(attrs.into_iter().map(Into::into).collect()),
            comparators: BTreeMap::new(),
        }
    }

    /// Overrides the comparator for one attribute.
    #[must_use]
    pub fn with_comparator(mut self, attr: impl Into<String>, comparator: Comparator) -> Self {
        self.comparators.insert(attr.into(), comparator);
        self
    }

    /// Returns the allow-list, or `None` for compare-everything.
    pub fn allow_list(&self) -> Option<&[String]> {
        self.allow_list.as_deref()
    }

    /// Returns true if whole entities are compared.
    pub fn compares_everything(&self) -> bool {
        self.allow_list.is_none()
    }

    /// Picks the comparator for an attribute.
    ///
    /// An explicit override wins; otherwise two lists compare as
    /// sequences and anything else by equality.
    pub fn comparator_for(&self, attr: &str, low: &Value, high: &Value) -> Comparator {
        if let Some(comparator) = self.comparators.get(attr) {
            return *comparator;
        }
        match (low, high) {
            (Value::List(_), Value::List(_)) => Comparator::Sequence,
            _ => Comparator::Equality,
        }
    }
}

/// Policy used by [`PolicyRegistry::standard`] for each kind.
fn standard_policy(kind: EntityKind) -> EqualityPolicy {
    match kind {
        EntityKind::Request => EqualityPolicy::allow(["requesting_user", "status", "changes"]),
        EntityKind::Code => {
            EqualityPolicy::allow(["func_name", "raw_code", "input_policy", "output_policy"])
        }
        EntityKind::CodeStatus => EqualityPolicy::allow(["status_dict"])
            .with_comparator("status_dict", Comparator::PartyStatus),
        EntityKind::Job => EqualityPolicy::allow([
            "status",
            "result_id",
            "log_id",
            "parent_job_id",
            "progress",
        ]),
        EntityKind::Log => EqualityPolicy::allow(["stdout", "stderr"]),
        EntityKind::Output => EqualityPolicy::allow(["output_ids", "job_id", "executing_user"]),
        EntityKind::ActionResult => EqualityPolicy::compare_everything(),
    }
}

/// Root kinds of the standard registry, highest priority first.
const STANDARD_ROOT_KINDS: [EntityKind; EntityKind::COUNT] = [
    EntityKind::CodeStatus,
    EntityKind::Request,
    EntityKind::Output,
    EntityKind::Code,
    EntityKind::Job,
    EntityKind::Log,
    EntityKind::ActionResult,
];

/// Kind → policy table plus the kinds allowed to head a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRegistry {
    // Indexed by `EntityKind::index`; always `EntityKind::COUNT` long.
    policies: Vec<EqualityPolicy>,
    root_kinds: Vec<EntityKind>,
}

impl PolicyRegistry {
    /// Starts an empty builder.
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// The standard registry: built-in policies, every kind a root.
    pub fn standard() -> Self {
        Self {
            policies: EntityKind::ALL.iter().map(|k| standard_policy(*k)).collect(),
            root_kinds: STANDARD_ROOT_KINDS.to_vec(),
        }
    }

    /// Returns the policy for a kind.
    pub fn policy(&self, kind: EntityKind) -> &EqualityPolicy {
        &self.policies[kind.index()]
    }

    /// Position of `kind` in the root priority order, if it may be a root.
    pub fn root_priority(&self, kind: EntityKind) -> Option<usize> {
        self.root_kinds.iter().position(|k| *k == kind)
    }

    /// Returns true if `kind` may head a batch.
    pub fn is_root_kind(&self, kind: EntityKind) -> bool {
        self.root_priority(kind).is_some()
    }

    /// Root kinds, highest priority first.
    pub fn root_kinds(&self) -> &[EntityKind] {
        &self.root_kinds
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Builder for [`PolicyRegistry`].
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistryBuilder {
    policies: BTreeMap<EntityKind, EqualityPolicy>,
    root_kinds: Option<Vec<EntityKind>>,
}

impl PolicyRegistryBuilder {
    /// Registers the built-in policy for every kind not yet registered.
    #[must_use]
    pub fn with_standard_policies(mut self) -> Self {
        for kind in EntityKind::ALL {
            self.policies
                .entry(kind)
                .or_insert_with(|| standard_policy(kind));
        }
        self
    }

    /// Registers (or replaces) the policy for a kind.
    #[must_use]
    pub fn register(mut self, kind: EntityKind, policy: EqualityPolicy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    /// Declares the root kinds, highest priority first.
    ///
    /// Defaults to the standard order when never called.
    #[must_use]
    pub fn root_kinds(mut self, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        self.root_kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Validates completeness and builds the registry.
    pub fn build(mut self) -> Result<PolicyRegistry, RegistryError> {
        let mut policies = Vec::with_capacity(EntityKind::COUNT);
        for kind in EntityKind::ALL {
            let policy = self
                .policies
                .remove(&kind)
                .ok_or(RegistryError::MissingPolicy { kind })?;
            policies.push(policy);
        }

        let root_kinds = self
            .root_kinds
            .unwrap_or_else(|| STANDARD_ROOT_KINDS.to_vec());
        if root_kinds.is_empty() {
            return Err(RegistryError::NoRootKinds);
        }
        for (i, kind) in root_kinds.iter().enumerate() {
            if root_kinds[..i].contains(kind) {
                return Err(RegistryError::DuplicateRootKind { kind: *kind });
            }
        }

        Ok(PolicyRegistry {
            policies,
            root_kinds,
        })
    }
}

//! Entities, entity kinds and permission grants.

use crate::uid::{EntityId, Uid};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

static NULL_VALUE: Value = Value::Null;

/// The closed set of syncable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Approval request wrapping a list of changes.
    Request,
    /// Collaborative code submission.
    Code,
    /// Per-party approval status of a code submission.
    CodeStatus,
    /// Execution job.
    Job,
    /// Execution log.
    Log,
    /// Execution output.
    Output,
    /// Generic action-result object.
    ActionResult,
}

impl EntityKind {
    /// Number of kinds.
    pub const COUNT: usize = 7;

    /// Every kind, in declaration order.
    pub const ALL: [EntityKind; Self::COUNT] = [
        EntityKind::Request,
        EntityKind::Code,
        EntityKind::CodeStatus,
        EntityKind::Job,
        EntityKind::Log,
        EntityKind::Output,
        EntityKind::ActionResult,
    ];

    /// Dense index of this kind, in `0..COUNT`.
    pub const fn index(self) -> usize {
        match self {
            EntityKind::Request => 0,
            EntityKind::Code => 1,
            EntityKind::CodeStatus => 2,
            EntityKind::Job => 3,
            EntityKind::Log => 4,
            EntityKind::Output => 5,
            EntityKind::ActionResult => 6,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            EntityKind::Request => "Request",
            EntityKind::Code => "Code",
            EntityKind::CodeStatus => "CodeStatus",
            EntityKind::Job => "Job",
            EntityKind::Log => "Log",
            EntityKind::Output => "Output",
            EntityKind::ActionResult => "ActionResult",
        }
    }

    /// Returns true for code submissions, which own review groups.
    pub const fn is_code(self) -> bool {
        matches!(self, EntityKind::Code)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A versioned, typed record with a stable identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Identity (possibly lineage-aware).
    pub id: EntityId,
    /// Kind of record.
    pub kind: EntityKind,
    /// Record version.
    #[serde(default)]
    pub version: u32,
    /// Named attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Entity {
    /// Creates an entity with no attributes at version 1.
    pub fn new(id: impl Into<EntityId>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            version: 1,
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Sets an attribute in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Returns the base identity.
    pub fn uid(&self) -> Uid {
        self.id.base()
    }

    /// Reads an attribute; missing attributes read as [`Value::Null`].
    pub fn attr(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&NULL_VALUE)
    }
}

/// Kind of access a grant gives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read access.
    Read,
    /// Write access.
    Write,
    /// Execute access.
    Execute,
    /// Ownership.
    Owner,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::Execute => "EXECUTE",
            Permission::Owner => "OWNER",
        };
        f.write_str(name)
    }
}

/// A permission held by some credentials on one object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Object the grant applies to.
    pub uid: Uid,
    /// Credentials (verify key) holding the grant.
    pub credentials: String,
    /// Granted permission.
    pub permission: Permission,
}

impl PermissionGrant {
    /// Creates a grant.
    pub fn new(uid: Uid, credentials: impl Into<String>, permission: Permission) -> Self {
        Self {
            uid,
            credentials: credentials.into(),
            permission,
        }
    }

    /// Creates a read grant.
    pub fn read(uid: Uid, credentials: impl Into<String>) -> Self {
        Self::new(uid, credentials, Permission::Read)
    }
}

impl fmt::Display for PermissionGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{} on {}", self.credentials, self.permission, self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uid::LineageId;

    #[test]
    fn kind_index_is_dense() {
        for (i, kind) in EntityKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn missing_attribute_reads_null() {
        let entity = Entity::new(Uid::from_u128(1), EntityKind::Job).with_attr("status", "done");
        assert_eq!(entity.attr("status"), &Value::from("done"));
        assert_eq!(entity.attr("missing"), &Value::Null);
    }

    #[test]
    fn uid_normalizes_lineage() {
        let base = Uid::from_u128(9);
        let entity = Entity::new(LineageId::new(base, 4), EntityKind::ActionResult);
        assert_eq!(entity.uid(), base);
    }

    #[test]
    fn grant_display() {
        let grant = PermissionGrant::read(Uid::from_u128(1), "alice");
        assert!(grant.to_string().starts_with("alice_READ"));
    }
}

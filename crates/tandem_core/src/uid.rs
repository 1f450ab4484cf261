//! Identity types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique, opaque object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(Uuid);

impl Uid {
    /// Generates a new random identity.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identity from a raw 128-bit value.
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Returns the first eight hex digits, for compact display.
    #[must_use]
    pub fn short(&self) -> String {
        let mut text = self.0.simple().to_string();
        text.truncate(8);
        text
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Uid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for Uid {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// An identity that also carries lineage metadata.
///
/// Two lineage ids are equal when their base [`Uid`]s are equal; the
/// lineage counter never takes part in comparison or hashing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineageId {
    /// The underlying identity.
    pub id: Uid,
    /// Lineage metadata.
    pub lineage: u64,
}

impl LineageId {
    /// Creates a lineage id.
    #[must_use]
    pub const fn new(id: Uid, lineage: u64) -> Self {
        Self { id, lineage }
    }
}

impl PartialEq for LineageId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LineageId {}

impl Hash for LineageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for LineageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LineageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// The identity an entity is stored under.
///
/// Serialized as a bare uuid string for plain ids and as
/// `{"id": ..., "lineage": ...}` for lineage ids.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// A plain identity.
    Plain(Uid),
    /// A lineage-aware identity.
    Lineage(LineageId),
}

impl EntityId {
    /// Returns the base identity used as a map key.
    #[must_use]
    pub const fn base(&self) -> Uid {
        match self {
            EntityId::Plain(uid) => *uid,
            EntityId::Lineage(lineage) => lineage.id,
        }
    }

    /// Returns the lineage counter, if any.
    #[must_use]
    pub const fn lineage(&self) -> Option<u64> {
        match self {
            EntityId::Plain(_) => None,
            EntityId::Lineage(lineage) => Some(lineage.lineage),
        }
    }
}

impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        self.base() == other.base()
    }
}

impl Eq for EntityId {}

impl Hash for EntityId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base().hash(state);
    }
}

impl From<Uid> for EntityId {
    fn from(uid: Uid) -> Self {
        EntityId::Plain(uid)
    }
}

impl From<LineageId> for EntityId {
    fn from(lineage: LineageId) -> Self {
        EntityId::Lineage(lineage)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Plain(uid) => write!(f, "{uid}"),
            EntityId::Lineage(lineage) => write!(f, "{}@{}", lineage.id, lineage.lineage),
        }
    }
}

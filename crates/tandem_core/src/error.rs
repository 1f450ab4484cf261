//! Error types for Tandem core.

use crate::diff::Side;
use crate::entity::EntityKind;
use crate::uid::Uid;
use thiserror::Error;

/// Result type for diff, batch and resolve operations.
pub type DiffResult<T> = Result<T, DiffError>;

/// Errors that can occur while diffing, batching or resolving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    /// Neither snapshot holds the identity.
    #[error("invalid diff: {uid} is absent from both snapshots")]
    InvalidDiff {
        /// The identity that was looked up.
        uid: Uid,
    },

    /// The two sides disagree on what kind of entity an identity is.
    #[error("kind mismatch for {uid}: low side is {low}, high side is {high}")]
    KindMismatch {
        /// The identity being diffed.
        uid: Uid,
        /// Kind on the low side.
        low: EntityKind,
        /// Kind on the high side.
        high: EntityKind,
    },

    /// An entity was diffed under an identity that is not its own.
    #[error("identity mismatch: {found} was diffed as {uid}")]
    IdentityMismatch {
        /// The identity the diff is keyed under.
        uid: Uid,
        /// The entity's own identity.
        found: Uid,
    },

    /// A resolved state was passed in the slot of the other side.
    #[error("resolved state for the {found} side passed as the {expected} side")]
    AliasMismatch {
        /// Side the slot belongs to.
        expected: Side,
        /// Alias of the state passed in.
        found: Side,
    },

    /// A dependency edge points at an identity with no diff.
    #[error("dangling dependency {parent} -> {child}")]
    DanglingDependency {
        /// Parent end of the edge.
        parent: Uid,
        /// Child end of the edge.
        child: Uid,
    },

    /// A batch root has a kind the registry does not accept as a root.
    #[error("batch root {uid} has kind {kind}, which is not a declared root kind")]
    UnknownRootKind {
        /// The root identity.
        uid: Uid,
        /// The root's kind.
        kind: EntityKind,
    },

    /// The policy registry is incomplete or inconsistent.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl DiffError {
    /// Creates an invalid diff error.
    pub fn invalid_diff(uid: Uid) -> Self {
        Self::InvalidDiff { uid }
    }

    /// Creates a dangling dependency error.
    pub fn dangling(parent: Uid, child: Uid) -> Self {
        Self::DanglingDependency { parent, child }
    }

    /// Creates an unknown root kind error.
    pub fn unknown_root_kind(uid: Uid, kind: EntityKind) -> Self {
        Self::UnknownRootKind { uid, kind }
    }
}

/// Errors raised while building a [`PolicyRegistry`](crate::PolicyRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A kind has no equality policy.
    #[error("no equality policy registered for {kind}")]
    MissingPolicy {
        /// The kind without a policy.
        kind: EntityKind,
    },

    /// A root kind was listed twice.
    #[error("root kind {kind} declared more than once")]
    DuplicateRootKind {
        /// The repeated kind.
        kind: EntityKind,
    },

    /// No kind may head a batch.
    #[error("no root kinds declared")]
    NoRootKinds,
}

/// Opaque failure reported by a persistence collaborator.
///
/// The core never inspects the message; it is surfaced as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("persist failed: {message}")]
pub struct PersistError {
    message: String,
}

impl PersistError {
    /// Creates a persist error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the collaborator's message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let uid = Uid::from_u128(7);
        let err = DiffError::invalid_diff(uid);
        assert!(err.to_string().contains(&uid.to_string()));

        let err = DiffError::unknown_root_kind(uid, EntityKind::Log);
        assert!(err.to_string().contains("Log"));

        let err = PersistError::new("disk full");
        assert_eq!(err.to_string(), "persist failed: disk full");
        assert_eq!(err.message(), "disk full");
    }

    #[test]
    fn registry_error_converts() {
        let err: DiffError = RegistryError::NoRootKinds.into();
        assert!(matches!(err, DiffError::Registry(RegistryError::NoRootKinds)));
    }
}

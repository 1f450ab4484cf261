//! Turning a per-batch decision into concrete per-side changes.
//!
//! Resolution is pure: the caller's states are borrowed and new states are
//! returned. Entries are only appended when not already present, so
//! resolving the same batch twice gives the same result as resolving it
//! once.

use crate::diff::{DiffStatus, ObjectDiff, Side};
use crate::entity::{Entity, PermissionGrant};
use crate::error::{DiffError, DiffResult};
use crate::graph::DiffBatch;
use crate::policy::PolicyRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// What to do with one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDecision {
    /// Make the high side match the low side.
    LowToHigh,
    /// Make the low side match the high side.
    HighToLow,
    /// Leave the batch for a later round.
    Skip,
    /// Leave the batch and remember not to show it again while unchanged.
    Ignore,
}

impl SyncDecision {
    /// The side whose state wins, for sync decisions.
    pub const fn source(self) -> Option<Side> {
        match self {
            SyncDecision::LowToHigh => Some(Side::Low),
            SyncDecision::HighToLow => Some(Side::High),
            SyncDecision::Skip | SyncDecision::Ignore => None,
        }
    }

    /// Returns true if the decision moves state between sides.
    pub const fn is_sync(self) -> bool {
        self.source().is_some()
    }

    /// Kebab-case name.
    pub const fn name(self) -> &'static str {
        match self {
            SyncDecision::LowToHigh => "low-to-high",
            SyncDecision::HighToLow => "high-to-low",
            SyncDecision::Skip => "skip",
            SyncDecision::Ignore => "ignore",
        }
    }
}

impl fmt::Display for SyncDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for [`Resolver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Delete objects that exist only on the receiving side.
    ///
    /// Off by default: a NEW object missing from the source is left alone.
    pub propagate_deletes: bool,
}

impl ResolveOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets delete propagation.
    #[must_use]
    pub fn with_propagate_deletes(mut self, propagate_deletes: bool) -> Self {
        self.propagate_deletes = propagate_deletes;
        self
    }
}

/// Changes to write back to one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedState {
    /// Side the changes apply to.
    pub alias: Side,
    /// Objects to create.
    pub create: Vec<Entity>,
    /// Objects to overwrite.
    pub update: Vec<Entity>,
    /// Objects to delete.
    pub delete: Vec<Entity>,
    /// Grants to add.
    pub new_permissions: Vec<PermissionGrant>,
}

impl ResolvedState {
    /// An empty state for `alias`.
    pub fn new(alias: Side) -> Self {
        Self {
            alias,
            create: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
            new_permissions: Vec::new(),
        }
    }

    /// Returns true if there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.update.is_empty()
            && self.delete.is_empty()
            && self.new_permissions.is_empty()
    }

    /// Total number of queued changes.
    pub fn change_count(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len() + self.new_permissions.len()
    }

    /// Applies one diff under `decision`.
    ///
    /// Does nothing unless this state is the receiving side.
    pub fn apply_diff(&mut self, diff: &ObjectDiff, decision: SyncDecision, options: ResolveOptions) {
        let Some(source) = decision.source() else {
            return;
        };
        if source == self.alias {
            return;
        }

        match diff.status() {
            DiffStatus::Same => {}
            DiffStatus::Diff => {
                if let Some(entity) = diff.side(source) {
                    push_entity(&mut self.update, entity);
                }
            }
            DiffStatus::New => match (diff.side(source), diff.side(self.alias)) {
                (Some(entity), None) => push_entity(&mut self.create, entity),
                (None, Some(entity)) if options.propagate_deletes => {
                    push_entity(&mut self.delete, entity)
                }
                _ => {}
            },
        }

        for grant in diff.new_permissions(source) {
            if !self.new_permissions.contains(grant) {
                self.new_permissions.push(grant.clone());
            }
        }

        trace!(
            uid = %diff.id(),
            alias = %self.alias,
            status = %diff.status(),
            "applied diff"
        );
    }
}

fn push_entity(list: &mut Vec<Entity>, entity: &Entity) {
    if !list.iter().any(|e| e.uid() == entity.uid()) {
        list.push(entity.clone());
    }
}

/// Resolves batches against a policy registry.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'r> {
    registry: &'r PolicyRegistry,
    options: ResolveOptions,
}

impl<'r> Resolver<'r> {
    /// Creates a resolver with default options.
    pub fn new(registry: &'r PolicyRegistry) -> Self {
        Self {
            registry,
            options: ResolveOptions::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Current options.
    pub fn options(&self) -> ResolveOptions {
        self.options
    }

    /// Applies `decision` to every diff of `batch`, returning new low and
    /// high states.
    ///
    /// Skip and Ignore return the inputs unchanged. Fails with
    /// [`DiffError::AliasMismatch`] if `low` and `high` are swapped.
    pub fn resolve(
        &self,
        batch: &DiffBatch,
        decision: SyncDecision,
        low: &ResolvedState,
        high: &ResolvedState,
    ) -> DiffResult<(ResolvedState, ResolvedState)> {
        for (state, expected) in [(low, Side::Low), (high, Side::High)] {
            if state.alias != expected {
                return Err(DiffError::AliasMismatch {
                    expected,
                    found: state.alias,
                });
            }
        }
        let kind = batch.root_kind();
        if !self.registry.is_root_kind(kind) {
            return Err(DiffError::unknown_root_kind(batch.root_id(), kind));
        }

        let mut low = low.clone();
        let mut high = high.clone();
        if decision.is_sync() {
            for diff in batch.diffs() {
                low.apply_diff(diff, decision, self.options);
                high.apply_diff(diff, decision, self.options);
            }
        }

        debug!(
            root = %batch.root_id(),
            %decision,
            low_changes = low.change_count(),
            high_changes = high.change_count(),
            "resolved batch"
        );
        Ok((low, high))
    }
}

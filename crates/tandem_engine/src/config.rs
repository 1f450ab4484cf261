//! Configuration for the reconciliation engine.

use tandem_core::ResolveOptions;

/// Configuration for reconciliation rounds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delete objects that exist only on the receiving side.
    pub propagate_deletes: bool,
    /// Skip batches whose members are all SAME without asking the decider.
    pub skip_unchanged: bool,
    /// Show batches a side has ignored even if they have not changed.
    pub include_suppressed: bool,
    /// Stop after this many batches have been decided.
    pub max_batches: Option<usize>,
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            propagate_deletes: false,
            skip_unchanged: true,
            include_suppressed: false,
            max_batches: None,
        }
    }

    /// Sets delete propagation.
    pub fn with_propagate_deletes(mut self, propagate_deletes: bool) -> Self {
        self.propagate_deletes = propagate_deletes;
        self
    }

    /// Sets whether unchanged batches are skipped.
    pub fn with_skip_unchanged(mut self, skip_unchanged: bool) -> Self {
        self.skip_unchanged = skip_unchanged;
        self
    }

    /// Sets whether suppressed batches are shown.
    pub fn with_include_suppressed(mut self, include_suppressed: bool) -> Self {
        self.include_suppressed = include_suppressed;
        self
    }

    /// Caps the number of batches decided per round.
    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.max_batches = Some(max_batches);
        self
    }

    /// Resolver options derived from this configuration.
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions::new().with_propagate_deletes(self.propagate_deletes)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

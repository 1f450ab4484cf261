//! Snapshot sources.

use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tandem_core::{Side, Snapshot};

/// Produces the current snapshot of one side.
///
/// This trait abstracts how a side's state reaches the engine (a local
/// store, a transferred file, a test fixture).
pub trait SnapshotSource: Send + Sync {
    /// Captures the current snapshot.
    fn fetch_snapshot(&self) -> EngineResult<Snapshot>;
}

impl<S: SnapshotSource + ?Sized> SnapshotSource for Arc<S> {
    fn fetch_snapshot(&self) -> EngineResult<Snapshot> {
        (**self).fetch_snapshot()
    }
}

/// An in-memory snapshot source for testing.
#[derive(Debug)]
pub struct MemorySource {
    side: Side,
    snapshot: RwLock<Snapshot>,
    failure: RwLock<Option<String>>,
    fetches: AtomicU64,
}

impl MemorySource {
    /// Creates a source for `side` serving `snapshot`.
    pub fn new(side: Side, snapshot: Snapshot) -> Self {
        Self {
            side,
            snapshot: RwLock::new(snapshot),
            failure: RwLock::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    /// Replaces the served snapshot.
    pub fn set_snapshot(&self, snapshot: Snapshot) {
        *self.snapshot.write() = snapshot;
    }

    /// Makes every following fetch fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write() = Some(message.into());
    }

    /// Clears a failure set by [`fail_with`](Self::fail_with).
    pub fn clear_failure(&self) {
        *self.failure.write() = None;
    }

    /// Number of fetches attempted.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for MemorySource {
    fn fetch_snapshot(&self) -> EngineResult<Snapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.read().as_ref() {
            return Err(EngineError::source(self.side, message.clone()));
        }
        Ok(self.snapshot.read().clone())
    }
}

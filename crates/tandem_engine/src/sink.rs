//! Persistence of resolved states.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use tandem_core::{BatchFingerprint, PersistError, ResolvedState, Side, Uid};

/// Acknowledgement of a persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Side the state was written to.
    pub alias: Side,
    /// Number of changes applied.
    pub applied: usize,
}

/// Writes resolved states back to their side.
pub trait StateSink: Send + Sync {
    /// Applies one side's changes.
    fn persist(&self, state: &ResolvedState) -> Result<Ack, PersistError>;

    /// Remembers that the batch rooted at `root` was ignored at `fingerprint`.
    fn record_ignored(&self, root: Uid, fingerprint: BatchFingerprint) -> Result<(), PersistError>;
}

/// An in-memory state sink for testing.
#[derive(Debug, Default)]
pub struct MemorySink {
    persisted: RwLock<Vec<ResolvedState>>,
    ignored: RwLock<BTreeMap<Uid, BatchFingerprint>>,
    failure: RwLock<Option<String>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every state persisted so far, in order.
    pub fn persisted(&self) -> Vec<ResolvedState> {
        self.persisted.read().clone()
    }

    /// Ignore records written so far.
    pub fn ignored(&self) -> BTreeMap<Uid, BatchFingerprint> {
        self.ignored.read().clone()
    }

    /// Makes every following write fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write() = Some(message.into());
    }

    /// Clears a failure set by [`fail_with`](Self::fail_with).
    pub fn clear_failure(&self) {
        *self.failure.write() = None;
    }

    fn check_failure(&self) -> Result<(), PersistError> {
        match self.failure.read().as_ref() {
            Some(message) => Err(PersistError::new(message.clone())),
            None => Ok(()),
        }
    }
}

impl StateSink for MemorySink {
    fn persist(&self, state: &ResolvedState) -> Result<Ack, PersistError> {
        self.check_failure()?;
        self.persisted.write().push(state.clone());
        Ok(Ack {
            alias: state.alias,
            applied: state.change_count(),
        })
    }

    fn record_ignored(&self, root: Uid, fingerprint: BatchFingerprint) -> Result<(), PersistError> {
        self.check_failure()?;
        self.ignored.write().insert(root, fingerprint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_and_fails() {
        let sink = MemorySink::new();
        let ack = sink.persist(&ResolvedState::new(Side::High)).unwrap();
        assert_eq!(ack, Ack { alias: Side::High, applied: 0 });
        assert_eq!(sink.persisted().len(), 1);

        sink.fail_with("read-only");
        assert_eq!(
            sink.persist(&ResolvedState::new(Side::Low)).unwrap_err().message(),
            "read-only"
        );
        assert_eq!(sink.persisted().len(), 1);
    }

    #[test]
    fn memory_sink_keeps_ignore_records() {
        let sink = MemorySink::new();
        let first = BatchFingerprint::from_bytes([1; 32]);
        let second = BatchFingerprint::from_bytes([2; 32]);

        sink.record_ignored(Uid::from_u128(1), first).unwrap();
        sink.record_ignored(Uid::from_u128(1), second).unwrap();
        assert_eq!(sink.ignored().get(&Uid::from_u128(1)), Some(&second));

        sink.fail_with("read-only");
        assert!(sink.record_ignored(Uid::from_u128(2), first).is_err());
        assert_eq!(sink.ignored().len(), 1);

        sink.clear_failure();
        sink.record_ignored(Uid::from_u128(2), first).unwrap();
        assert_eq!(sink.ignored().len(), 2);
    }
}

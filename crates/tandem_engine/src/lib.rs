//! # Tandem Engine
//!
//! Reconciliation rounds for Tandem.
//!
//! This crate provides:
//! - Round state machine (idle → fetching → diffing → resolving → persisting → done)
//! - Collaborator traits for snapshot sources, decisions and state sinks
//! - In-memory collaborators for tests and unattended runs
//!
//! ## Architecture
//!
//! One round:
//! 1. Fetch the low and high snapshots
//! 2. Diff, batch and order them
//! 3. Ask the decider about each batch that is neither suppressed nor unchanged
//! 4. Resolve every sync decision into per-side changes
//! 5. Record ignore decisions and persist each non-empty side
//!
//! ## Key Invariants
//!
//! - Snapshots are never modified by a round
//! - Cancellation is checked between phases; a cancelled round persists nothing
//! - Empty states are never persisted

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod decision;
mod engine;
mod error;
mod sink;
mod source;

pub use config::EngineConfig;
pub use decision::{Decider, FixedDecider};
pub use engine::{BatchOutcome, ReconcileEngine, ReconcileState, RoundReport, RoundStats};
pub use error::{EngineError, EngineResult};
pub use sink::{Ack, MemorySink, StateSink};
pub use source::{MemorySource, SnapshotSource};

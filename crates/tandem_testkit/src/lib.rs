//! # Tandem Testkit
//!
//! Test utilities for Tandem.
//!
//! This crate provides:
//! - Entity and snapshot fixtures with fixed identities
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use tandem_testkit::prelude::*;
//! use tandem_core::{compute_diff, PolicyRegistry};
//!
//! let pair = SnapshotPair::identical(request_tree("running"));
//! let batches = compute_diff(&pair.low, &pair.high, &PolicyRegistry::standard()).unwrap();
//! assert!(batches.iter().all(|batch| batch.is_unchanged()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

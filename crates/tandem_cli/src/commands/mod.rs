//! CLI command implementations.

pub mod diff;
pub mod document;
pub mod resolve;

use clap::ValueEnum;
use tandem_core::SyncDecision;

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Sync direction accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecisionArg {
    /// Make the high side match the low side.
    LowToHigh,
    /// Make the low side match the high side.
    HighToLow,
}

impl From<DecisionArg> for SyncDecision {
    fn from(arg: DecisionArg) -> Self {
        match arg {
            DecisionArg::LowToHigh => SyncDecision::LowToHigh,
            DecisionArg::HighToLow => SyncDecision::HighToLow,
        }
    }
}

//! Tandem CLI
//!
//! Command-line front end for diffing and resolving two snapshot documents.
//!
//! # Commands
//!
//! - `diff` - Show the batches that differ between two snapshots
//! - `resolve` - Resolve every batch in one direction and print the changes
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::{DecisionArg, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tandem two-party snapshot reconciliation.
#[derive(Parser)]
#[command(name = "tandem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the batches that differ between two snapshots
    Diff {
        /// Low side snapshot document
        #[arg(long)]
        low: PathBuf,

        /// High side snapshot document
        #[arg(long)]
        high: PathBuf,

        /// Include batches with no changes
        #[arg(short, long)]
        all: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Resolve every batch in one direction and print the changes
    Resolve {
        /// Low side snapshot document
        #[arg(long)]
        low: PathBuf,

        /// High side snapshot document
        #[arg(long)]
        high: PathBuf,

        /// Direction to sync
        #[arg(short, long, value_enum)]
        decision: DecisionArg,

        /// Delete objects that exist only on the receiving side
        #[arg(long)]
        propagate_deletes: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Diff {
            low,
            high,
            all,
            format,
        } => {
            commands::diff::run(&low, &high, all, format)?;
        }
        Commands::Resolve {
            low,
            high,
            decision,
            propagate_deletes,
            format,
        } => {
            commands::resolve::run(&low, &high, decision, propagate_deletes, format)?;
        }
        Commands::Version => {
            println!("Tandem CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Tandem Core v{}", tandem_core::VERSION);
        }
    }

    Ok(())
}

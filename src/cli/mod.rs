// src/cli/mod.rs
//! Command-line interface definitions
//!
//! Subcommands: `start` (mine against a pool), `benchmark` (self-test
//! the compute backend), `config` (write a configuration template).

/// Command and option structures (clap derive)
pub mod commands;

// Re-export for easier access
pub use commands::{Action, BenchmarkOptions, Commands, ConfigOptions, StartOptions};

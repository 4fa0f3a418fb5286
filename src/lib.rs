//! Ore Miner - multi-algorithm pool mining client in Rust
//!
//! This crate provides a complete pool mining client with support for:
//! - Twelve GPU-era hash algorithm families behind one backend trait
//! - Stratum and legacy getwork (with long polling) pool protocols
//! - Multi-threaded nonce scanning with per-worker range partitioning
//! - Share accounting and hashrate reporting

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core implementation including work generation and scheduling
pub mod miner;

/// Network communication components for pool connections
pub mod network;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{ComputeBackend, MinerState, ScanOutcome, Work, Worker};
pub use network::{RpcClient, StratumSession, WorkCmd, WorkIo};
pub use stats::ShareStats;
pub use types::AlgorithmType;
pub use utils::{CommandQueue, MinerError, init_logging};

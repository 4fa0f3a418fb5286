// src/miner/mod.rs
//! Core mining module
//!
//! Contains the shared work model, the per-algorithm compute backend
//! contract, stratum work generation, and the worker scheduler threads
//! that tie them together.

/// Compute backend trait and per-algorithm capability table
pub mod algorithm;

/// Work generation from stratum jobs
pub mod generator;

/// Worker scheduling and nonce partitioning
pub mod scheduler;

/// Shared work model and miner-wide state
pub mod work;

// Re-export for easier access
pub use algorithm::{AlgoCaps, ComputeBackend, ScanOutcome};
pub use scheduler::Worker;
pub use work::{MinerState, Work};

// src/utils/mod.rs
//! Utilities module for common functionality
//!
//! Shared infrastructure used throughout the mining application: error
//! handling, logging setup, and the blocking command queue that threads
//! use to hand work and shutdown signals to each other.

/// Error types and handling utilities
///
/// Contains the [`MinerError`] enum which defines all possible error
/// conditions for the mining application.
pub mod error;

/// Logging configuration and utilities
pub mod logging;

/// Blocking command queue with freeze-based shutdown
pub mod queue;

// Re-export for easier access
pub use error::MinerError;
pub use logging::init_logging;
pub use queue::{CommandQueue, Pop};

use std::sync::{Mutex, MutexGuard};

/// Locks a mutex, recovering the guard if a panicking thread poisoned it.
///
/// All shared miner state is replace-only under short-held locks, so a
/// poisoned value is still internally consistent.
pub(crate) fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

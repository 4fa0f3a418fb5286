// src/network/mod.rs
//! Network module for pool communication
//!
//! Three protocol paths to a mining pool: the legacy getwork JSON-RPC
//! client (with its work I/O thread), the long-poll client layered on
//! top of it, and the stratum session.

/// Long-poll client for the getwork protocol
pub mod longpoll;

/// Getwork JSON-RPC client and work I/O thread
pub mod rpc;

/// Stratum session management
pub mod stratum;

// Re-export for easier access
pub use rpc::{RpcClient, WorkCmd, WorkIo};
pub use stratum::StratumSession;

// src/stats/mod.rs
//! Statistics module for mining session accounting

/// Share counters and hashrate reporting
pub mod reporter;

// Re-export for easier access
pub use reporter::ShareStats;

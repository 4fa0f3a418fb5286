// src/stats/reporter.rs
//! Share accounting and hashrate tracking
//!
//! Producer threads record accept/reject results here as submission
//! responses arrive; worker threads publish their measured hashrates
//! after every scan. Everything lives behind one small mutex so the
//! report lines always show a consistent snapshot.

use std::sync::Mutex;

use log::{debug, info};

use crate::utils::guard;

#[derive(Debug, Default)]
struct StatsInner {
    accepted: u64,
    rejected: u64,
    hashrates: Vec<f64>,
}

/// Cumulative share counters plus per-worker hashrates.
pub struct ShareStats {
    inner: Mutex<StatsInner>,
}

impl ShareStats {
    /// Creates counters for `workers` scheduler threads.
    pub fn new(workers: usize) -> Self {
        ShareStats {
            inner: Mutex::new(StatsInner {
                accepted: 0,
                rejected: 0,
                hashrates: vec![0.0; workers],
            }),
        }
    }

    /// Records one submission result and logs the running totals.
    pub fn record_share(&self, accepted: bool, reject_reason: Option<&str>) {
        let (acc, total, rate) = {
            let mut inner = guard(&self.inner);
            if accepted {
                inner.accepted += 1;
            } else {
                inner.rejected += 1;
            }
            let total = inner.accepted + inner.rejected;
            let rate: f64 = inner.hashrates.iter().sum();
            (inner.accepted, total, rate)
        };

        info!(
            "accepted: {}/{} ({:.2}%), {:.2} khash/s {}",
            acc,
            total,
            100.0 * acc as f64 / total as f64,
            rate / 1_000.0,
            if accepted { "(yes)" } else { "(boo)" }
        );

        if let Some(reason) = reject_reason {
            debug!("reject reason: {}", reason);
        }
    }

    /// Publishes one worker's measured hashrate in hashes per second.
    pub fn set_hashrate(&self, worker: usize, rate: f64) {
        let mut inner = guard(&self.inner);
        if worker < inner.hashrates.len() {
            inner.hashrates[worker] = rate;
        }
    }

    /// One worker's last published hashrate.
    pub fn hashrate(&self, worker: usize) -> f64 {
        let inner = guard(&self.inner);
        inner.hashrates.get(worker).copied().unwrap_or(0.0)
    }

    /// Sum of all workers' hashrates.
    pub fn total_hashrate(&self) -> f64 {
        guard(&self.inner).hashrates.iter().sum()
    }

    /// Accepted and total share counts.
    pub fn snapshot(&self) -> (u64, u64) {
        let inner = guard(&self.inner);
        (inner.accepted, inner.accepted + inner.rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accepts_and_rejects() {
        let stats = ShareStats::new(1);
        stats.record_share(true, None);
        stats.record_share(true, None);
        stats.record_share(false, Some("stale"));
        assert_eq!(stats.snapshot(), (2, 3));
    }

    #[test]
    fn hashrates_sum_across_workers() {
        let stats = ShareStats::new(3);
        stats.set_hashrate(0, 1_000.0);
        stats.set_hashrate(2, 500.0);
        assert_eq!(stats.hashrate(0), 1_000.0);
        assert_eq!(stats.hashrate(1), 0.0);
        assert_eq!(stats.total_hashrate(), 1_500.0);
    }

    #[test]
    fn out_of_range_worker_is_ignored() {
        let stats = ShareStats::new(1);
        stats.set_hashrate(5, 999.0);
        assert_eq!(stats.hashrate(5), 0.0);
        assert_eq!(stats.total_hashrate(), 0.0);
    }
}

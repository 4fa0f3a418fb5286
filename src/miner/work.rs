// src/miner/work.rs
//! Shared work model
//!
//! [`Work`] is one locally materialized mining job: a 32-word block header
//! template with a nonce slot, a 256-bit target, and the stratum metadata
//! needed to submit a solution. A single [`GlobalWork`] slot behind one
//! mutex is the only job state shared between the producer threads
//! (stratum session, long-poll client, legacy RPC client) and the worker
//! scheduler threads, which copy it out under the lock before scanning.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::utils::guard;

/// Number of 32-bit words in the header template.
pub const HEADER_WORDS: usize = 32;

/// Index of the nonce word inside the header template.
///
/// This is the only header word workers mutate locally; everything else
/// is fixed for the lifetime of one [`Work`] instance.
pub const NONCE_INDEX: usize = 19;

/// One mining job instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Work {
    /// Block header template: version, previous hash, merkle root, time,
    /// difficulty bits, nonce at [`NONCE_INDEX`], and padding.
    pub data: [u32; HEADER_WORDS],

    /// 256-bit share threshold as little-endian-ordered words; a found
    /// hash must be numerically <= this value.
    pub target: [u32; 8],

    /// Maximum block reward vote advertised for the voting family;
    /// zero for every other algorithm.
    pub max_vote: u32,

    /// Server-assigned job identifier (stratum mode only).
    pub job_id: String,

    /// Extranonce2 bytes this work unit was generated with; length is
    /// fixed per stratum session.
    pub xnonce2: Vec<u8>,
}

impl Work {
    /// Current nonce word.
    pub fn nonce(&self) -> u32 {
        self.data[NONCE_INDEX]
    }

    /// Sets the nonce word.
    pub fn set_nonce(&mut self, nonce: u32) {
        self.data[NONCE_INDEX] = nonce;
    }

    /// Whether `self` and `other` are the same scan unit: all header
    /// words before the nonce are equal. Distinct extranonce2 rolls of
    /// one stratum job differ in their merkle root and therefore count
    /// as different scan units.
    pub fn same_scan_unit(&self, other: &Work) -> bool {
        self.data[..NONCE_INDEX] == other.data[..NONCE_INDEX]
    }

    /// Whether `self` and `other` build on the same previous block.
    ///
    /// Used as the submission staleness check: a solution for an older
    /// extranonce2 roll of the current block is still worth sending, a
    /// solution for a superseded block is not. Deliberately weaker than
    /// [`Work::same_scan_unit`].
    pub fn same_parent_block(&self, other: &Work) -> bool {
        self.data[1..9] == other.data[1..9]
    }
}

/// The single shared work slot plus its freshness stamp.
#[derive(Debug, Default)]
pub struct GlobalWork {
    /// Most recently produced work unit.
    pub work: Work,

    /// Unix seconds when [`GlobalWork::work`] was acquired; zero means
    /// no job has been produced yet (or the stratum session reset it
    /// while reconnecting).
    pub acquired_at: i64,
}

/// Process-wide mutable state shared across all miner threads.
///
/// The work slot is the only state shared by identity; it is protected by
/// one short-held lock (copy-out-and-release, never held across a network
/// call or a backend dispatch). The per-worker restart flags are
/// deliberately unsynchronized best-effort signals: a missed observation
/// costs one extra bounded scan, never correctness.
pub struct MinerState {
    /// Shared work slot.
    pub global: Mutex<GlobalWork>,

    restart: Vec<AtomicBool>,

    /// Whether the stratum session is currently the job source.
    pub have_stratum: AtomicBool,

    /// Whether long polling is available on the legacy RPC path.
    pub have_longpoll: AtomicBool,

    /// Server-advertised flag: submit solutions even when they look
    /// stale by the timestamp check.
    pub submit_old: AtomicBool,
}

impl MinerState {
    /// Creates state for `workers` scheduler threads.
    pub fn new(workers: usize) -> Self {
        MinerState {
            global: Mutex::new(GlobalWork::default()),
            restart: (0..workers).map(|_| AtomicBool::new(false)).collect(),
            have_stratum: AtomicBool::new(false),
            have_longpoll: AtomicBool::new(false),
            submit_old: AtomicBool::new(false),
        }
    }

    /// Number of worker threads this state was sized for.
    pub fn workers(&self) -> usize {
        self.restart.len()
    }

    /// Signals every worker that in-flight scans are based on stale work.
    pub fn restart_workers(&self) {
        for flag in &self.restart {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Clears one worker's restart flag; called by the owning worker
    /// when it begins a new scan.
    pub fn clear_restart(&self, worker: usize) {
        self.restart[worker].store(false, Ordering::Relaxed);
    }

    /// Best-effort check of one worker's restart flag.
    pub fn restart_requested(&self, worker: usize) -> bool {
        self.restart[worker].load(Ordering::Relaxed)
    }

    /// Restart flag handle for passing into a compute backend scan.
    pub fn restart_flag(&self, worker: usize) -> &AtomicBool {
        &self.restart[worker]
    }

    /// Moves the work acquisition stamp backward so workers treat the
    /// current job as older than it is and refresh sooner.
    pub fn rewind_work_time(&self, secs: i64) {
        let mut global = guard(&self.global);
        if global.acquired_at > 0 {
            global.acquired_at -= secs;
        }
    }

    /// Clears the acquisition stamp, marking the slot as holding no
    /// current job.
    pub fn clear_work_time(&self) {
        guard(&self.global).acquired_at = 0;
    }

    /// Reads the acquisition stamp under the lock.
    pub fn work_time(&self) -> i64 {
        guard(&self.global).acquired_at
    }
}

/// Current wall-clock time as unix seconds.
pub fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_work() -> Work {
        let mut work = Work::default();
        for (i, word) in work.data.iter_mut().enumerate() {
            *word = i as u32 + 1;
        }
        work
    }

    #[test]
    fn same_scan_unit_ignores_nonce() {
        let a = sample_work();
        let mut b = a.clone();
        b.set_nonce(0xdead_beef);
        assert!(a.same_scan_unit(&b));

        b.data[9] ^= 1; // merkle root word
        assert!(!a.same_scan_unit(&b));
    }

    #[test]
    fn same_parent_block_only_compares_prevhash() {
        let a = sample_work();
        let mut b = a.clone();
        b.data[9] ^= 1; // merkle root differs, prevhash identical
        b.set_nonce(42);
        assert!(a.same_parent_block(&b));

        b.data[1] ^= 1;
        assert!(!a.same_parent_block(&b));
    }

    #[test]
    fn restart_flags_broadcast_and_clear() {
        let state = MinerState::new(2);
        assert!(!state.restart_requested(0));

        state.restart_workers();
        assert!(state.restart_requested(0));
        assert!(state.restart_requested(1));

        state.clear_restart(0);
        assert!(!state.restart_requested(0));
        assert!(state.restart_requested(1));
    }

    #[test]
    fn rewind_leaves_empty_slot_alone() {
        let state = MinerState::new(1);
        state.rewind_work_time(60);
        assert_eq!(state.work_time(), 0);

        guard(&state.global).acquired_at = 1000;
        state.rewind_work_time(60);
        assert_eq!(state.work_time(), 940);
    }
}

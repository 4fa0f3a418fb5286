// src/miner/scheduler.rs
//! Worker scheduling: nonce partitioning, work refresh, and scan pacing
//!
//! Each worker owns a fixed slice of the 32-bit nonce space and loops:
//! refresh its local copy of the shared work when stale, pick a scan
//! bound sized to the configured scan time at the last measured rate,
//! hand the range to the compute backend, then account the result.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::miner::algorithm::{AlgoCaps, ComputeBackend};
use crate::miner::work::{MinerState, Work, unix_time};
use crate::network::longpoll::LP_SCANTIME;
use crate::network::rpc::{WorkCmd, should_submit};
use crate::network::stratum::StratumSession;
use crate::stats::ShareStats;
use crate::utils::{CommandQueue, MinerError, Pop, guard};

/// Nonces held back at the top of each worker's range so neighbouring
/// ranges never touch.
pub const GUARD_BAND: u32 = 0x20;

/// Seconds after which stratum work is considered too old to scan.
pub const STRATUM_MAX_AGE: i64 = 60;

/// Hashrate ceiling; measurements above it indicate a broken backend or
/// timer and are fatal.
pub const MAX_SANE_HASHRATE: f64 = 1e8;

/// The nonce slice `[start, end]` owned by one worker.
pub fn nonce_range(worker: usize, workers: usize) -> (u32, u32) {
    let span = u32::MAX / workers as u32;
    let start = span * worker as u32;
    let end = span * (worker as u32 + 1) - GUARD_BAND;
    (start, end)
}

/// Aligns the worker's local work with the shared slot.
///
/// A changed scan unit is adopted wholesale with the nonce reset to the
/// worker's range start; otherwise the local nonce just advances past
/// the last scanned value. Returns whether new work was adopted.
pub fn sync_local_work(local: &mut Work, global: &Work, start_nonce: u32) -> bool {
    if local.same_scan_unit(global) {
        local.set_nonce(local.nonce().wrapping_add(1));
        false
    } else {
        *local = global.clone();
        local.set_nonce(start_nonce);
        true
    }
}

/// One scheduler thread driving one compute backend slot.
pub struct Worker {
    id: usize,
    cfg: Arc<Config>,
    caps: AlgoCaps,
    ctx: Arc<MinerState>,
    stats: Arc<ShareStats>,
    workio: Arc<CommandQueue<WorkCmd>>,
    stratum: Option<Arc<StratumSession>>,
    backend: Arc<dyn ComputeBackend>,
}

impl Worker {
    /// Creates worker `id` of `ctx.workers()`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        cfg: Arc<Config>,
        caps: AlgoCaps,
        ctx: Arc<MinerState>,
        stats: Arc<ShareStats>,
        workio: Arc<CommandQueue<WorkCmd>>,
        stratum: Option<Arc<StratumSession>>,
        backend: Arc<dyn ComputeBackend>,
    ) -> Self {
        Worker {
            id,
            cfg,
            caps,
            ctx,
            stats,
            workio,
            stratum,
            backend,
        }
    }

    /// Worker thread entry point; returns when mining can no longer
    /// proceed (fatal fault or frozen pipeline).
    pub fn run(&self) {
        let (start_nonce, end_nonce) = nonce_range(self.id, self.ctx.workers());
        let reply: Arc<CommandQueue<Work>> = Arc::new(CommandQueue::new());
        let mut work = Work::default();

        loop {
            if !self.refresh_work(&mut work, &reply, start_nonce, end_nonce) {
                return;
            }
            self.ctx.clear_restart(self.id);

            let max_nonce = self.scan_bound(&work, end_nonce);
            let started = Instant::now();
            let outcome = match self.backend.scan(
                &mut work.data,
                &work.target,
                max_nonce,
                self.ctx.restart_flag(self.id),
            ) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("worker {}: scan failed: {}", self.id, e);
                    let _ = self.workio.push(WorkCmd::Shutdown);
                    return;
                }
            };

            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > 0.0 && outcome.hashes_done > 0 {
                let rate = outcome.hashes_done as f64 / elapsed;
                self.stats.set_hashrate(self.id, rate);
                if rate > MAX_SANE_HASHRATE {
                    let fault = MinerError::MeasurementFault(format!(
                        "abnormal hashrate {:.0} H/s",
                        rate
                    ));
                    error!("worker {}: {}, shutting down", self.id, fault);
                    let _ = self.workio.push(WorkCmd::Shutdown);
                    return;
                }
            }

            if self.cfg.benchmark {
                info!(
                    "benchmark: {:.2} khash/s over {} hashes",
                    self.stats.hashrate(self.id) / 1_000.0,
                    outcome.hashes_done
                );
                let _ = self.workio.push(WorkCmd::Shutdown);
                return;
            }

            if outcome.found && !self.submit(&work) {
                return;
            }
        }
    }

    /// Brings the local work up to date, blocking as long as necessary.
    /// Returns false when the work pipeline is gone.
    fn refresh_work(
        &self,
        work: &mut Work,
        reply: &Arc<CommandQueue<Work>>,
        start_nonce: u32,
        end_nonce: u32,
    ) -> bool {
        if self.stratum.is_some() {
            // Never scan a stratum job older than the staleness bound;
            // the session zeroes the stamp while disconnected.
            while unix_time() >= self.ctx.work_time() + STRATUM_MAX_AGE {
                thread::sleep(Duration::from_secs(1));
            }

            let mut global = guard(&self.ctx.global);
            if work.nonce() >= end_nonce {
                if let Some(stratum) = &self.stratum {
                    stratum.regen_global(&mut global);
                }
            }
            sync_local_work(work, &global.work, start_nonce);
            return true;
        }

        let mut global = guard(&self.ctx.global);
        let refresh_due = !self.ctx.have_longpoll.load(Ordering::SeqCst)
            || unix_time() >= global.acquired_at + LP_SCANTIME * 3 / 4
            || work.nonce() >= end_nonce;
        if refresh_due {
            // The slot lock is held across the fetch so every worker
            // adopts the same refreshed job.
            if self
                .workio
                .push(WorkCmd::GetWork {
                    reply: Arc::clone(reply),
                })
                .is_err()
            {
                warn!("worker {}: work pipeline is closed, exiting", self.id);
                return false;
            }
            match reply.pop(None) {
                Pop::Item(fresh) => {
                    global.work = fresh;
                    global.acquired_at = unix_time();
                }
                _ => {
                    warn!("worker {}: work retrieval failed, exiting", self.id);
                    return false;
                }
            }
        }

        let adopted = sync_local_work(work, &global.work, start_nonce);
        drop(global);

        if adopted && self.caps.uses_vote {
            self.apply_vote(work);
        }
        true
    }

    /// Packs the operator's reward vote into header word 20, clamped to
    /// the pool's advertised ceiling when the pool is trusted.
    fn apply_vote(&self, work: &mut Work) {
        let mut vote = self.cfg.vote.unwrap_or(0);
        if u32::from(vote) > work.max_vote {
            if self.cfg.trust_pool {
                warn!(
                    "reward vote {} exceeds pool maximum {}, reducing",
                    vote, work.max_vote
                );
                vote = work.max_vote as u16;
            } else {
                warn!(
                    "reward vote {} exceeds pool maximum {}",
                    vote, work.max_vote
                );
            }
        }
        work.data[20] = (work.data[20] & 0xffff_0000) | u32::from(vote);
    }

    /// Picks the scan ceiling for this round: the scan-time budget at
    /// the last measured rate, clamped to the worker's range end.
    fn scan_bound(&self, work: &Work, end_nonce: u32) -> u32 {
        let budget_secs = if self.stratum.is_some() {
            LP_SCANTIME
        } else {
            let horizon = if self.ctx.have_longpoll.load(Ordering::SeqCst) {
                LP_SCANTIME
            } else {
                self.cfg.scantime as i64
            };
            self.ctx.work_time() + horizon - unix_time()
        };

        let mut span = (budget_secs as f64 * self.stats.hashrate(self.id)) as i64;
        if span <= 0 {
            span = self.caps.min_scan_chunk as i64;
        }

        if i64::from(work.nonce()) + span > i64::from(end_nonce) {
            end_nonce
        } else {
            (i64::from(work.nonce()) + span) as u32
        }
    }

    /// Routes one solution to the active submission path. Returns false
    /// when the pipeline is gone.
    fn submit(&self, work: &Work) -> bool {
        debug!("worker {}: solution at nonce {:#010x}", self.id, work.nonce());

        if let Some(stratum) = &self.stratum {
            let fresh = {
                let global = guard(&self.ctx.global);
                should_submit(
                    work,
                    &global.work,
                    self.ctx.submit_old.load(Ordering::SeqCst),
                )
            };
            if !fresh {
                debug!("stale work detected, discarding share");
                return true;
            }
            if let Err(e) = stratum.submit(work) {
                warn!("share submission over stratum failed: {}", e);
            }
            return true;
        }

        self.workio
            .push(WorkCmd::SubmitWork(Box::new(work.clone())))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::{CpuBackend, caps};
    use crate::types::AlgorithmType;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn ranges_are_disjoint_and_guarded() {
        let workers = 4;
        let mut previous_end = None;
        for id in 0..workers {
            let (start, end) = nonce_range(id, workers);
            assert!(start < end);
            if let Some(prev) = previous_end {
                // The guard band separates this start from the
                // neighbour's end.
                assert!(start > prev);
                assert_eq!(start - prev, GUARD_BAND);
            }
            previous_end = Some(end);
        }
    }

    #[test]
    fn single_worker_owns_nearly_everything() {
        let (start, end) = nonce_range(0, 1);
        assert_eq!(start, 0);
        assert_eq!(end, u32::MAX - GUARD_BAND);
    }

    #[test]
    fn changed_work_is_adopted_at_range_start() {
        let mut global = Work::default();
        global.data[9] = 0xfeed;
        let mut local = Work::default();
        local.set_nonce(123);

        assert!(sync_local_work(&mut local, &global, 0x4000_0000));
        assert_eq!(local.data[9], 0xfeed);
        assert_eq!(local.nonce(), 0x4000_0000);
    }

    #[test]
    fn unchanged_work_just_advances_the_nonce() {
        let global = Work::default();
        let mut local = global.clone();
        local.set_nonce(123);

        assert!(!sync_local_work(&mut local, &global, 0));
        assert_eq!(local.nonce(), 124);
    }

    #[test]
    fn identical_job_at_range_ceiling_survives_the_round() {
        let (start, end) = nonce_range(0, 1);
        let global = Work::default();
        let mut local = global.clone();
        local.set_nonce(end);

        // A refresh that returns the same job only advances the nonce,
        // pushing it one past the range ceiling.
        assert!(!sync_local_work(&mut local, &global, start));
        assert_eq!(local.nonce(), end + 1);

        // The backend must treat the spent range as a no-op round so
        // the worker loops back to refresh instead of shutting down.
        let backend = CpuBackend::new(caps(AlgorithmType::Quark));
        let restart = AtomicBool::new(false);
        let outcome = backend
            .scan(&mut local.data, &local.target, end, &restart)
            .unwrap();
        assert!(!outcome.found);
        assert_eq!(outcome.hashes_done, 0);
    }

    #[test]
    fn clean_job_forces_adoption_mid_scan() {
        let ctx = MinerState::new(2);
        let mut local_a = Work::default();
        local_a.set_nonce(5000);
        let mut local_b = Work::default();
        local_b.set_nonce(0x9000_0000);

        // A clean notify regenerates the slot and raises every flag.
        {
            let mut global = guard(&ctx.global);
            global.work.data[9] = 0xabcd;
            global.acquired_at = unix_time();
        }
        ctx.restart_workers();

        assert!(ctx.restart_requested(0));
        assert!(ctx.restart_requested(1));

        let global = guard(&ctx.global);
        let (start_a, _) = nonce_range(0, 2);
        let (start_b, _) = nonce_range(1, 2);
        assert!(sync_local_work(&mut local_a, &global.work, start_a));
        assert!(sync_local_work(&mut local_b, &global.work, start_b));
        assert_eq!(local_a.data[9], 0xabcd);
        assert_eq!(local_b.data[9], 0xabcd);
        assert_eq!(local_a.nonce(), start_a);
        assert_eq!(local_b.nonce(), start_b);
    }
}

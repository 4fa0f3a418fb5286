// src/miner/algorithm/cpu.rs
//! CPU reference backend
//!
//! A portable implementation of the [`ComputeBackend`] contract. It
//! serializes the header template once, then patches the nonce bytes in
//! place per attempt, digests with the algorithm family's combine
//! function, and checks the result against the share target. Useful for
//! exercising the whole pipeline and as the model other devices must
//! follow for restart polling and hash accounting.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::miner::algorithm::{AlgoCaps, ComputeBackend, ScanOutcome};
use crate::miner::work::{HEADER_WORDS, NONCE_INDEX};
use crate::utils::MinerError;

/// How many nonces are hashed between restart-flag polls.
const RESTART_POLL_INTERVAL: u32 = 0x3f;

/// Software nonce scanner driven by the capability table.
pub struct CpuBackend {
    caps: AlgoCaps,
}

impl CpuBackend {
    /// Creates a backend for one algorithm's capabilities.
    pub fn new(caps: AlgoCaps) -> Self {
        CpuBackend { caps }
    }

    /// Whether `hash` (32 little-endian-ordered bytes) is numerically
    /// at or below `target`.
    fn meets_target(hash: &[u8; 32], target: &[u32; 8]) -> bool {
        // Compare from the most significant word down.
        for i in (0..8).rev() {
            let word = u32::from_le_bytes([
                hash[i * 4],
                hash[i * 4 + 1],
                hash[i * 4 + 2],
                hash[i * 4 + 3],
            ]);
            if word > target[i] {
                return false;
            }
            if word < target[i] {
                return true;
            }
        }
        true
    }
}

impl ComputeBackend for CpuBackend {
    fn scan(
        &self,
        data: &mut [u32; HEADER_WORDS],
        target: &[u32; 8],
        max_nonce: u32,
        restart: &AtomicBool,
    ) -> Result<ScanOutcome, MinerError> {
        let start = data[NONCE_INDEX];
        if start > max_nonce {
            // The range is already spent; happens when a refresh returns
            // a byte-identical job at the range ceiling.
            return Ok(ScanOutcome {
                found: false,
                hashes_done: 0,
            });
        }

        let mut header = vec![0u8; self.caps.header_len];
        for (i, chunk) in header.chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&data[i].to_le_bytes());
        }

        let mut nonce = start;
        loop {
            header[NONCE_INDEX * 4..NONCE_INDEX * 4 + 4].copy_from_slice(&nonce.to_le_bytes());
            let hash = self.caps.merkle.digest(&header);

            if Self::meets_target(&hash, target) {
                data[NONCE_INDEX] = nonce;
                return Ok(ScanOutcome {
                    found: true,
                    hashes_done: u64::from(nonce - start) + 1,
                });
            }

            if nonce & RESTART_POLL_INTERVAL == 0 && restart.load(Ordering::Relaxed) {
                data[NONCE_INDEX] = nonce;
                return Ok(ScanOutcome {
                    found: false,
                    hashes_done: u64::from(nonce - start) + 1,
                });
            }

            if nonce == max_nonce {
                data[NONCE_INDEX] = nonce;
                return Ok(ScanOutcome {
                    found: false,
                    hashes_done: u64::from(nonce - start) + 1,
                });
            }
            nonce += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::caps;
    use crate::types::AlgorithmType;

    fn template() -> [u32; HEADER_WORDS] {
        let mut data = [0u32; HEADER_WORDS];
        for (i, word) in data.iter_mut().enumerate() {
            *word = 0x1000 + i as u32;
        }
        data[NONCE_INDEX] = 0;
        data
    }

    #[test]
    fn permissive_target_matches_first_nonce() {
        let backend = CpuBackend::new(caps(AlgorithmType::Quark));
        let mut data = template();
        let target = [u32::MAX; 8];
        let restart = AtomicBool::new(false);

        let outcome = backend.scan(&mut data, &target, 1000, &restart).unwrap();
        assert!(outcome.found);
        assert_eq!(outcome.hashes_done, 1);
        assert_eq!(data[NONCE_INDEX], 0);
    }

    #[test]
    fn impossible_target_exhausts_range() {
        let backend = CpuBackend::new(caps(AlgorithmType::Quark));
        let mut data = template();
        let target = [0u32; 8];
        let restart = AtomicBool::new(false);

        let outcome = backend.scan(&mut data, &target, 99, &restart).unwrap();
        assert!(!outcome.found);
        assert_eq!(outcome.hashes_done, 100);
        assert_eq!(data[NONCE_INDEX], 99);
    }

    #[test]
    fn restart_flag_aborts_scan_early() {
        let backend = CpuBackend::new(caps(AlgorithmType::Quark));
        let mut data = template();
        let target = [0u32; 8];
        let restart = AtomicBool::new(true);

        let outcome = backend
            .scan(&mut data, &target, u32::MAX - 1, &restart)
            .unwrap();
        assert!(!outcome.found);
        assert!(outcome.hashes_done <= u64::from(RESTART_POLL_INTERVAL) + 1);
    }

    #[test]
    fn start_beyond_bound_is_an_empty_round() {
        let backend = CpuBackend::new(caps(AlgorithmType::Quark));
        let mut data = template();
        data[NONCE_INDEX] = 500;
        let restart = AtomicBool::new(false);

        let outcome = backend.scan(&mut data, &[0; 8], 100, &restart).unwrap();
        assert!(!outcome.found);
        assert_eq!(outcome.hashes_done, 0);
        assert_eq!(data[NONCE_INDEX], 500);
    }

    #[test]
    fn meets_target_compares_most_significant_first() {
        let mut hash = [0u8; 32];
        let mut target = [0u32; 8];
        target[7] = 1;

        // hash == 0 < target
        assert!(CpuBackend::meets_target(&hash, &target));

        // top word equal, next word decides
        hash[28..32].copy_from_slice(&1u32.to_le_bytes());
        hash[24..28].copy_from_slice(&5u32.to_le_bytes());
        assert!(!CpuBackend::meets_target(&hash, &target));

        target[6] = 5;
        assert!(CpuBackend::meets_target(&hash, &target));
    }
}

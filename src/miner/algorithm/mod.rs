// src/miner/algorithm/mod.rs
//! Compute backend contract and per-algorithm capability table
//!
//! The scheduler is backend-agnostic: it hands a header template, a
//! target, a nonce bound, and a restart flag to a [`ComputeBackend`] and
//! gets back whether a share was found and how many hashes were tried.
//! Everything else the pipeline needs to know about an algorithm family
//! (merkle combine function, header byte order, padding word, difficulty
//! scaling) lives in [`AlgoCaps`], so the generator and scheduler never
//! branch on the algorithm name directly.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use sha2::{Digest, Sha256, Sha512_256};

use crate::miner::work::HEADER_WORDS;
use crate::types::AlgorithmType;
use crate::utils::MinerError;

/// CPU reference backend
pub mod cpu;

pub use cpu::CpuBackend;

/// Result of one bounded nonce scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// A nonce satisfying the target was found and written back into
    /// the header template.
    pub found: bool,
    /// Number of nonces actually hashed, for hashrate measurement.
    pub hashes_done: u64,
}

/// A nonce-scanning compute device.
///
/// Implementations must honor the contract the scheduler depends on:
/// start from the nonce currently in `data`, never exceed `max_nonce`,
/// poll `restart` often enough to abandon a stale scan promptly, report
/// honest `hashes_done` in every outcome, and on success leave the
/// winning nonce in the template's nonce slot. A start already past
/// `max_nonce` is an empty round, not an error.
pub trait ComputeBackend: Send + Sync {
    /// Scans nonces from `data`'s current nonce up to `max_nonce`.
    fn scan(
        &self,
        data: &mut [u32; HEADER_WORDS],
        target: &[u32; 8],
        max_nonce: u32,
        restart: &AtomicBool,
    ) -> Result<ScanOutcome, MinerError>;
}

/// Hash function used to fold the coinbase and merkle branches into the
/// header's merkle root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerkleCombine {
    /// SHA-256 applied twice.
    DoubleSha256,
    /// A single SHA-256 pass.
    SingleSha256,
    /// Truncated SHA-512 applied twice, for the voting header family.
    DoubleSha512_256,
}

impl MerkleCombine {
    /// Digests `input` into a 32-byte value.
    pub fn digest(&self, input: &[u8]) -> [u8; 32] {
        match self {
            MerkleCombine::DoubleSha256 => {
                let first = Sha256::digest(input);
                Sha256::digest(first).into()
            }
            MerkleCombine::SingleSha256 => Sha256::digest(input).into(),
            MerkleCombine::DoubleSha512_256 => {
                let first = Sha512_256::digest(input);
                Sha512_256::digest(first).into()
            }
        }
    }
}

/// Per-algorithm constants consumed by the work generator and scheduler.
#[derive(Debug, Clone, Copy)]
pub struct AlgoCaps {
    /// Family digest: hashes the coinbase transaction and drives the
    /// reference backend.
    pub merkle: MerkleCombine,
    /// Digest folding each merkle branch into the root. Only the voting
    /// header family deviates from double SHA-256 here.
    pub merkle_branch: MerkleCombine,
    /// Whether header words 0..20 are byte-swapped after assembly.
    pub swap_header_words: bool,
    /// Value of the final padding word (header word 31).
    pub padding_word: u32,
    /// Divisor applied to the pool difficulty before target derivation.
    pub scale_divisor: f64,
    /// Scan chunk size used before a hashrate estimate exists.
    pub min_scan_chunk: u64,
    /// Header bytes hashed by the reference backend.
    pub header_len: usize,
    /// Whether the header carries a reward vote in word 20.
    pub uses_vote: bool,
}

/// Capability table lookup for one algorithm.
pub fn caps(algo: AlgorithmType) -> AlgoCaps {
    let merkle = match algo {
        AlgorithmType::Fugue256 | AlgorithmType::Groestl => MerkleCombine::SingleSha256,
        AlgorithmType::Heavy | AlgorithmType::Mjollnir => MerkleCombine::DoubleSha512_256,
        _ => MerkleCombine::DoubleSha256,
    };

    let merkle_branch = match algo {
        AlgorithmType::Heavy | AlgorithmType::Mjollnir => MerkleCombine::DoubleSha512_256,
        _ => MerkleCombine::DoubleSha256,
    };

    let scale_divisor = match algo {
        AlgorithmType::Jackpot => 65536.0,
        AlgorithmType::Fugue256 | AlgorithmType::Groestl | AlgorithmType::DmdGr => 256.0,
        _ => 1.0,
    };

    AlgoCaps {
        merkle,
        merkle_branch,
        swap_header_words: matches!(algo, AlgorithmType::Heavy | AlgorithmType::Mjollnir),
        padding_word: if algo == AlgorithmType::Mjollnir {
            0x0000_02A0
        } else {
            0x0000_0280
        },
        scale_divisor,
        min_scan_chunk: if algo == AlgorithmType::Jackpot {
            0x1fff
        } else {
            0xf_ffff
        },
        header_len: if algo == AlgorithmType::Heavy { 84 } else { 80 },
        uses_vote: algo.uses_vote(),
    }
}

/// Instantiates the compute backend for one algorithm.
pub fn backend(algo: AlgorithmType) -> Arc<dyn ComputeBackend> {
    Arc::new(CpuBackend::new(caps(algo)))
}

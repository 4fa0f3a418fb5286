// src/miner/generator.rs
//! Work generation from stratum job notifications
//!
//! Turns the fields of a `mining.notify` job plus the session extranonce
//! into a concrete [`Work`] header template. The recipe is fixed per
//! algorithm family through [`AlgoCaps`]: digest the coinbase with the
//! family hash, fold each merkle branch with the branch hash, lay the
//! words into the header in the byte order the family expects, and
//! derive the share target from the pool difficulty.

use crate::miner::algorithm::AlgoCaps;
use crate::miner::work::Work;
use crate::network::stratum::StratumJob;

/// Inputs that stay constant for the lifetime of one session.
#[derive(Debug, Clone, Copy)]
pub struct GenOptions<'a> {
    /// Algorithm capability table entry.
    pub caps: &'a AlgoCaps,
    /// Reward vote to embed for the voting family.
    pub vote: u16,
    /// User-supplied difficulty multiplier.
    pub difficulty: f64,
}

/// Materializes one work unit from the current job, then advances the
/// job's extranonce2 counter so the next call produces a distinct unit.
pub fn gen_work(job: &mut StratumJob, xnonce1: &[u8], opts: &GenOptions) -> Work {
    let caps = opts.caps;

    // Coinbase transaction with both extranonce parts spliced in.
    let mut coinbase = Vec::with_capacity(
        job.coinbase1.len() + xnonce1.len() + job.xnonce2.len() + job.coinbase2.len(),
    );
    coinbase.extend_from_slice(&job.coinbase1);
    coinbase.extend_from_slice(xnonce1);
    coinbase.extend_from_slice(&job.xnonce2);
    coinbase.extend_from_slice(&job.coinbase2);

    let mut merkle_root = caps.merkle.digest(&coinbase);
    for branch in &job.merkle {
        let mut pair = [0u8; 64];
        pair[..32].copy_from_slice(&merkle_root);
        pair[32..].copy_from_slice(branch);
        merkle_root = caps.merkle_branch.digest(&pair);
    }

    let mut work = Work {
        job_id: job.job_id.clone(),
        xnonce2: job.xnonce2.clone(),
        ..Work::default()
    };

    work.data[0] = u32::from_le_bytes(job.version);
    for i in 0..8 {
        work.data[1 + i] = le_word(&job.prevhash, i);
    }
    for i in 0..8 {
        work.data[9 + i] = be_word(&merkle_root, i);
    }
    work.data[17] = u32::from_le_bytes(job.ntime);
    work.data[18] = u32::from_le_bytes(job.nbits);
    work.data[20] = 0x8000_0000;
    work.data[31] = caps.padding_word;

    if caps.uses_vote {
        let reward = u16::from_be_bytes(job.nreward);
        work.max_vote = 1024;
        work.data[20] = u32::from(opts.vote) | u32::from(reward) << 16;
    }

    if caps.swap_header_words {
        for word in &mut work.data[..20] {
            *word = word.swap_bytes();
        }
    }

    diff_to_target(
        &mut work.target,
        job.diff / (caps.scale_divisor * opts.difficulty),
    );

    increment_xnonce2(&mut job.xnonce2);
    work
}

/// Expands a compact difficulty value into a 256-bit share target.
///
/// The target is laid out as eight little-endian-ordered words; a hash
/// qualifies when it is numerically at or below the target. Difficulty
/// 1.0 yields the conventional base target with word 6 set to
/// `0xffff0000`.
pub fn diff_to_target(target: &mut [u32; 8], diff: f64) {
    let mut diff = diff;
    let mut k = 6usize;
    while k > 0 && diff > 1.0 {
        diff /= 4_294_967_296.0;
        k -= 1;
    }

    let m = (4_294_901_760.0 / diff) as u64;
    if m == 0 && k == 6 {
        target.fill(u32::MAX);
    } else {
        target.fill(0);
        target[k] = m as u32;
        target[k + 1] = (m >> 32) as u32;
    }
}

/// Advances the extranonce2 counter, treating the bytes as a
/// little-endian integer that wraps to all zeros on overflow.
pub fn increment_xnonce2(xnonce2: &mut [u8]) {
    for byte in xnonce2.iter_mut() {
        let (next, carry) = byte.overflowing_add(1);
        *byte = next;
        if !carry {
            break;
        }
    }
}

fn le_word(bytes: &[u8; 32], i: usize) -> u32 {
    u32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
}

fn be_word(bytes: &[u8; 32], i: usize) -> u32 {
    u32::from_be_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::caps;
    use crate::types::AlgorithmType;
    use hex_literal::hex;
    use sha2::{Digest, Sha256};

    fn sample_job() -> StratumJob {
        let mut prevhash = [0u8; 32];
        for (i, b) in prevhash.iter_mut().enumerate() {
            *b = i as u8;
        }
        StratumJob {
            job_id: "42a".to_string(),
            prevhash,
            coinbase1: hex!("010203").to_vec(),
            coinbase2: hex!("0405").to_vec(),
            merkle: vec![[0xaa; 32]],
            version: hex!("02000000"),
            nbits: hex!("1d00ffff"),
            ntime: hex!("53058b1a"),
            clean: false,
            diff: 1.0,
            nreward: hex!("0102"),
            xnonce2: vec![0x07, 0x00],
        }
    }

    #[test]
    fn header_words_follow_job_fields() {
        let caps = caps(AlgorithmType::Quark);
        let mut job = sample_job();
        let opts = GenOptions {
            caps: &caps,
            vote: 0,
            difficulty: 1.0,
        };

        let work = gen_work(&mut job, &[0xab, 0xcd], &opts);

        assert_eq!(work.data[0], 0x0000_0002);
        assert_eq!(work.data[1], u32::from_le_bytes([0, 1, 2, 3]));
        assert_eq!(work.data[8], u32::from_le_bytes([28, 29, 30, 31]));
        assert_eq!(work.data[17], u32::from_le_bytes([0x53, 0x05, 0x8b, 0x1a]));
        assert_eq!(work.data[18], u32::from_le_bytes([0x1d, 0x00, 0xff, 0xff]));
        assert_eq!(work.data[19], 0);
        assert_eq!(work.data[20], 0x8000_0000);
        assert_eq!(work.data[31], 0x0000_0280);
        assert_eq!(work.job_id, "42a");
        assert_eq!(work.xnonce2, vec![0x07, 0x00]);

        // Re-derive the merkle root independently.
        let coinbase = [
            &[0x01, 0x02, 0x03][..],
            &[0xab, 0xcd],
            &[0x07, 0x00],
            &[0x04, 0x05],
        ]
        .concat();
        let mut root: [u8; 32] = Sha256::digest(Sha256::digest(&coinbase)).into();
        let mut pair = [0u8; 64];
        pair[..32].copy_from_slice(&root);
        pair[32..].copy_from_slice(&[0xaa; 32]);
        root = Sha256::digest(Sha256::digest(pair)).into();
        assert_eq!(work.data[9], be_word(&root, 0));
        assert_eq!(work.data[16], be_word(&root, 7));
    }

    #[test]
    fn single_pass_coinbase_still_folds_branches_twice() {
        let caps = caps(AlgorithmType::Fugue256);
        let mut job = sample_job();
        let opts = GenOptions {
            caps: &caps,
            vote: 0,
            difficulty: 1.0,
        };

        let work = gen_work(&mut job, &[0xab, 0xcd], &opts);

        // The coinbase is digested once, but every branch combine is
        // still double SHA-256.
        let coinbase = [
            &[0x01, 0x02, 0x03][..],
            &[0xab, 0xcd],
            &[0x07, 0x00],
            &[0x04, 0x05],
        ]
        .concat();
        let mut root: [u8; 32] = Sha256::digest(&coinbase).into();
        let mut pair = [0u8; 64];
        pair[..32].copy_from_slice(&root);
        pair[32..].copy_from_slice(&[0xaa; 32]);
        root = Sha256::digest(Sha256::digest(pair)).into();
        assert_eq!(work.data[9], be_word(&root, 0));
        assert_eq!(work.data[16], be_word(&root, 7));
    }

    #[test]
    fn extranonce2_advances_per_work_unit() {
        let caps = caps(AlgorithmType::Quark);
        let mut job = sample_job();
        let opts = GenOptions {
            caps: &caps,
            vote: 0,
            difficulty: 1.0,
        };

        let first = gen_work(&mut job, &[], &opts);
        let second = gen_work(&mut job, &[], &opts);
        assert_eq!(first.xnonce2, vec![0x07, 0x00]);
        assert_eq!(second.xnonce2, vec![0x08, 0x00]);
        assert!(!first.same_scan_unit(&second));
        assert!(first.same_parent_block(&second));
    }

    #[test]
    fn voting_family_packs_vote_and_reward() {
        let caps = caps(AlgorithmType::Heavy);
        let mut job = sample_job();
        let opts = GenOptions {
            caps: &caps,
            vote: 1024,
            difficulty: 1.0,
        };

        let work = gen_work(&mut job, &[], &opts);
        // Word 20 carries the (vote, reward) halves and stays outside
        // the byte-swapped prefix.
        let expected = 1024u32 | u32::from(u16::from_be_bytes([0x01, 0x02])) << 16;
        assert_eq!(work.data[20], expected);
        assert_eq!(work.max_vote, 1024);

        // The swapped prefix covers words 0..19.
        assert_eq!(work.data[0], 0x0000_0002u32.swap_bytes());
    }

    #[test]
    fn diff_one_gives_base_target() {
        let mut target = [0u32; 8];
        diff_to_target(&mut target, 1.0);
        assert_eq!(target[6], 0xffff_0000);
        assert_eq!(&target[..6], &[0; 6]);
        assert_eq!(target[7], 0);
    }

    #[test]
    fn higher_difficulty_gives_smaller_target() {
        let mut easy = [0u32; 8];
        let mut hard = [0u32; 8];
        diff_to_target(&mut easy, 1.0);
        diff_to_target(&mut hard, 16.0);

        let value = |t: &[u32; 8]| {
            t.iter()
                .rev()
                .fold(0u128, |acc, &w| acc << 32 | u128::from(w))
        };
        assert!(value(&hard) < value(&easy));
    }

    #[test]
    fn huge_difficulty_shifts_target_down() {
        let mut target = [0u32; 8];
        diff_to_target(&mut target, 1.0e30);
        // Magnitude lands in the low words once the exponent is consumed.
        assert_eq!(target[6], 0);
        assert_eq!(target[7], 0);
        assert!(target[2] != 0 || target[3] != 0);
    }

    #[test]
    fn scale_divisor_applies_before_expansion() {
        let caps_jackpot = caps(AlgorithmType::Jackpot);
        let mut job = sample_job();
        job.diff = 65536.0;
        let opts = GenOptions {
            caps: &caps_jackpot,
            vote: 0,
            difficulty: 1.0,
        };

        let work = gen_work(&mut job, &[], &opts);
        let mut base = [0u32; 8];
        diff_to_target(&mut base, 1.0);
        assert_eq!(work.target, base);
    }

    #[test]
    fn xnonce2_wraps_to_zero() {
        let mut counter = vec![0xff, 0xff];
        increment_xnonce2(&mut counter);
        assert_eq!(counter, vec![0x00, 0x00]);

        let mut counter = vec![0xff, 0x01];
        increment_xnonce2(&mut counter);
        assert_eq!(counter, vec![0x00, 0x02]);
    }
}

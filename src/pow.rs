//! Proof of work over block headers

use crate::constants::POW_PROGRESS_INTERVAL;
use crate::error::{ConsensusError, Result};
use crate::types::*;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};

/// True when `hash` starts with `difficulty` `'0'` characters.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// ProofOfWork: ℋ × ℕ → ℕ × ℍ
///
/// Iterate the nonce from 0 until the header hash has `difficulty` leading
/// zeros. Unbounded: only returns once a nonce is found. Progress is logged
/// under `node_id`.
pub fn proof_of_work(node_id: &str, header: &BlockHeader, difficulty: usize) -> Result<(Natural, HashHex)> {
    let never = AtomicBool::new(false);
    match proof_of_work_until(node_id, header, difficulty, &never)? {
        Some(found) => Ok(found),
        None => Err(ConsensusError::InvariantViolation(format!(
            "nonce space exhausted for block {}",
            header.index
        ))),
    }
}

/// Like [`proof_of_work`] but returns `None` once `stop` is raised.
pub fn proof_of_work_until(
    node_id: &str,
    header: &BlockHeader,
    difficulty: usize,
    stop: &AtomicBool,
) -> Result<Option<(Natural, HashHex)>> {
    let mut candidate = header.clone();
    candidate.nonce = 0;

    loop {
        let hash = candidate.calculate_hash()?;
        if meets_difficulty(&hash, difficulty) {
            debug!(
                "[{}] Found nonce {} for block {} (hash {})",
                node_id, candidate.nonce, candidate.index, hash
            );
            return Ok(Some((candidate.nonce, hash)));
        }

        if stop.load(Ordering::Relaxed) {
            debug!(
                "[{}] Proof of work for block {} stopped at nonce {}",
                node_id, candidate.index, candidate.nonce
            );
            return Ok(None);
        }

        candidate.nonce = match candidate.nonce.checked_add(1) {
            Some(nonce) => nonce,
            None => return Ok(None),
        };
        if candidate.nonce % POW_PROGRESS_INTERVAL == 0 {
            debug!(
                "[{}] Mining block {}: nonce {}, current hash {}",
                node_id, candidate.index, candidate.nonce, hash
            );
        }
    }
}

/// CheckProofOfWork: ℬ × ℕ → {true, false}
///
/// The stored hash must equal the recomputed header hash and meet `difficulty`.
pub fn check_proof_of_work(block: &Block, difficulty: usize) -> Result<bool> {
    Ok(block.calculate_hash()? == block.hash && meets_difficulty(&block.hash, difficulty))
}

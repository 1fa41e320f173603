//! Longest valid chain selection
//!
//! A peer chain is only ever adopted after it has been replayed block by block
//! into a scratch [`Ledger`] built from the peer's own genesis. The live ledger
//! is not touched until a complete replay has succeeded.

use crate::config::ChainConfig;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::types::*;
use log::{debug, info};

/// A chain observed at a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerChain {
    pub node_id: String,
    pub chain: Vec<Block>,
}

/// Outcome of a successful resolution: the chain to adopt and its replayed UTXO set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorganizationResult {
    pub source: String,
    pub new_chain: Vec<Block>,
    pub new_utxo_set: UtxoSet,
    /// Index of the last block shared with the local chain, if the genesis is shared
    pub fork_index: Option<usize>,
    /// Local blocks abandoned by the switch
    pub reorganization_depth: usize,
}

/// ShouldReorganize: |new| > |current|
///
/// Equal lengths never replace the current chain.
pub fn should_reorganize(new_chain: &[Block], current_len: usize) -> bool {
    new_chain.len() > current_len
}

/// Index of the last block on which both chains agree.
pub fn find_fork_point(new_chain: &[Block], current_chain: &[Block]) -> Option<usize> {
    new_chain
        .iter()
        .zip(current_chain)
        .take_while(|(a, b)| a.hash == b.hash)
        .count()
        .checked_sub(1)
}

/// Replay `chain` from its genesis into a fresh ledger.
///
/// The genesis block is taken verbatim. Every later block must pass
/// [`Ledger::add_block`] against the UTXO set rebuilt so far; the first
/// rejection discards the whole chain (`Ok(None)`).
pub fn replay_chain(
    chain: &[Block],
    node_id: &str,
    config: &ChainConfig,
) -> Result<Option<Ledger>> {
    let (genesis, rest) = match chain.split_first() {
        Some(split) => split,
        None => return Ok(None),
    };

    let mut scratch = Ledger::from_genesis(
        format!("replay@{}", node_id),
        genesis.clone(),
        config.clone(),
    );
    for block in rest {
        if let ValidationResult::Invalid(reason) = scratch.add_block(block)? {
            debug!(
                "[{}] Replay failed at block {}: {}",
                node_id, block.header.index, reason
            );
            return Ok(None);
        }
    }
    Ok(Some(scratch))
}

/// Pick the longest peer chain that survives full replay.
///
/// Peers are scanned in order; a chain replaces the current best only when it
/// is strictly longer. Peers sharing the local node id are skipped. Returns
/// `None` when no peer chain beats the local one.
pub fn select_longest_valid_chain(
    local: &Ledger,
    peers: &[PeerChain],
) -> Result<Option<ReorganizationResult>> {
    let mut best_len = local.chain_len();
    let mut best: Option<(&PeerChain, Ledger)> = None;

    for peer in peers {
        if peer.node_id == local.node_id() || !should_reorganize(&peer.chain, best_len) {
            continue;
        }

        match replay_chain(&peer.chain, local.node_id(), local.config())? {
            Some(replayed) => {
                info!(
                    "[{}] Chain of {} (length {}) is longer and valid",
                    local.node_id(),
                    peer.node_id,
                    peer.chain.len()
                );
                best_len = peer.chain.len();
                best = Some((peer, replayed));
            }
            None => info!(
                "[{}] Chain of {} (length {}) is longer but invalid",
                local.node_id(),
                peer.node_id,
                peer.chain.len()
            ),
        }
    }

    Ok(best.map(|(peer, replayed)| {
        let fork_index = find_fork_point(&peer.chain, local.chain());
        let kept = fork_index.map_or(0, |i| i + 1);
        let (new_chain, new_utxo_set) = replayed.into_state();
        ReorganizationResult {
            source: peer.node_id.clone(),
            new_chain,
            new_utxo_set,
            fork_index,
            reorganization_depth: local.chain_len() - kept,
        }
    }))
}

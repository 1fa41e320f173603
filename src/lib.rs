//! # UTXO Consensus
//!
//! A minimal proof-of-work blockchain with UTXO accounting and longest-valid-chain
//! consensus between independent nodes.
//!
//! ## Architecture
//!
//! Leaf first:
//! - Identity (`crypto`): secp256k1 signing, addresses, canonical JSON hashing
//! - Transactions (`transaction`): tagged coinbase / transfer records over UTXOs
//! - Blocks (`block`, `pow`, `mining`): hash-chained batches sealed by proof of work
//! - Ledger (`ledger`): chain plus UTXO set behind a single `add_block` gate
//! - Mempool and Node (`mempool`, `node`): pending pool, mining and relaying
//! - Consensus (`reorganization`): full replay and longest valid chain selection
//! - Transport (`network`): per-node inboxes over channels
//!
//! ## Invariants
//!
//! 1. **No double spend**: an output id is consumed at most once in the mempool and in the chain
//! 2. **Hash-linked history**: every block's `previous_hash` is the hash of its predecessor
//! 3. **Atomic application**: a rejected block or chain leaves the ledger untouched
//!
//! ## Usage
//!
//! ```rust
//! use utxo_consensus::{ChainConfig, Ledger};
//!
//! let mut ledger = Ledger::new("node-1", ChainConfig::default().with_difficulty(1)).unwrap();
//! ledger.mine_block(vec![], "miner").unwrap().unwrap();
//! assert_eq!(ledger.get_balance("miner"), utxo_consensus::MINING_REWARD);
//! ```

pub mod types;
pub mod constants;
pub mod config;
pub mod crypto;
pub mod transaction;
pub mod block;
pub mod pow;
pub mod mining;
pub mod ledger;
pub mod mempool;
pub mod reorganization;
pub mod network;
pub mod node;
pub mod error;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use config::ChainConfig;
pub use crypto::{Signer, Wallet};
pub use error::{ConsensusError, Result};
pub use ledger::Ledger;
pub use mempool::{Mempool, MempoolResult};
pub use network::{Network, NetworkMessage};
pub use node::Node;
pub use reorganization::{PeerChain, ReorganizationResult};

/// Stateless validation entry points bound to one chain configuration
///
/// # Examples
///
/// ```
/// use utxo_consensus::{Block, ChainConfig, Consensus, UtxoSet, ValidationResult};
///
/// let consensus = Consensus::new(ChainConfig::default());
/// let genesis = Block::genesis(0).unwrap();
///
/// let (result, update) = consensus.validate_block(&genesis, &UtxoSet::new());
/// assert_eq!(result, ValidationResult::Valid);
/// assert!(update.created.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Consensus {
    config: ChainConfig,
}

impl Consensus {
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Check every transaction of `block` against `utxo_set` without applying it
    ///
    /// Header linkage and proof of work are the ledger's concern; see
    /// [`Ledger::add_block`].
    pub fn validate_block(
        &self,
        block: &Block,
        utxo_set: &UtxoSet,
    ) -> (ValidationResult, block::UtxoUpdate) {
        block::connect_block(block, utxo_set, self.config.mining_reward)
    }

    /// Decide whether `tx` may enter `pool`
    ///
    /// # Examples
    ///
    /// ```
    /// use utxo_consensus::{ChainConfig, Consensus, Mempool, MempoolResult, UtxoSet};
    /// use utxo_consensus::types::{CoinbaseTransaction, Transaction};
    ///
    /// let consensus = Consensus::new(ChainConfig::default());
    /// let coinbase: Transaction = CoinbaseTransaction::new(1, 0, "miner", 10).into();
    ///
    /// let result = consensus
    ///     .validate_transaction(&coinbase, &UtxoSet::new(), &Mempool::new())
    ///     .unwrap();
    /// assert!(matches!(result, MempoolResult::Rejected(_)));
    /// ```
    pub fn validate_transaction(
        &self,
        tx: &Transaction,
        utxo_set: &UtxoSet,
        pool: &Mempool,
    ) -> Result<MempoolResult> {
        mempool::accept_to_memory_pool(tx, utxo_set, pool)
    }

    /// Recomputed hash matches and meets the configured difficulty
    pub fn check_proof_of_work(&self, block: &Block) -> Result<bool> {
        pow::check_proof_of_work(block, self.config.difficulty)
    }

    /// Replay `chain` from its genesis; `None` if any block is rejected
    pub fn replay_chain(&self, chain: &[Block]) -> Result<Option<Ledger>> {
        reorganization::replay_chain(chain, "consensus", &self.config)
    }
}

//! Ledger: the chain of blocks plus the UTXO set it implies
//!
//! [`Ledger::add_block`] is the single gate through which blocks reach the chain.
//! A block either passes every check and is applied in one step, or the ledger
//! is left exactly as it was.

use crate::block::{connect_block, short};
use crate::config::ChainConfig;
use crate::error::Result;
use crate::mining::{create_block_template, mine_block};
use crate::pow::meets_difficulty;
use crate::transaction::{current_timestamp, sum_amounts};
use crate::types::*;
use log::{debug, info, warn};
use std::fmt;

#[derive(Debug, Clone)]
pub struct Ledger {
    node_id: String,
    chain: Vec<Block>,
    utxos: UtxoSet,
    config: ChainConfig,
}

impl Ledger {
    /// Start a chain with a fresh genesis block.
    pub fn new(node_id: impl Into<String>, config: ChainConfig) -> Result<Self> {
        let genesis = Block::genesis(current_timestamp())?;
        let ledger = Self::from_genesis(node_id, genesis, config);
        info!(
            "[{}] Genesis block created: {}",
            ledger.node_id,
            ledger.last_block()
        );
        Ok(ledger)
    }

    /// Chain holding only `genesis`, over an empty UTXO set.
    pub fn from_genesis(node_id: impl Into<String>, genesis: Block, config: ChainConfig) -> Self {
        Self {
            node_id: node_id.into(),
            chain: vec![genesis],
            utxos: UtxoSet::new(),
            config,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Number of blocks, genesis included
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn last_block(&self) -> &Block {
        // chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }

    /// Search a nonce for `header` at this ledger's difficulty.
    pub fn proof_of_work(&self, header: &BlockHeader) -> Result<(Natural, HashHex)> {
        crate::pow::proof_of_work(&self.node_id, header, self.config.difficulty)
    }

    /// Mine `pending` behind a coinbase paying `miner_address`, then append it.
    ///
    /// Returns `None` when the mined block is rejected by [`Ledger::add_block`].
    pub fn mine_block(
        &mut self,
        pending: Vec<Transaction>,
        miner_address: &str,
    ) -> Result<Option<Block>> {
        let template = create_block_template(
            self.last_block(),
            pending,
            miner_address,
            self.config.mining_reward,
            current_timestamp(),
        );
        info!(
            "[{}] Mining block {} with {} transactions",
            self.node_id,
            template.header.index,
            template.transactions.len()
        );

        let block = mine_block(&self.node_id, template, self.config.difficulty)?;
        info!("[{}] Block mined: {}", self.node_id, block);

        match self.add_block(&block)? {
            ValidationResult::Valid => Ok(Some(block)),
            ValidationResult::Invalid(_) => Ok(None),
        }
    }

    /// AddBlock: ℬ × 𝒰𝒮 → {valid, invalid} × 𝒰𝒮
    ///
    /// 1. `previous_hash` must be the hash of the current tip
    /// 2. The stored hash must match the recomputed header hash
    /// 3. The hash must meet the configured difficulty
    /// 4. Every transaction must connect against the UTXO set (see [`connect_block`])
    ///
    /// On success the block is appended and its staged UTXO update applied.
    pub fn add_block(&mut self, block: &Block) -> Result<ValidationResult> {
        let result = self.check_block(block)?;
        if let ValidationResult::Invalid(reason) = &result {
            warn!("[{}] Block {} rejected: {}", self.node_id, block.header.index, reason);
            return Ok(result);
        }

        let (result, update) = connect_block(block, &self.utxos, self.config.mining_reward);
        match result {
            ValidationResult::Valid => {
                update.apply(&mut self.utxos);
                self.chain.push(block.clone());
                info!(
                    "[{}] Block {} added to chain ({} UTXOs)",
                    self.node_id,
                    block.header.index,
                    self.utxos.len()
                );
                Ok(ValidationResult::Valid)
            }
            ValidationResult::Invalid(reason) => {
                warn!("[{}] Block {} rejected: {}", self.node_id, block.header.index, reason);
                Ok(ValidationResult::Invalid(reason))
            }
        }
    }

    /// Header checks of the gate, in order.
    fn check_block(&self, block: &Block) -> Result<ValidationResult> {
        let last = self.last_block();
        if block.header.previous_hash != last.hash {
            return Ok(ValidationResult::Invalid(format!(
                "Previous hash mismatch: expected {}, got {}",
                short(&last.hash),
                short(&block.header.previous_hash)
            )));
        }

        let recomputed = block.calculate_hash()?;
        if block.hash != recomputed {
            return Ok(ValidationResult::Invalid(format!(
                "Hash mismatch: stored {}, computed {}",
                short(&block.hash),
                short(&recomputed)
            )));
        }

        if !meets_difficulty(&block.hash, self.config.difficulty) {
            return Ok(ValidationResult::Invalid(format!(
                "Hash {} does not meet difficulty {}",
                short(&block.hash),
                self.config.difficulty
            )));
        }

        Ok(ValidationResult::Valid)
    }

    /// Σ of unspent outputs paying `address`
    pub fn get_balance(&self, address: &str) -> Amount {
        self.utxos
            .values()
            .filter(|utxo| utxo.is_mine(address))
            .map(|utxo| utxo.amount)
            .fold(0, Amount::saturating_add)
    }

    /// First-fit coin selection in UTXO set iteration order.
    ///
    /// Collects outputs owned by `address` until their total reaches
    /// `amount_needed`. Returns `(vec![], 0)` when the address cannot cover it.
    pub fn get_spendable_outputs(
        &self,
        address: &str,
        amount_needed: Amount,
    ) -> (Vec<TransactionInput>, Amount) {
        let mut inputs = Vec::new();
        let mut total: Amount = 0;

        for utxo in self.utxos.values().filter(|utxo| utxo.is_mine(address)) {
            total = total.saturating_add(utxo.amount);
            inputs.push(TransactionInput::new(utxo.clone()));
            if total >= amount_needed {
                break;
            }
        }

        if total < amount_needed {
            debug!(
                "[{}] {} has {} spendable, needs {}",
                self.node_id, address, total, amount_needed
            );
            return (Vec::new(), 0);
        }
        (inputs, total)
    }

    /// Walk `candidate` (or the local chain) from block 1 checking hashes,
    /// linkage, difficulty and transfer signatures.
    ///
    /// Does not replay the UTXO set: double spends across blocks pass here and
    /// are only caught by full replay.
    pub fn is_chain_valid(&self, candidate: Option<&[Block]>) -> Result<bool> {
        let chain = candidate.unwrap_or(&self.chain);

        for pair in chain.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);

            if current.hash != current.calculate_hash()? {
                debug!("[{}] Block {} hash mismatch", self.node_id, current.header.index);
                return Ok(false);
            }
            if current.header.previous_hash != previous.hash {
                debug!("[{}] Block {} not linked to its predecessor", self.node_id, current.header.index);
                return Ok(false);
            }
            if !meets_difficulty(&current.hash, self.config.difficulty) {
                debug!("[{}] Block {} below difficulty", self.node_id, current.header.index);
                return Ok(false);
            }
            let bad_signature = current
                .transactions
                .iter()
                .filter_map(Transaction::as_transfer)
                .any(|tx| !tx.is_signature_valid());
            if bad_signature {
                debug!("[{}] Block {} carries an invalid signature", self.node_id, current.header.index);
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Σ of every unspent output
    pub fn total_supply(&self) -> Option<Amount> {
        sum_amounts(self.utxos.values().map(|utxo| utxo.amount))
    }

    /// Swap in a replayed chain and its UTXO set.
    pub(crate) fn replace_state(&mut self, chain: Vec<Block>, utxos: UtxoSet) {
        self.chain = chain;
        self.utxos = utxos;
    }

    pub(crate) fn into_state(self) -> (Vec<Block>, UtxoSet) {
        (self.chain, self.utxos)
    }
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Chain of {} (length {}, {} UTXOs):",
            self.node_id,
            self.chain.len(),
            self.utxos.len()
        )?;
        for block in &self.chain {
            writeln!(f, "  {}", block)?;
        }
        Ok(())
    }
}

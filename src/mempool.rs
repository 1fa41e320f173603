//! Pending transaction pool and its admission rules

use crate::block::connect_transaction;
use crate::error::Result;
use crate::transaction::sum_amounts;
use crate::types::*;
use std::collections::HashMap;

/// Result of mempool acceptance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolResult {
    Accepted,
    Rejected(String),
}

impl MempoolResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MempoolResult::Accepted)
    }
}

/// Transactions admitted but not yet in a block, keyed by transaction id.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: HashMap<TxId, Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.transactions.contains_key(tx_id)
    }

    pub fn get(&self, tx_id: &str) -> Option<&Transaction> {
        self.transactions.get(tx_id)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// Snapshot of every pending transaction, for block assembly.
    pub fn to_vec(&self) -> Vec<Transaction> {
        self.transactions.values().cloned().collect()
    }

    /// Run [`accept_to_memory_pool`] and insert `tx` when accepted.
    pub fn admit(&mut self, tx: Transaction, utxo_set: &UtxoSet) -> Result<MempoolResult> {
        let result = accept_to_memory_pool(&tx, utxo_set, self)?;
        if result.is_accepted() {
            self.transactions.insert(tx.transaction_id().to_string(), tx);
        }
        Ok(result)
    }

    /// Insert without admission checks, to stage pools admission would refuse.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&mut self, tx: Transaction) {
        self.transactions.insert(tx.transaction_id().to_string(), tx);
    }

    pub fn remove(&mut self, tx_id: &str) -> Option<Transaction> {
        self.transactions.remove(tx_id)
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
    }

    /// Id of the resident transaction spending `output_id`, if any.
    pub fn spender_of(&self, output_id: &str) -> Option<&str> {
        self.transactions
            .values()
            .find(|tx| tx.input_ids().contains(&output_id))
            .map(Transaction::transaction_id)
    }

    /// Drop every transaction included in `block`; returns how many were removed.
    pub fn remove_included(&mut self, block: &Block) -> usize {
        block
            .transactions
            .iter()
            .filter(|tx| self.transactions.remove(tx.transaction_id()).is_some())
            .count()
    }

    /// Drop transactions spending an output no longer in `utxo_set`.
    pub fn evict_spent(&mut self, utxo_set: &UtxoSet) -> usize {
        let before = self.transactions.len();
        self.transactions
            .retain(|_, tx| tx.input_ids().iter().all(|id| utxo_set.contains_key(*id)));
        before - self.transactions.len()
    }

    /// Drop transactions that no longer connect on their own against `utxo_set`.
    pub fn evict_unconnectable(&mut self, utxo_set: &UtxoSet, mining_reward: Amount) -> usize {
        let before = self.transactions.len();
        self.transactions
            .retain(|_, tx| connect_transaction(tx, utxo_set, mining_reward).is_valid());
        before - self.transactions.len()
    }
}

/// AcceptToMemoryPool: 𝒯𝒳 × 𝒰𝒮 × Mempool → {accepted, rejected}
///
/// For transaction tx, UTXO set us and mempool mp:
/// 1. tx must not already be in mp
/// 2. tx must be a signed transfer (coinbases only enter through blocks) listing
///    each input once
/// 3. Every input must be in us, owned by the sender, and not spent by another entry of mp
/// 4. Σ inputs = Σ outputs (no fees)
/// 5. outputs = [{recipient, amount}] or [{recipient, amount}, {sender, Σ inputs − amount}],
///    output i carrying id `<tx id>_<i>`
///
/// Never mutates `mempool`.
pub fn accept_to_memory_pool(
    tx: &Transaction,
    utxo_set: &UtxoSet,
    mempool: &Mempool,
) -> Result<MempoolResult> {
    // 1. Check if transaction is already in mempool
    if mempool.contains(tx.transaction_id()) {
        return Ok(MempoolResult::Rejected(format!(
            "Transaction {} already in mempool",
            tx.transaction_id()
        )));
    }

    // 2. Only signed transfers are relayed
    let transfer = match tx {
        Transaction::Transfer(transfer) => transfer,
        Transaction::Coinbase(coinbase) => {
            return Ok(MempoolResult::Rejected(format!(
                "Coinbase {} cannot enter the mempool",
                coinbase.transaction_id
            )))
        }
    };
    if !transfer.is_signature_valid() {
        return Ok(MempoolResult::Rejected(format!(
            "Invalid signature on {}",
            transfer.transaction_id
        )));
    }
    if let Some(id) = transfer.repeated_input() {
        return Ok(MempoolResult::Rejected(format!(
            "Input {} is listed more than once in {}",
            id, transfer.transaction_id
        )));
    }

    // 3. Check inputs against the UTXO set and resident transactions
    let mut input_values = Vec::with_capacity(transfer.inputs.len());
    for input in &transfer.inputs {
        let id = input.transaction_output_id.as_str();
        let utxo = match utxo_set.get(id) {
            Some(utxo) => utxo,
            None => {
                return Ok(MempoolResult::Rejected(format!("Input {} not in UTXO set", id)))
            }
        };
        if let Some(spender) = mempool.spender_of(id) {
            return Ok(MempoolResult::Rejected(format!(
                "Input {} already spent by mempool transaction {}",
                id, spender
            )));
        }
        if !utxo.is_mine(&transfer.sender_address) {
            return Ok(MempoolResult::Rejected(format!(
                "Input {} is not owned by sender {}",
                id, transfer.sender_address
            )));
        }
        input_values.push(utxo.amount);
    }

    // 4. No fees: value in must equal value out
    let (total_in, total_out) = match (
        sum_amounts(input_values),
        sum_amounts(transfer.outputs.iter().map(|o| o.amount)),
    ) {
        (Some(total_in), Some(total_out)) => (total_in, total_out),
        _ => return Ok(MempoolResult::Rejected("Value overflow".to_string())),
    };
    if total_in != total_out {
        return Ok(MempoolResult::Rejected(format!(
            "Input total {} does not equal output total {}",
            total_in, total_out
        )));
    }

    // 5. Output shape: payment plus optional exact change, each bound to this transaction
    if !has_standard_outputs(transfer, total_in) {
        return Ok(MempoolResult::Rejected(format!(
            "Unexpected output shape on {}",
            transfer.transaction_id
        )));
    }
    if !transfer.has_bound_outputs() {
        return Ok(MempoolResult::Rejected(format!(
            "Outputs of {} are not bound to it",
            transfer.transaction_id
        )));
    }

    Ok(MempoolResult::Accepted)
}

fn has_standard_outputs(tx: &TransferTransaction, total_in: Amount) -> bool {
    let pays = |output: &TransactionOutput, address: &str, amount: Amount| {
        output.recipient_address == address && output.amount == amount
    };

    match tx.outputs.as_slice() {
        [payment] => total_in == tx.amount && pays(payment, &tx.recipient_address, tx.amount),
        [payment, change] => match total_in.checked_sub(tx.amount) {
            Some(change_amount) => {
                pays(payment, &tx.recipient_address, tx.amount)
                    && pays(change, &tx.sender_address, change_amount)
            }
            None => false,
        },
        _ => false,
    }
}

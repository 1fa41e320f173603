//! Block hashing and block connection against a UTXO set

use crate::constants::{GENESIS_INDEX, GENESIS_PREVIOUS_HASH};
use crate::crypto::{canonical_json, sha256_hex};
use crate::error::Result;
use crate::transaction::sum_amounts;
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::fmt;

impl BlockHeader {
    /// SHA256 of the canonical JSON of `{index, merkle_root, nonce, previous_hash, timestamp}`
    pub fn calculate_hash(&self) -> Result<HashHex> {
        Ok(sha256_hex(canonical_json(self)?.as_bytes()))
    }
}

impl Block {
    /// Assemble a block, deriving its merkle root and hash from the contents.
    pub fn new(
        index: Natural,
        timestamp: Natural,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<HashHex>,
        nonce: Natural,
    ) -> Result<Self> {
        let header = BlockHeader {
            index,
            merkle_root: calculate_merkle_root(&transactions),
            nonce,
            previous_hash: previous_hash.into(),
            timestamp,
        };
        let hash = header.calculate_hash()?;
        Ok(Self {
            header,
            transactions,
            hash,
        })
    }

    /// Block 0: no transactions, `previous_hash = "0"`, no proof-of-work.
    pub fn genesis(timestamp: Natural) -> Result<Self> {
        Self::new(GENESIS_INDEX, timestamp, Vec::new(), GENESIS_PREVIOUS_HASH, 0)
    }

    /// Recompute the hash from the stored header.
    pub fn calculate_hash(&self) -> Result<HashHex> {
        self.header.calculate_hash()
    }

    pub fn index(&self) -> Natural {
        self.header.index
    }

    pub fn previous_hash(&self) -> &str {
        &self.header.previous_hash
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block(Index: {}, Hash: {}..., Prev_Hash: {}..., Nonce: {}, Transactions: {})",
            self.header.index,
            short(&self.hash),
            short(&self.header.previous_hash),
            self.header.nonce,
            self.transactions.len()
        )
    }
}

pub(crate) fn short(s: &str) -> &str {
    s.get(..10).unwrap_or(s)
}

/// Simplified merkle root: SHA256 over the lexicographically sorted, concatenated
/// transaction ids. Empty string for a block without transactions.
pub fn calculate_merkle_root(transactions: &[Transaction]) -> HashHex {
    if transactions.is_empty() {
        return String::new();
    }
    let mut ids: Vec<&str> = transactions.iter().map(|tx| tx.transaction_id()).collect();
    ids.sort_unstable();
    sha256_hex(ids.concat().as_bytes())
}

/// Staged UTXO changes of a block that passed [`connect_block`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoUpdate {
    pub spent: HashSet<OutputId>,
    pub created: HashMap<OutputId, TransactionOutput>,
}

impl UtxoUpdate {
    /// Remove spent outputs, then merge created ones.
    pub fn apply(self, utxo_set: &mut UtxoSet) {
        for id in &self.spent {
            utxo_set.remove(id);
        }
        utxo_set.extend(self.created);
    }
}

/// ConnectBlock: ℬ × 𝒰𝒮 → {valid, invalid} × Δ𝒰𝒮
///
/// Validates every transaction of `block` against `utxo_set` in order, staging
/// outputs so later transactions may spend outputs created earlier in the same
/// block. `utxo_set` is never touched; a valid result carries the update to apply.
///
/// For each transaction:
/// 1. Coinbase: must be well formed for `mining_reward`; its output is staged
/// 2. Transfer: signature must be valid
/// 3. Each input resolves from the live set, else the staged outputs, else an
///    output of an earlier transaction in this block; an input may be consumed once
/// 4. Resolved inputs must belong to the sender and Σ inputs ≥ Σ outputs
/// 5. Output i must carry id `<tx id>_<i>` and must not collide with a live or staged output
pub fn connect_block(
    block: &Block,
    utxo_set: &UtxoSet,
    mining_reward: Amount,
) -> (ValidationResult, UtxoUpdate) {
    let mut update = UtxoUpdate::default();

    for (position, tx) in block.transactions.iter().enumerate() {
        let earlier = &block.transactions[..position];
        if let ValidationResult::Invalid(reason) =
            stage_transaction(tx, earlier, utxo_set, &mut update, mining_reward)
        {
            return invalid(reason);
        }
    }

    (ValidationResult::Valid, update)
}

/// Validate `tx` as if it were alone in a block on top of `utxo_set`.
pub fn connect_transaction(
    tx: &Transaction,
    utxo_set: &UtxoSet,
    mining_reward: Amount,
) -> ValidationResult {
    stage_transaction(tx, &[], utxo_set, &mut UtxoUpdate::default(), mining_reward)
}

fn stage_transaction(
    tx: &Transaction,
    earlier: &[Transaction],
    utxo_set: &UtxoSet,
    update: &mut UtxoUpdate,
    mining_reward: Amount,
) -> ValidationResult {
    let transfer = match tx {
        Transaction::Coinbase(coinbase) => {
            if !coinbase.is_well_formed(mining_reward) {
                return ValidationResult::Invalid(format!(
                    "Malformed coinbase {}",
                    coinbase.transaction_id
                ));
            }
            update
                .created
                .insert(coinbase.output.id.clone(), coinbase.output.clone());
            return ValidationResult::Valid;
        }
        Transaction::Transfer(transfer) => transfer,
    };

    if !transfer.is_signature_valid() {
        return ValidationResult::Invalid(format!(
            "Signature verification failed for transaction {}",
            transfer.transaction_id
        ));
    }

    let mut input_values = Vec::with_capacity(transfer.inputs.len());
    for input in &transfer.inputs {
        let id = &input.transaction_output_id;
        if update.spent.contains(id) {
            return ValidationResult::Invalid(format!(
                "Input {} of transaction {} is already spent in this block",
                id, transfer.transaction_id
            ));
        }

        let resolved = if let Some(utxo) = utxo_set.get(id) {
            utxo.clone()
        } else if let Some(utxo) = update.created.remove(id) {
            utxo
        } else if let Some(utxo) = find_in_block(earlier, id) {
            utxo.clone()
        } else {
            return ValidationResult::Invalid(format!(
                "Input {} of transaction {} not found",
                id, transfer.transaction_id
            ));
        };

        if !resolved.is_mine(&transfer.sender_address) {
            return ValidationResult::Invalid(format!(
                "Input {} is not owned by sender {}",
                id, transfer.sender_address
            ));
        }
        input_values.push(resolved.amount);
        update.spent.insert(id.clone());
    }

    let (total_in, total_out) = match (
        sum_amounts(input_values),
        sum_amounts(transfer.outputs.iter().map(|o| o.amount)),
    ) {
        (Some(total_in), Some(total_out)) => (total_in, total_out),
        _ => {
            return ValidationResult::Invalid(format!(
                "Value overflow in transaction {}",
                transfer.transaction_id
            ))
        }
    };
    if total_in < total_out {
        return ValidationResult::Invalid(format!(
            "Transaction {} inputs ({}) < outputs ({})",
            transfer.transaction_id, total_in, total_out
        ));
    }

    if !transfer.has_bound_outputs() {
        return ValidationResult::Invalid(format!(
            "Outputs of transaction {} are not bound to it",
            transfer.transaction_id
        ));
    }
    for output in &transfer.outputs {
        if utxo_set.contains_key(&output.id) || update.created.contains_key(&output.id) {
            return ValidationResult::Invalid(format!("Duplicate UTXO id {}", output.id));
        }
        update.created.insert(output.id.clone(), output.clone());
    }

    ValidationResult::Valid
}

fn invalid(reason: String) -> (ValidationResult, UtxoUpdate) {
    (ValidationResult::Invalid(reason), UtxoUpdate::default())
}

fn find_in_block<'a>(earlier: &'a [Transaction], id: &str) -> Option<&'a TransactionOutput> {
    earlier
        .iter()
        .flat_map(|tx| tx.outputs().iter())
        .find(|output| output.id == id)
}

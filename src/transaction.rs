//! Transaction construction, hashing and signing
//!
//! A transfer is built in three steps: [`TransferTransaction::new`] fixes the
//! inputs and hashes the id, [`TransferTransaction::sign`] attaches the sender's
//! signature, and [`TransferTransaction::process_transaction`] derives the
//! outputs (payment plus optional change).

use crate::constants::COINBASE_ID_PREFIX;
use crate::crypto::{address_from_public_key_hex, canonical_json, sha256_hex, verify_signature, Signer};
use crate::error::{ConsensusError, Result};
use crate::types::*;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide transaction sequence.
///
/// Starts at 0 when the process starts, is bumped exactly once per transaction-id
/// hash, and is never reset. Folding it into the id keeps two otherwise identical
/// transfers issued in the same millisecond apart.
static TRANSACTION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Advance the sequence and return the new value.
pub fn next_sequence() -> Natural {
    TRANSACTION_SEQUENCE.fetch_add(1, Ordering::SeqCst) + 1
}

/// Milliseconds since the unix epoch
pub fn current_timestamp() -> Natural {
    Natural::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Checked sum of amounts; `None` on overflow
pub fn sum_amounts<I: IntoIterator<Item = Amount>>(amounts: I) -> Option<Amount> {
    amounts.into_iter().try_fold(0 as Amount, |acc, amount| acc.checked_add(amount))
}

/// Payload hashed into the transaction id and signed by the sender.
#[derive(Serialize)]
struct TransferPayload<'a> {
    amount: Amount,
    inputs_refs: Vec<&'a str>,
    recipient: &'a str,
    sender: &'a str,
    sequence: Natural,
    timestamp: Natural,
}

impl TransactionOutput {
    pub fn new(
        recipient_address: impl Into<Address>,
        amount: Amount,
        parent_transaction_id: impl Into<TxId>,
        index_in_parent: Natural,
    ) -> Self {
        let parent_transaction_id = parent_transaction_id.into();
        Self {
            id: output_id(&parent_transaction_id, index_in_parent),
            recipient_address: recipient_address.into(),
            amount,
            parent_transaction_id,
            index_in_parent,
        }
    }

    pub fn is_mine(&self, address: &str) -> bool {
        self.recipient_address == address
    }

    /// True when the id and parent fields all name output `index_in_parent` of `parent_transaction_id`.
    pub fn is_bound_to(&self, parent_transaction_id: &str, index_in_parent: Natural) -> bool {
        self.parent_transaction_id == parent_transaction_id
            && self.index_in_parent == index_in_parent
            && self.id == output_id(parent_transaction_id, index_in_parent)
    }
}

/// `<parent>_<index>`
pub fn output_id(parent_transaction_id: &str, index_in_parent: Natural) -> OutputId {
    format!("{}_{}", parent_transaction_id, index_in_parent)
}

impl TransactionInput {
    pub fn new(utxo: TransactionOutput) -> Self {
        Self {
            transaction_output_id: utxo.id.clone(),
            utxo,
        }
    }
}

impl CoinbaseTransaction {
    /// Coinbase for the block at `block_index`, paying `reward` to `miner_address`.
    pub fn new(block_index: Natural, timestamp: Natural, miner_address: &str, reward: Amount) -> Self {
        let transaction_id = format!("{}{}_{}", COINBASE_ID_PREFIX, block_index, timestamp);
        let output = TransactionOutput::new(miner_address, reward, transaction_id.as_str(), 0);
        Self {
            transaction_id,
            recipient_address: miner_address.to_string(),
            amount: reward,
            timestamp,
            output,
        }
    }

    /// True when the single output pays exactly `mining_reward` and is bound to this coinbase.
    pub fn is_well_formed(&self, mining_reward: Amount) -> bool {
        self.transaction_id.starts_with(COINBASE_ID_PREFIX)
            && self.amount == mining_reward
            && self.output.amount == mining_reward
            && self.output.recipient_address == self.recipient_address
            && self.output.is_bound_to(&self.transaction_id, 0)
    }
}

impl TransferTransaction {
    /// Build an unsigned transfer spending `inputs`.
    ///
    /// Hashing the id advances the global sequence once; the captured value is
    /// kept on the transaction so the signing payload can be rebuilt later.
    pub fn new<S: Signer>(
        sender: &S,
        recipient_address: impl Into<Address>,
        amount: Amount,
        inputs: Vec<TransactionInput>,
    ) -> Result<Self> {
        let mut tx = Self {
            sender_address: sender.address().to_string(),
            sender_public_key: sender.public_key_hex(),
            recipient_address: recipient_address.into(),
            amount,
            inputs,
            outputs: Vec::new(),
            timestamp: current_timestamp(),
            sequence: 0,
            transaction_id: String::new(),
            signature: None,
        };
        tx.sequence = next_sequence();
        tx.transaction_id = sha256_hex(tx.signing_payload()?.as_bytes());
        Ok(tx)
    }

    /// Canonical JSON of `{amount, inputs_refs, recipient, sender, sequence, timestamp}`
    pub fn signing_payload(&self) -> Result<String> {
        let mut inputs_refs: Vec<&str> = self
            .inputs
            .iter()
            .map(|input| input.transaction_output_id.as_str())
            .collect();
        inputs_refs.sort_unstable();

        canonical_json(&TransferPayload {
            amount: self.amount,
            inputs_refs,
            recipient: &self.recipient_address,
            sender: &self.sender_address,
            sequence: self.sequence,
            timestamp: self.timestamp,
        })
    }

    /// Attach the sender's signature over the signing payload.
    pub fn sign<S: Signer>(&mut self, signer: &S) -> Result<()> {
        if signer.address() != self.sender_address {
            return Err(ConsensusError::InvalidSignature(format!(
                "signer {} does not own sender address {}",
                signer.address(),
                self.sender_address
            )));
        }
        let payload = self.signing_payload()?;
        self.signature = Some(signer.sign(&payload)?);
        Ok(())
    }

    /// A signature is valid when present, made by the embedded public key, and
    /// that key hashes to `sender_address`.
    pub fn is_signature_valid(&self) -> bool {
        let signature = match &self.signature {
            Some(signature) => signature,
            None => return false,
        };

        match address_from_public_key_hex(&self.sender_public_key) {
            Ok(address) if address == self.sender_address => {}
            _ => return false,
        }

        match self.signing_payload() {
            Ok(payload) => verify_signature(&self.sender_public_key, signature, &payload),
            Err(_) => false,
        }
    }

    /// Check the signed transfer against `utxo_set` and derive its outputs.
    ///
    /// 1. The signature must be valid
    /// 2. No output may be listed twice among the inputs
    /// 3. Every input must be unspent in `utxo_set` and owned by the sender
    /// 4. Σ inputs ≥ amount
    /// 5. outputs = [{recipient, amount}] ++ [{sender, change} if change > 0]
    pub fn process_transaction(&mut self, utxo_set: &UtxoSet) -> Result<ValidationResult> {
        if !self.is_signature_valid() {
            return Ok(ValidationResult::Invalid(format!(
                "Signature verification failed for {}",
                self.transaction_id
            )));
        }
        if let Some(id) = self.repeated_input() {
            return Ok(ValidationResult::Invalid(format!(
                "Input {} is listed more than once in {}",
                id, self.transaction_id
            )));
        }

        for input in &mut self.inputs {
            let utxo = match utxo_set.get(&input.transaction_output_id) {
                Some(utxo) => utxo,
                None => {
                    return Ok(ValidationResult::Invalid(format!(
                        "Input {} not found in UTXO set",
                        input.transaction_output_id
                    )))
                }
            };
            if !utxo.is_mine(&self.sender_address) {
                return Ok(ValidationResult::Invalid(format!(
                    "Input {} is not owned by sender {}",
                    input.transaction_output_id, self.sender_address
                )));
            }
            input.utxo = utxo.clone();
        }

        let total_input_value = match self.input_total() {
            Some(total) => total,
            None => return Ok(ValidationResult::Invalid("Input value overflow".to_string())),
        };
        if total_input_value < self.amount {
            return Ok(ValidationResult::Invalid(format!(
                "Input value {} is less than amount {}",
                total_input_value, self.amount
            )));
        }

        let change = total_input_value.checked_sub(self.amount).ok_or_else(|| {
            ConsensusError::InvariantViolation(format!(
                "negative change for {}: inputs {} < amount {}",
                self.transaction_id, total_input_value, self.amount
            ))
        })?;

        let mut outputs = vec![TransactionOutput::new(
            self.recipient_address.as_str(),
            self.amount,
            self.transaction_id.as_str(),
            0,
        )];
        if change > 0 {
            outputs.push(TransactionOutput::new(
                self.sender_address.as_str(),
                change,
                self.transaction_id.as_str(),
                1,
            ));
        }
        self.outputs = outputs;

        Ok(ValidationResult::Valid)
    }

    /// Σ of the resolved input amounts carried by this transfer
    pub fn input_total(&self) -> Option<Amount> {
        sum_amounts(self.inputs.iter().map(|input| input.utxo.amount))
    }

    pub fn output_total(&self) -> Option<Amount> {
        sum_amounts(self.outputs.iter().map(|output| output.amount))
    }

    /// First output id that appears more than once among the inputs
    pub fn repeated_input(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.inputs.len());
        self.inputs
            .iter()
            .map(|input| input.transaction_output_id.as_str())
            .find(|id| !seen.insert(*id))
    }

    /// Every output sits at its own position under this transaction's id.
    pub fn has_bound_outputs(&self) -> bool {
        self.outputs
            .iter()
            .zip(0..)
            .all(|(output, index)| output.is_bound_to(&self.transaction_id, index))
    }
}

impl Transaction {
    pub fn transaction_id(&self) -> &str {
        match self {
            Transaction::Coinbase(tx) => &tx.transaction_id,
            Transaction::Transfer(tx) => &tx.transaction_id,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, Transaction::Coinbase(_))
    }

    /// Ids of the outputs this transaction spends
    pub fn input_ids(&self) -> Vec<&str> {
        match self {
            Transaction::Coinbase(_) => Vec::new(),
            Transaction::Transfer(tx) => tx
                .inputs
                .iter()
                .map(|input| input.transaction_output_id.as_str())
                .collect(),
        }
    }

    pub fn outputs(&self) -> &[TransactionOutput] {
        match self {
            Transaction::Coinbase(tx) => std::slice::from_ref(&tx.output),
            Transaction::Transfer(tx) => &tx.outputs,
        }
    }

    pub fn as_transfer(&self) -> Option<&TransferTransaction> {
        match self {
            Transaction::Transfer(tx) => Some(tx),
            Transaction::Coinbase(_) => None,
        }
    }
}

impl From<TransferTransaction> for Transaction {
    fn from(tx: TransferTransaction) -> Self {
        Transaction::Transfer(tx)
    }
}

impl From<CoinbaseTransaction> for Transaction {
    fn from(tx: CoinbaseTransaction) -> Self {
        Transaction::Coinbase(tx)
    }
}

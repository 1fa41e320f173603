//! Core ledger types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Natural number type
pub type Natural = u64;

/// Amount of value carried by an output
pub type Amount = u64;

/// Hex-encoded hash (sha256 for blocks and transactions)
pub type HashHex = String;

/// Wallet address: hex(RIPEMD160(SHA256(public key)))
pub type Address = String;

/// Transaction id
pub type TxId = String;

/// Output id: `<parent transaction id>_<index in parent>`
pub type OutputId = String;

/// Transaction Output (UTXO): 𝒰 = 𝔸 × ℕ × TxId × ℕ
///
/// Immutable once created. The id is derived from the parent transaction id and
/// the output's position, so an output only exists once both are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub id: OutputId,
    pub recipient_address: Address,
    pub amount: Amount,
    pub parent_transaction_id: TxId,
    pub index_in_parent: Natural,
}

/// Transaction Input: a spend request bound to the output it consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub transaction_output_id: OutputId,
    pub utxo: TransactionOutput,
}

/// Input-less transaction minting the mining reward to the block's miner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseTransaction {
    pub transaction_id: TxId,
    pub recipient_address: Address,
    pub amount: Amount,
    pub timestamp: Natural,
    pub output: TransactionOutput,
}

/// Signed value transfer from `sender_address` to `recipient_address`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTransaction {
    pub sender_address: Address,
    pub sender_public_key: String,
    pub recipient_address: Address,
    pub amount: Amount,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub timestamp: Natural,
    /// Sequence value captured when the id was hashed
    pub sequence: Natural,
    pub transaction_id: TxId,
    pub signature: Option<String>,
}

/// Transaction: 𝒯𝒳 = Coinbase | Transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transaction {
    Coinbase(CoinbaseTransaction),
    Transfer(TransferTransaction),
}

/// Block Header: ℋ = ℕ × ℕ × ℍ × ℍ × ℕ
///
/// Field order is alphabetical; the header is hashed through canonical
/// (key-sorted) JSON either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub index: Natural,
    pub merkle_root: HashHex,
    pub nonce: Natural,
    pub previous_hash: HashHex,
    pub timestamp: Natural,
}

/// Block: ℬ = ℋ × 𝒯𝒳* × ℍ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub hash: HashHex,
}

/// UTXO Set: 𝒰𝒮 = OutputId → 𝒰
pub type UtxoSet = HashMap<OutputId, TransactionOutput>;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

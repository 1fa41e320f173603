//! Error types for ledger, mempool and network operations
//!
//! Validation failures are not errors: they come back as
//! [`ValidationResult::Invalid`](crate::types::ValidationResult) or
//! [`MempoolResult::Rejected`](crate::mempool::MempoolResult). The variants here
//! cover faults the caller has to handle differently from stale or adversarial input.

use crate::types::{Address, Amount};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Transaction validation failed: {0}")]
    TransactionValidation(String),

    #[error("Insufficient funds for {address}: requested {requested}, available {available}")]
    InsufficientFunds {
        address: Address,
        requested: Amount,
        available: Amount,
    },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Network error: {0}")]
    Network(String),

    /// An internal invariant was broken; indicates a logic bug upstream.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

//! Chain constants

use crate::types::{Amount, Natural};

/// Number of leading zero hex characters a block hash must carry
pub const INITIAL_DIFFICULTY: usize = 4;

/// Fixed coinbase payout per mined block
pub const MINING_REWARD: Amount = 10;

/// Prefix of every coinbase transaction id: `coinbase_<index>_<timestamp>`
pub const COINBASE_ID_PREFIX: &str = "coinbase_";

/// Index of the genesis block
pub const GENESIS_INDEX: Natural = 0;

/// `previous_hash` recorded in the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// How often (in nonces) proof-of-work reports progress
pub const POW_PROGRESS_INTERVAL: Natural = 500_000;

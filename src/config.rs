//! Chain configuration

use crate::constants::{INITIAL_DIFFICULTY, MINING_REWARD};
use crate::error::{ConsensusError, Result};
use crate::types::Amount;
use serde::{Deserialize, Serialize};

/// Parameters every node of a network must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Leading zero hex characters required in a block hash.
    pub difficulty: usize,
    /// Coinbase payout per block.
    pub mining_reward: Amount,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: INITIAL_DIFFICULTY,
            mining_reward: MINING_REWARD,
        }
    }
}

impl ChainConfig {
    /// Parse a configuration from JSON; missing fields fall back to the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ConsensusError::Serialization(e.to_string()))
    }

    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_mining_reward(mut self, mining_reward: Amount) -> Self {
        self.mining_reward = mining_reward;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_constants() {
        let config = ChainConfig::default();
        assert_eq!(config.difficulty, INITIAL_DIFFICULTY);
        assert_eq!(config.mining_reward, MINING_REWARD);
    }

    #[test]
    fn test_from_json_partial() {
        let config = ChainConfig::from_json(r#"{"difficulty": 2}"#).unwrap();
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.mining_reward, MINING_REWARD);
    }

    #[test]
    fn test_from_json_invalid() {
        let result = ChainConfig::from_json("{not json");
        assert!(matches!(result, Err(ConsensusError::Serialization(_))));
    }

    #[test]
    fn test_builders() {
        let config = ChainConfig::default().with_difficulty(1).with_mining_reward(50);
        assert_eq!(config, ChainConfig { difficulty: 1, mining_reward: 50 });
    }
}

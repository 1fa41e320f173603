//! Block template assembly and mining

use crate::block::calculate_merkle_root;
use crate::error::Result;
use crate::pow::proof_of_work;
use crate::types::*;
use log::debug;

/// Unsolved block: header with nonce 0 plus its transactions, coinbase first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

/// CreateBlockTemplate: ℬ × 𝒯𝒳* × 𝔸 → BlockTemplate
///
/// 1. Prepend a coinbase paying `mining_reward` to `miner_address`
/// 2. Compute the merkle root over coinbase and pending transactions
/// 3. Link the header to `last_block` with `index = last_block.index + 1`
pub fn create_block_template(
    last_block: &Block,
    pending: Vec<Transaction>,
    miner_address: &str,
    mining_reward: Amount,
    timestamp: Natural,
) -> BlockTemplate {
    let index = last_block.header.index + 1;
    let coinbase = create_coinbase_transaction(index, timestamp, miner_address, mining_reward);

    let mut transactions = Vec::with_capacity(pending.len() + 1);
    transactions.push(coinbase);
    transactions.extend(pending);

    let header = BlockHeader {
        index,
        merkle_root: calculate_merkle_root(&transactions),
        nonce: 0,
        previous_hash: last_block.hash.clone(),
        timestamp,
    };

    BlockTemplate {
        header,
        transactions,
    }
}

pub fn create_coinbase_transaction(
    block_index: Natural,
    timestamp: Natural,
    miner_address: &str,
    mining_reward: Amount,
) -> Transaction {
    CoinbaseTransaction::new(block_index, timestamp, miner_address, mining_reward).into()
}

/// MineBlock: BlockTemplate × ℕ → ℬ
///
/// Search for a nonce meeting `difficulty` and seal the template into a block,
/// logging under `node_id`.
pub fn mine_block(node_id: &str, template: BlockTemplate, difficulty: usize) -> Result<Block> {
    let BlockTemplate {
        mut header,
        transactions,
    } = template;

    debug!(
        "[{}] Mining block {} with {} transactions at difficulty {}",
        node_id,
        header.index,
        transactions.len(),
        difficulty
    );
    let (nonce, hash) = proof_of_work(node_id, &header, difficulty)?;
    header.nonce = nonce;

    Ok(Block {
        header,
        transactions,
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::check_proof_of_work;

    #[test]
    fn test_create_block_template_links_to_last_block() {
        let genesis = Block::genesis(1700000000000).unwrap();
        let template = create_block_template(&genesis, vec![], "miner", 10, 1700000000001);

        assert_eq!(template.header.index, 1);
        assert_eq!(template.header.previous_hash, genesis.hash);
        assert_eq!(template.header.nonce, 0);
        assert_eq!(template.transactions.len(), 1);
        assert!(template.transactions[0].is_coinbase());
        assert_eq!(
            template.header.merkle_root,
            calculate_merkle_root(&template.transactions)
        );
    }

    #[test]
    fn test_coinbase_comes_first() {
        let genesis = Block::genesis(0).unwrap();
        let other = create_coinbase_transaction(7, 1, "other", 10);
        let template = create_block_template(&genesis, vec![other.clone()], "miner", 10, 2);

        assert_eq!(template.transactions.len(), 2);
        assert_eq!(template.transactions[0].outputs()[0].recipient_address, "miner");
        assert_eq!(template.transactions[1], other);
    }

    #[test]
    fn test_mine_block_meets_difficulty() {
        let genesis = Block::genesis(0).unwrap();
        let template = create_block_template(&genesis, vec![], "miner", 10, 1);
        let block = mine_block("test", template, 2).unwrap();

        assert!(block.hash.starts_with("00"));
        assert!(check_proof_of_work(&block, 2).unwrap());
    }
}

//! Mempool admission through nodes

use utxo_consensus::mempool::accept_to_memory_pool;
use utxo_consensus::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn funded_node(network: &Network, id: &str) -> anyhow::Result<Node> {
    let mut node = Node::new(id, ChainConfig::default().with_difficulty(1), network)?;
    node.mine_new_block()?.expect("block accepted");
    Ok(node)
}

fn transfer(node: &Node, to: &str, amount: Amount) -> anyhow::Result<TransferTransaction> {
    let (inputs, _) = node.ledger().get_spendable_outputs(node.address(), amount);
    let mut tx = TransferTransaction::new(node.wallet(), to, amount, inputs)?;
    tx.sign(node.wallet())?;
    anyhow::ensure!(tx.process_transaction(node.ledger().utxos())?.is_valid());
    Ok(tx)
}

#[test]
fn test_second_spend_of_same_output_is_rejected() -> anyhow::Result<()> {
    init_logger();
    let network = Network::new();
    let mut node = funded_node(&network, "a")?;

    let first = transfer(&node, "bob", 10)?;
    let second = transfer(&node, "carol", 10)?;
    assert_ne!(first.transaction_id, second.transaction_id);

    assert!(node.add_transaction_to_mempool(first.into())?.is_accepted());
    let result = node.add_transaction_to_mempool(second.into())?;
    assert!(matches!(result, MempoolResult::Rejected(_)));
    assert_eq!(node.mempool().len(), 1);
    Ok(())
}

#[test]
fn test_create_transaction_refuses_to_double_spend() -> anyhow::Result<()> {
    init_logger();
    let network = Network::new();
    let mut node = funded_node(&network, "a")?;

    node.create_transaction("bob", 10)?;
    // the coinbase is still unspent in the ledger, so the same output is selected again
    let result = node.create_transaction("carol", 10);
    assert!(matches!(result, Err(ConsensusError::TransactionValidation(_))));
    assert_eq!(node.mempool().len(), 1);
    Ok(())
}

#[test]
fn test_output_total_must_equal_input_total() -> anyhow::Result<()> {
    init_logger();
    let network = Network::new();
    let node = funded_node(&network, "a")?;

    // well formed and validly signed, but keeps 1 as a fee
    let mut tx = transfer(&node, "bob", 4)?;
    tx.outputs[1].amount -= 1;
    assert!(tx.is_signature_valid());

    let result = accept_to_memory_pool(&tx.into(), node.ledger().utxos(), node.mempool())?;
    assert!(matches!(result, MempoolResult::Rejected(_)));
    Ok(())
}

#[test]
fn test_extra_recipient_is_rejected() -> anyhow::Result<()> {
    init_logger();
    let network = Network::new();
    let node = funded_node(&network, "a")?;

    let mut tx = transfer(&node, "bob", 4)?;
    tx.outputs[1].amount -= 2;
    let extra = TransactionOutput::new("carol", 2, tx.transaction_id.as_str(), 2);
    tx.outputs.push(extra);

    let result = accept_to_memory_pool(&tx.into(), node.ledger().utxos(), node.mempool())?;
    assert!(matches!(result, MempoolResult::Rejected(_)));
    Ok(())
}

#[test]
fn test_mined_transaction_leaves_mempool() -> anyhow::Result<()> {
    init_logger();
    let network = Network::new();
    let mut node = funded_node(&network, "a")?;

    let tx = node.create_transaction("bob", 3)?;
    assert!(node.mempool().contains(tx.transaction_id()));

    node.mine_new_block()?.expect("block accepted");
    assert!(!node.mempool().contains(tx.transaction_id()));
    assert_eq!(node.ledger().get_balance("bob"), 3);
    Ok(())
}

//! Multi-node simulation over the message transport

use std::sync::{Arc, Mutex};
use std::thread;
use utxo_consensus::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config() -> ChainConfig {
    ChainConfig::default().with_difficulty(1)
}

/// Three fully connected nodes.
fn mesh(network: &Network) -> anyhow::Result<Vec<Node>> {
    let ids = ["node1", "node2", "node3"];
    let mut nodes = Vec::new();
    for id in ids {
        let mut node = Node::new(id, config(), network)?;
        for peer in ids {
            node.add_peer(peer);
        }
        nodes.push(node);
    }
    Ok(nodes)
}

/// Deliver messages and resolve chains until every inbox is empty.
fn settle(nodes: &mut [Node]) -> anyhow::Result<()> {
    for _ in 0..10 {
        let mut handled = 0;
        for node in nodes.iter_mut() {
            handled += node.process_inbox()?;
            node.resolve_pending_chains()?;
        }
        if handled == 0 {
            return Ok(());
        }
    }
    anyhow::bail!("network did not settle")
}

fn assert_converged(nodes: &[Node]) {
    let reference = nodes[0].ledger();
    for node in &nodes[1..] {
        assert_eq!(node.ledger().chain(), reference.chain(), "{} diverged", node.node_id());
        assert_eq!(node.ledger().utxos(), reference.utxos());
    }
}

#[test]
fn test_three_node_rounds() -> anyhow::Result<()> {
    init_logger();
    let network = Network::new();
    let mut nodes = mesh(&network)?;
    assert_eq!(nodes[0].peers().len(), 2);

    // round 1: node1 mines the first coinbase, everyone syncs
    nodes[0].mine_new_block()?.expect("block accepted");
    settle(&mut nodes)?;
    assert_converged(&nodes);
    assert_eq!(nodes[0].balance(), MINING_REWARD);

    // round 2: node1 pays node2, node3 mines it
    let node2_address = nodes[1].address().to_string();
    let tx = nodes[0].create_transaction(&node2_address, 7)?;
    settle(&mut nodes)?;
    assert!(nodes[2].mempool().contains(tx.transaction_id()));

    nodes[2].mine_new_block()?.expect("block accepted");
    settle(&mut nodes)?;
    assert_converged(&nodes);
    assert_eq!(nodes[0].balance(), 3);
    assert_eq!(nodes[1].balance(), 7);
    assert_eq!(nodes[2].balance(), MINING_REWARD);
    for node in &nodes {
        assert!(node.mempool().is_empty(), "{} kept a mined transaction", node.node_id());
    }

    // round 3: node2 pays node1, node1 mines it
    let node1_address = nodes[0].address().to_string();
    nodes[1].create_transaction(&node1_address, 2)?;
    settle(&mut nodes)?;
    nodes[0].mine_new_block()?.expect("block accepted");
    settle(&mut nodes)?;
    assert_converged(&nodes);

    assert_eq!(nodes[0].balance(), 3 + 2 + MINING_REWARD);
    assert_eq!(nodes[1].balance(), 5);
    assert_eq!(nodes[0].ledger().chain_len(), 4);
    assert!(nodes[0].ledger().is_chain_valid(None)?);
    Ok(())
}

#[test]
fn test_concurrent_miners_converge_on_longest_chain() -> anyhow::Result<()> {
    init_logger();
    let network = Network::new();
    let nodes: Vec<Arc<Mutex<Node>>> = mesh(&network)?
        .into_iter()
        .map(|node| Arc::new(Mutex::new(node)))
        .collect();

    let handles: Vec<_> = [(0usize, 3usize), (1, 1)]
        .into_iter()
        .map(|(i, blocks)| {
            let node = Arc::clone(&nodes[i]);
            thread::spawn(move || {
                for _ in 0..blocks {
                    let mut node = node.lock().unwrap();
                    node.mine_new_block().unwrap().expect("block accepted");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut nodes: Vec<Node> = nodes
        .into_iter()
        .map(|node| Arc::try_unwrap(node).unwrap().into_inner().unwrap())
        .collect();
    settle(&mut nodes)?;

    assert_converged(&nodes);
    assert_eq!(nodes[0].ledger().chain_len(), 4);
    assert_eq!(nodes[0].balance(), 3 * MINING_REWARD);
    assert_eq!(nodes[1].balance(), 0);
    Ok(())
}

#[test]
fn test_chain_request_reply() -> anyhow::Result<()> {
    init_logger();
    let network = Network::new();
    let mut nodes = mesh(&network)?;
    nodes[0].mine_new_block()?.expect("block accepted");
    nodes[0].mine_new_block()?.expect("block accepted");

    // handle the relayed blocks first, then ask explicitly
    for node in nodes.iter_mut().skip(1) {
        node.process_inbox()?;
        node.resolve_pending_chains()?;
    }
    assert_eq!(nodes[2].request_chains(), 2);
    nodes[0].process_inbox()?;
    nodes[1].process_inbox()?;
    nodes[2].process_inbox()?;

    assert!(!nodes[2].pending_chains().is_empty());
    nodes[2].resolve_pending_chains()?;
    assert_eq!(nodes[2].ledger().chain(), nodes[0].ledger().chain());
    Ok(())
}

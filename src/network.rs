//! In-process message transport between nodes
//!
//! Every node registers an inbox with a shared [`Network`] and talks to peers
//! only through [`Network::send`]. Nodes never call into each other directly, so
//! each node can live on its own thread.

use crate::error::{ConsensusError, Result};
use crate::mempool::MempoolResult;
use crate::node::{Node, ReceivedBlock};
use crate::types::*;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};

pub type NodeId = String;

/// Messages exchanged between nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMessage {
    /// Relay of a signed transfer
    Transaction(Transaction),
    /// Relay of a freshly mined block
    Block(Block),
    /// Request for the receiver's full chain
    GetChain,
    /// Full chain, in reply to `GetChain`
    Chain(Vec<Block>),
}

/// A message together with the id of the node that sent it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: NodeId,
    pub message: NetworkMessage,
}

/// Response produced by handling one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkResponse {
    Ok,
    Reject(String),
    /// Reply to be sent back to the originating node
    SendMessage(NetworkMessage),
}

/// Registry of node inboxes; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct Network {
    inboxes: Arc<Mutex<HashMap<NodeId, mpsc::Sender<Envelope>>>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the inbox for `node_id`. Each id may register once.
    pub fn register(&self, node_id: &str) -> Result<mpsc::Receiver<Envelope>> {
        let mut inboxes = self.lock()?;
        if inboxes.contains_key(node_id) {
            return Err(ConsensusError::Network(format!(
                "node {} is already registered",
                node_id
            )));
        }
        let (tx, rx) = mpsc::channel();
        inboxes.insert(node_id.to_string(), tx);
        Ok(rx)
    }

    /// Deliver `message` from `from` into the inbox of `to`.
    pub fn send(&self, from: &str, to: &str, message: NetworkMessage) -> Result<()> {
        let inboxes = self.lock()?;
        let inbox = inboxes
            .get(to)
            .ok_or_else(|| ConsensusError::Network(format!("unknown node {}", to)))?;
        inbox
            .send(Envelope {
                from: from.to_string(),
                message,
            })
            .map_err(|_| ConsensusError::Network(format!("inbox of {} is closed", to)))
    }

    pub fn node_ids(&self) -> Result<Vec<NodeId>> {
        let mut ids: Vec<NodeId> = self.lock()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<NodeId, mpsc::Sender<Envelope>>>> {
        self.inboxes
            .lock()
            .map_err(|_| ConsensusError::Network("network registry lock poisoned".to_string()))
    }
}

/// Process incoming network message
pub fn process_network_message(node: &mut Node, envelope: Envelope) -> Result<NetworkResponse> {
    let Envelope { from, message } = envelope;
    debug!("[{}] Received {} from {}", node.node_id(), kind(&message), from);

    match message {
        NetworkMessage::Transaction(tx) => process_transaction_message(node, tx),
        NetworkMessage::Block(block) => process_block_message(node, block, &from),
        NetworkMessage::GetChain => process_getchain_message(node),
        NetworkMessage::Chain(chain) => process_chain_message(node, chain, &from),
    }
}

/// Process transaction message
fn process_transaction_message(node: &mut Node, tx: Transaction) -> Result<NetworkResponse> {
    match node.receive_transaction(tx)? {
        MempoolResult::Accepted => Ok(NetworkResponse::Ok),
        MempoolResult::Rejected(reason) => Ok(NetworkResponse::Reject(reason)),
    }
}

/// Process block message
fn process_block_message(node: &mut Node, block: Block, from: &str) -> Result<NetworkResponse> {
    match node.receive_block(&block, from)? {
        ReceivedBlock::Applied | ReceivedBlock::Stale => Ok(NetworkResponse::Ok),
        ReceivedBlock::Rejected(reason) => Ok(NetworkResponse::Reject(reason)),
        ReceivedBlock::Ahead => Ok(NetworkResponse::SendMessage(NetworkMessage::GetChain)),
    }
}

/// Process getchain message
fn process_getchain_message(node: &mut Node) -> Result<NetworkResponse> {
    Ok(NetworkResponse::SendMessage(NetworkMessage::Chain(
        node.ledger().chain().to_vec(),
    )))
}

/// Process chain message
fn process_chain_message(node: &mut Node, chain: Vec<Block>, from: &str) -> Result<NetworkResponse> {
    if chain.is_empty() {
        return Ok(NetworkResponse::Reject("Empty chain".to_string()));
    }
    node.queue_peer_chain(from, chain);
    Ok(NetworkResponse::Ok)
}

fn kind(message: &NetworkMessage) -> &'static str {
    match message {
        NetworkMessage::Transaction(_) => "transaction",
        NetworkMessage::Block(_) => "block",
        NetworkMessage::GetChain => "chain request",
        NetworkMessage::Chain(_) => "chain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_send() {
        let network = Network::new();
        let inbox = network.register("b").unwrap();
        network.send("a", "b", NetworkMessage::GetChain).unwrap();

        let envelope = inbox.try_recv().unwrap();
        assert_eq!(envelope.from, "a");
        assert_eq!(envelope.message, NetworkMessage::GetChain);
    }

    #[test]
    fn test_register_twice_fails() {
        let network = Network::new();
        let _inbox = network.register("a").unwrap();
        assert!(matches!(network.register("a"), Err(ConsensusError::Network(_))));
    }

    #[test]
    fn test_send_to_unknown_node_fails() {
        let network = Network::new();
        let result = network.send("a", "nobody", NetworkMessage::GetChain);
        assert!(matches!(result, Err(ConsensusError::Network(_))));
    }

    #[test]
    fn test_send_to_dropped_inbox_fails() {
        let network = Network::new();
        drop(network.register("b").unwrap());
        assert!(network.send("a", "b", NetworkMessage::GetChain).is_err());
    }

    #[test]
    fn test_clones_share_registry() {
        let network = Network::new();
        let _a = network.register("a").unwrap();
        let _b = network.clone().register("b").unwrap();
        assert_eq!(network.node_ids().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_messages_serialize() {
        let json = serde_json::to_string(&NetworkMessage::GetChain).unwrap();
        let back: NetworkMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NetworkMessage::GetChain);
    }
}

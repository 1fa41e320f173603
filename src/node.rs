//! A participant in the network: wallet, ledger, mempool and peers
//!
//! All state of a node is owned by the [`Node`] value. Operations that check and
//! then mutate (block application, mempool admission, mining) take `&mut self`,
//! so sharing a node across threads means wrapping it in `Arc<Mutex<Node>>`.

use crate::config::ChainConfig;
use crate::crypto::{Signer, Wallet};
use crate::error::{ConsensusError, Result};
use crate::ledger::Ledger;
use crate::mempool::{Mempool, MempoolResult};
use crate::network::{process_network_message, Envelope, Network, NetworkMessage, NetworkResponse, NodeId};
use crate::reorganization::{select_longest_valid_chain, PeerChain};
use crate::types::*;
use log::{debug, info, warn};
use std::sync::mpsc;

/// What happened to a block received from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedBlock {
    /// Extended the local tip
    Applied,
    /// Linked to the local tip but failed validation
    Rejected(String),
    /// Beyond the local tip; the sender's chain is needed
    Ahead,
    /// At or below the local tip; ignored
    Stale,
}

#[derive(Debug)]
pub struct Node {
    node_id: NodeId,
    wallet: Wallet,
    ledger: Ledger,
    mempool: Mempool,
    peers: Vec<NodeId>,
    network: Network,
    inbox: mpsc::Receiver<Envelope>,
    pending_chains: Vec<PeerChain>,
}

impl Node {
    /// Create a node with a fresh wallet and register it on `network`.
    pub fn new(node_id: impl Into<NodeId>, config: ChainConfig, network: &Network) -> Result<Self> {
        Self::with_wallet(node_id, Wallet::generate(), config, network)
    }

    pub fn with_wallet(
        node_id: impl Into<NodeId>,
        wallet: Wallet,
        config: ChainConfig,
        network: &Network,
    ) -> Result<Self> {
        let node_id = node_id.into();
        let inbox = network.register(&node_id)?;
        let ledger = Ledger::new(node_id.as_str(), config)?;
        info!("[{}] Node created, wallet address {}", node_id, wallet.address());

        Ok(Self {
            node_id,
            wallet,
            ledger,
            mempool: Mempool::new(),
            peers: Vec::new(),
            network: network.clone(),
            inbox,
            pending_chains: Vec::new(),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn address(&self) -> &str {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn peers(&self) -> &[NodeId] {
        &self.peers
    }

    pub fn balance(&self) -> Amount {
        self.ledger.get_balance(self.wallet.address())
    }

    /// Add `peer_id` unless it is this node or already known.
    pub fn add_peer(&mut self, peer_id: impl Into<NodeId>) -> bool {
        let peer_id = peer_id.into();
        if peer_id == self.node_id || self.peers.contains(&peer_id) {
            return false;
        }
        info!("[{}] Peer {} added", self.node_id, peer_id);
        self.peers.push(peer_id);
        true
    }

    /// Build, sign and process a transfer of `amount` to `recipient_address`,
    /// admit it locally and relay it to every peer.
    pub fn create_transaction(&mut self, recipient_address: &str, amount: Amount) -> Result<Transaction> {
        let balance = self.balance();
        if balance < amount {
            info!("[{}] Insufficient balance {} to send {}", self.node_id, balance, amount);
            return Err(self.insufficient_funds(amount, balance));
        }

        let (inputs, total) = self.ledger.get_spendable_outputs(self.wallet.address(), amount);
        if inputs.is_empty() {
            info!("[{}] No spendable outputs cover {}", self.node_id, amount);
            return Err(self.insufficient_funds(amount, total));
        }

        let mut transfer = TransferTransaction::new(&self.wallet, recipient_address, amount, inputs)?;
        transfer.sign(&self.wallet)?;
        if let ValidationResult::Invalid(reason) = transfer.process_transaction(self.ledger.utxos())? {
            return Err(ConsensusError::TransactionValidation(reason));
        }
        info!(
            "[{}] Transaction {} created: {} -> {} amount {}",
            self.node_id, transfer.transaction_id, transfer.sender_address, recipient_address, amount
        );

        let tx = Transaction::from(transfer);
        if let MempoolResult::Rejected(reason) = self.add_transaction_to_mempool(tx.clone())? {
            return Err(ConsensusError::TransactionValidation(reason));
        }
        self.broadcast_transaction(&tx);
        Ok(tx)
    }

    fn insufficient_funds(&self, requested: Amount, available: Amount) -> ConsensusError {
        ConsensusError::InsufficientFunds {
            address: self.wallet.address().to_string(),
            requested,
            available,
        }
    }

    /// Admit `tx` to the local mempool against the current UTXO set.
    pub fn add_transaction_to_mempool(&mut self, tx: Transaction) -> Result<MempoolResult> {
        let tx_id = tx.transaction_id().to_string();
        let conflict = tx
            .input_ids()
            .into_iter()
            .find_map(|id| self.mempool.spender_of(id).map(|spender| (id.to_string(), spender.to_string())))
            .filter(|(_, spender)| *spender != tx_id);

        let result = self.mempool.admit(tx, self.ledger.utxos())?;
        if let MempoolResult::Rejected(reason) = &result {
            match conflict {
                Some((output, spender)) => warn!(
                    "[{}] Double spend of {} by {} (already spent by {})",
                    self.node_id, output, tx_id, spender
                ),
                None => debug!("[{}] Transaction {} rejected: {}", self.node_id, tx_id, reason),
            }
        }
        Ok(result)
    }

    pub fn broadcast_transaction(&self, tx: &Transaction) -> usize {
        debug!("[{}] Broadcasting transaction {}", self.node_id, tx.transaction_id());
        self.broadcast(NetworkMessage::Transaction(tx.clone()))
    }

    pub fn receive_transaction(&mut self, tx: Transaction) -> Result<MempoolResult> {
        self.add_transaction_to_mempool(tx)
    }

    /// Mine every pending transaction into a new block and relay it.
    ///
    /// Returns `None` when the mined block failed validation. Pending
    /// transactions that do not connect on their own are then evicted, so the
    /// next attempt mines without them.
    pub fn mine_new_block(&mut self) -> Result<Option<Block>> {
        let pending = self.mempool.to_vec();
        let block = match self.ledger.mine_block(pending, self.wallet.address())? {
            Some(block) => block,
            None => {
                let evicted = self
                    .mempool
                    .evict_unconnectable(self.ledger.utxos(), self.ledger.config().mining_reward);
                warn!(
                    "[{}] Mined block was rejected; evicted {} pending transactions",
                    self.node_id, evicted
                );
                return Ok(None);
            }
        };

        self.prune_mempool(&block);
        self.broadcast_block(&block);
        Ok(Some(block))
    }

    pub fn broadcast_block(&self, block: &Block) -> usize {
        debug!("[{}] Broadcasting block {}", self.node_id, block.header.index);
        self.broadcast(NetworkMessage::Block(block.clone()))
    }

    /// Handle a block relayed by `from`.
    pub fn receive_block(&mut self, block: &Block, from: &str) -> Result<ReceivedBlock> {
        info!("[{}] Received block {} from {}", self.node_id, block.header.index, from);
        let last = self.ledger.last_block();
        let tip_index = last.header.index;
        let extends_tip = block.header.previous_hash == last.hash && block.header.index == tip_index + 1;

        if extends_tip {
            return match self.ledger.add_block(block)? {
                ValidationResult::Valid => {
                    self.prune_mempool(block);
                    Ok(ReceivedBlock::Applied)
                }
                ValidationResult::Invalid(reason) => Ok(ReceivedBlock::Rejected(reason)),
            };
        }

        if block.header.index > tip_index {
            info!(
                "[{}] Block {} from {} is ahead of local tip {}",
                self.node_id, block.header.index, from, tip_index
            );
            return Ok(ReceivedBlock::Ahead);
        }
        Ok(ReceivedBlock::Stale)
    }

    fn prune_mempool(&mut self, block: &Block) {
        let included = self.mempool.remove_included(block);
        let evicted = self.mempool.evict_spent(self.ledger.utxos());
        debug!(
            "[{}] Mempool pruned after block {}: {} included, {} evicted, {} left",
            self.node_id,
            block.header.index,
            included,
            evicted,
            self.mempool.len()
        );
    }

    /// Drain the inbox, handling every message and sending any replies.
    ///
    /// Returns the number of messages handled.
    pub fn process_inbox(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Ok(envelope) = self.inbox.try_recv() {
            let from = envelope.from.clone();
            match process_network_message(self, envelope)? {
                NetworkResponse::Ok => {}
                NetworkResponse::Reject(reason) => {
                    debug!("[{}] Rejected message from {}: {}", self.node_id, from, reason)
                }
                NetworkResponse::SendMessage(reply) => {
                    if let Err(e) = self.network.send(&self.node_id, &from, reply) {
                        warn!("[{}] Reply to {} failed: {}", self.node_id, from, e);
                    }
                }
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Ask every peer for its full chain.
    pub fn request_chains(&self) -> usize {
        self.broadcast(NetworkMessage::GetChain)
    }

    /// Keep the latest chain received from `from` for the next resolution.
    pub fn queue_peer_chain(&mut self, from: &str, chain: Vec<Block>) {
        self.pending_chains.retain(|peer| peer.node_id != from);
        self.pending_chains.push(PeerChain {
            node_id: from.to_string(),
            chain,
        });
    }

    pub fn pending_chains(&self) -> &[PeerChain] {
        &self.pending_chains
    }

    /// Adopt the longest valid chain among `peers` if it beats the local one.
    ///
    /// On a switch the chain and UTXO set are swapped in together and the
    /// mempool is cleared; pending transactions must be resubmitted.
    pub fn resolve_conflicts(&mut self, peers: &[PeerChain]) -> Result<bool> {
        let result = match select_longest_valid_chain(&self.ledger, peers)? {
            Some(result) => result,
            None => {
                debug!("[{}] Local chain is the longest, nothing to resolve", self.node_id);
                return Ok(false);
            }
        };

        info!(
            "[{}] Switching to chain of {} (length {}, {} local blocks abandoned)",
            self.node_id,
            result.source,
            result.new_chain.len(),
            result.reorganization_depth
        );
        self.ledger.replace_state(result.new_chain, result.new_utxo_set);
        self.mempool.clear();
        info!("[{}] Mempool cleared after chain switch", self.node_id);
        Ok(true)
    }

    /// Resolve against every chain received since the last call.
    pub fn resolve_pending_chains(&mut self) -> Result<bool> {
        let pending = std::mem::take(&mut self.pending_chains);
        self.resolve_conflicts(&pending)
    }

    /// Copy of the local chain, as a peer would observe it.
    pub fn chain_snapshot(&self) -> PeerChain {
        PeerChain {
            node_id: self.node_id.clone(),
            chain: self.ledger.chain().to_vec(),
        }
    }

    fn broadcast(&self, message: NetworkMessage) -> usize {
        let mut delivered = 0;
        for peer in &self.peers {
            match self.network.send(&self.node_id, peer, message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("[{}] Send to {} failed: {}", self.node_id, peer, e),
            }
        }
        delivered
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use common_crypto::NodeAddress;
use core_mempool::TxPool;
use core_network::NetworkService;
use parking_lot::Mutex;
use protocol::codec::FixedCodec;
use protocol::shutdown::CancellationToken;
use protocol::traits::{BlockStorage, Gossip, MemPool, MemPoolAdapter, MessageHandler};
use protocol::types::{BlockAvailability, BlockHeight, BlockPair, CommitteeMember, TimestampSeconds};
use protocol::ProtocolResult;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use core_consensus::CommitteeSource;
use core_storage::sync::{SyncEvent, SyncTransport};

const MEMPOOL_TX_TOPIC: &str = "mempool-tx";

/// Feeds accepted transactions out over gossip and reports liveness back to
/// the pool (§4.D). The pool is wired in after construction via
/// [`set_mempool`](Self::set_mempool) because `TxPool::new` itself needs an
/// adapter - holding only a [`Weak`] handle avoids a reference cycle.
pub struct NetworkMempoolAdapter {
    network: Arc<NetworkService>,
    mempool: Mutex<Weak<TxPool>>,
    synced:  AtomicBool,
}

impl NetworkMempoolAdapter {
    pub fn new(network: Arc<NetworkService>) -> Arc<Self> {
        Arc::new(NetworkMempoolAdapter { network, mempool: Mutex::new(Weak::new()), synced: AtomicBool::new(true) })
    }

    pub fn set_mempool(&self, mempool: &Arc<TxPool>) {
        *self.mempool.lock() = Arc::downgrade(mempool);
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    pub fn register_listener(self: &Arc<Self>) {
        self.network.register_listener(MEMPOOL_TX_TOPIC, Arc::clone(self) as Arc<dyn MessageHandler>);
    }
}

#[async_trait]
impl MemPoolAdapter for NetworkMempoolAdapter {
    async fn broadcast_tx(&self, tx: protocol::types::SignedTransaction) -> ProtocolResult<()> {
        self.network.broadcast(MEMPOOL_TX_TOPIC, tx.encode_fixed()?).await
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for NetworkMempoolAdapter {
    async fn handle(&self, _sender: NodeAddress, _topic: String, data: Bytes) {
        let tx = match protocol::types::SignedTransaction::decode_fixed(data) {
            Ok(tx) => tx,
            Err(_) => return,
        };
        let mempool = match self.mempool.lock().upgrade() {
            Some(mempool) => mempool,
            None => return,
        };
        if let Err(err) = mempool.add_new_transaction(tx).await {
            log::debug!(target: "run", "gossiped transaction rejected: {}", err);
        }
    }
}

/// Reads the committee once from the configured genesis address list (§4.F
/// Open Question: this node carries no on-chain registry or per-validator
/// weight input, so every genesis validator is given equal weight 1 and the
/// roster never changes after bootstrap).
pub struct GenesisCommitteeSource {
    members: Vec<CommitteeMember>,
}

impl GenesisCommitteeSource {
    pub fn new(validators: Vec<NodeAddress>) -> Self {
        let members = validators.into_iter().map(|address| CommitteeMember { address, weight: 1 }).collect();
        GenesisCommitteeSource { members }
    }
}

#[async_trait]
impl CommitteeSource for GenesisCommitteeSource {
    async fn members_at(&self, _reference_time: TimestampSeconds) -> ProtocolResult<Vec<CommitteeMember>> {
        Ok(self.members.clone())
    }
}

const SYNC_TOPIC: &str = "sync-wire";

#[derive(Clone, Debug, Serialize, Deserialize)]
enum SyncWireMessage {
    AvailabilityRequest { since_height: BlockHeight, descending: bool },
    AvailabilityResponse(BlockAvailability),
    BatchRequest { heights: Vec<BlockHeight> },
    BatchResponse { blocks: Vec<BlockPair> },
}

/// Gossip-backed [`SyncTransport`] (§4.C): availability is broadcast and
/// collected through the sync driver's own event channel, batches are
/// fetched peer-to-peer through a one-shot request/response correlated by
/// sender address.
pub struct NetworkSyncTransport {
    network:         Arc<NetworkService>,
    local_address:   NodeAddress,
    storage:         Arc<dyn BlockStorage>,
    events:          mpsc::Sender<SyncEvent>,
    pending_batches: Mutex<HashMap<NodeAddress, oneshot::Sender<Vec<BlockPair>>>>,
}

impl NetworkSyncTransport {
    pub fn new(
        network: Arc<NetworkService>,
        local_address: NodeAddress,
        storage: Arc<dyn BlockStorage>,
        events: mpsc::Sender<SyncEvent>,
    ) -> Arc<Self> {
        Arc::new(NetworkSyncTransport { network, local_address, storage, events, pending_batches: Mutex::new(HashMap::new()) })
    }

    pub fn register_listener(self: &Arc<Self>) {
        self.network.register_listener(SYNC_TOPIC, Arc::clone(self) as Arc<dyn MessageHandler>);
    }

    async fn local_availability(&self) -> ProtocolResult<BlockAvailability> {
        let top = self.storage.top_height().await?;
        let last_hash = match self.storage.get_block_by_height(top).await? {
            Some(pair) => pair.hash(),
            None => common_crypto::Hash::ZERO,
        };
        Ok(BlockAvailability { sender: self.local_address, first_height: 1, last_height: top, last_hash })
    }
}

#[async_trait]
impl SyncTransport for NetworkSyncTransport {
    async fn broadcast_availability_request(&self, since_height: BlockHeight, descending: bool) -> bool {
        let message = SyncWireMessage::AvailabilityRequest { since_height, descending };
        let data = match message.encode_fixed() {
            Ok(data) => data,
            Err(_) => return false,
        };
        self.network.broadcast(SYNC_TOPIC, data).await.is_ok()
    }

    async fn request_batch(&self, peer: NodeAddress, heights: &[BlockHeight]) -> Option<Vec<BlockPair>> {
        let (tx, rx) = oneshot::channel();
        self.pending_batches.lock().insert(peer, tx);

        let message = SyncWireMessage::BatchRequest { heights: heights.to_vec() };
        let data = message.encode_fixed().ok()?;
        if self.network.unicast(peer, SYNC_TOPIC, data).await.is_err() {
            self.pending_batches.lock().remove(&peer);
            return None;
        }

        rx.await.ok()
    }
}

#[async_trait]
impl MessageHandler for NetworkSyncTransport {
    async fn handle(&self, sender: NodeAddress, _topic: String, data: Bytes) {
        let message = match SyncWireMessage::decode_fixed(data) {
            Ok(message) => message,
            Err(_) => return,
        };
        match message {
            SyncWireMessage::AvailabilityRequest { .. } => {
                let avail = match self.local_availability().await {
                    Ok(avail) => avail,
                    Err(_) => return,
                };
                let reply = SyncWireMessage::AvailabilityResponse(avail);
                if let Ok(data) = reply.encode_fixed() {
                    let _ = self.network.unicast(sender, SYNC_TOPIC, data).await;
                }
            }
            SyncWireMessage::AvailabilityResponse(avail) => {
                let _ = self.events.clone().send(SyncEvent::AvailabilityResponse(avail)).await;
            }
            SyncWireMessage::BatchRequest { heights } => {
                let mut blocks = Vec::with_capacity(heights.len());
                for height in heights {
                    match self.storage.get_block_by_height(height).await {
                        Ok(Some(pair)) => blocks.push(pair),
                        _ => break,
                    }
                }
                let reply = SyncWireMessage::BatchResponse { blocks };
                if let Ok(data) = reply.encode_fixed() {
                    let _ = self.network.unicast(sender, SYNC_TOPIC, data).await;
                }
            }
            SyncWireMessage::BatchResponse { blocks } => {
                if let Some(tx) = self.pending_batches.lock().remove(&sender) {
                    let _ = tx.send(blocks);
                }
            }
        }
    }
}

/// Spawns the sync driver as a long-lived task (§5), returning the sender
/// the caller feeds commit notifications into.
pub fn spawn_sync_driver(
    network: Arc<NetworkService>,
    local_address: NodeAddress,
    storage: Arc<dyn BlockStorage>,
    config: core_storage::sync::SyncConfig,
    shutdown: CancellationToken,
    metrics: Arc<dyn common_logger::Metrics>,
) -> mpsc::Sender<SyncEvent> {
    let (events_tx, events_rx) = mpsc::channel(256);
    let transport = NetworkSyncTransport::new(network, local_address, Arc::clone(&storage), events_tx.clone());
    transport.register_listener();

    tokio::spawn(async move {
        core_storage::sync::run(transport, storage, events_rx, config, shutdown, metrics).await;
    });

    events_tx
}

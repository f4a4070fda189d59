use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common_config::GossipConfig;
use common_crypto::NodeAddress;
use common_logger::Metrics;
use parking_lot::RwLock;
use tokio::net::TcpListener;

use protocol::shutdown::CancellationToken;
use protocol::traits::{Gossip, MessageHandler};
use protocol::ProtocolResult;

use crate::codec::encode_message;
use crate::error::NetworkError;
use crate::peer::{run_inbound, run_outbound};
use crate::queue::SendQueue;

/// Owns every long-lived networking task for one node: the per-peer
/// outbound loops and the inbound accept loop (§4.B, §5). Constructed once
/// at bootstrap and handed to the components that need to gossip.
pub struct NetworkService {
    local_address: NodeAddress,
    config:        GossipConfig,
    peers:         RwLock<HashMap<NodeAddress, Arc<SendQueue>>>,
    peers_by_ip:   HashMap<IpAddr, NodeAddress>,
    listeners:     Arc<RwLock<HashMap<String, Arc<dyn MessageHandler>>>>,
    metrics:       Arc<dyn Metrics>,
}

impl NetworkService {
    pub fn new(local_address: NodeAddress, config: GossipConfig, metrics: Arc<dyn Metrics>) -> ProtocolResult<Arc<Self>> {
        let mut peers_by_ip = HashMap::new();
        for peer in &config.topology_nodes {
            let ip: IpAddr = peer.ip.parse().map_err(|_| NetworkError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid peer ip: {}", peer.ip),
            )))?;
            let node_address = peer.node_address().map_err(|_| {
                NetworkError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid peer address"))
            })?;
            peers_by_ip.insert(ip, node_address);
        }

        Ok(Arc::new(NetworkService {
            local_address,
            config,
            peers: RwLock::new(HashMap::new()),
            peers_by_ip,
            listeners: Arc::new(RwLock::new(HashMap::new())),
            metrics,
        }))
    }

    /// Spawns the inbound accept loop plus one outbound loop per configured
    /// peer, all observing `shutdown`.
    pub fn run(self: &Arc<Self>, shutdown: CancellationToken) {
        for peer in self.config.topology_nodes.clone() {
            let node_address = match peer.node_address() {
                Ok(addr) => addr,
                Err(err) => {
                    log::error!(target: "network", "skipping malformed peer {}: {}", peer.address, err);
                    continue;
                }
            };
            if node_address == self.local_address {
                continue;
            }
            let socket_addr: SocketAddr = match format!("{}:{}", peer.ip, peer.port).parse() {
                Ok(addr) => addr,
                Err(err) => {
                    log::error!(target: "network", "skipping peer with bad address {}:{}: {}", peer.ip, peer.port, err);
                    continue;
                }
            };

            let (queue, consumer) = SendQueue::new(
                node_address.to_hex(),
                self.config.send_queue_capacity,
                Arc::clone(&self.metrics),
            );
            self.peers.write().insert(node_address, queue);

            let network_timeout = self.config.gossip_network_timeout;
            let keep_alive_interval = self.config.gossip_connection_keep_alive_interval;
            let metrics = Arc::clone(&self.metrics);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_outbound(
                    node_address,
                    socket_addr,
                    consumer,
                    network_timeout,
                    keep_alive_interval,
                    shutdown,
                    metrics,
                )
                .await;
            });
        }

        let listen_addr: SocketAddr = match format!("0.0.0.0:{}", self.config.gossip_port).parse() {
            Ok(addr) => addr,
            Err(err) => {
                log::error!(target: "network", "invalid gossip port {}: {}", self.config.gossip_port, err);
                return;
            }
        };
        let service = Arc::clone(self);
        tokio::spawn(async move { service.accept_loop(listen_addr, shutdown).await });
    }

    async fn accept_loop(self: Arc<Self>, listen_addr: SocketAddr, shutdown: CancellationToken) {
        let mut listener = match TcpListener::bind(listen_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                log::error!(target: "network", "failed to bind gossip listener on {}: {}", listen_addr, err);
                return;
            }
        };
        log::info!(target: "network", "gossip listener bound on {}", listen_addr);

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => return,
                accepted = listener.accept() => accepted,
            };

            let (stream, remote_addr) = match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    log::warn!(target: "network", "accept failed: {}", err);
                    continue;
                }
            };

            let sender = match self.peers_by_ip.get(&remote_addr.ip()) {
                Some(addr) => *addr,
                None => {
                    log::warn!(target: "network", "rejecting connection from unconfigured peer {}", remote_addr);
                    continue;
                }
            };

            let listeners = Arc::clone(&self.listeners);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { run_inbound(stream, sender, listeners, shutdown).await });
        }
    }
}

#[async_trait]
impl Gossip for NetworkService {
    async fn unicast(&self, peer: NodeAddress, topic: &str, data: Bytes) -> ProtocolResult<()> {
        let queue = self
            .peers
            .read()
            .get(&peer)
            .cloned()
            .ok_or(NetworkError::UnknownPeer(peer))?;
        queue.push(encode_message(topic, data));
        Ok(())
    }

    async fn broadcast(&self, topic: &str, data: Bytes) -> ProtocolResult<()> {
        let payloads = encode_message(topic, data);
        for queue in self.peers.read().values() {
            queue.push(payloads.clone());
        }
        Ok(())
    }

    fn register_listener(&self, topic: &str, handler: Arc<dyn MessageHandler>) {
        self.listeners.write().insert(topic.to_owned(), handler);
    }
}

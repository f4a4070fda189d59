use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common_crypto::NodeAddress;
use common_logger::Metrics;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use protocol::shutdown::CancellationToken;
use protocol::traits::MessageHandler;

use crate::codec::{decode_message, keep_alive_frame, TransportCodec};
use crate::queue::SendQueueConsumer;

/// Owned outgoing task for one configured peer (§4.B, §5 "per-peer outgoing
/// send loop"). Reconnects with the same [`SendQueueConsumer`] on failure so
/// queued-but-unsent messages survive a reconnect; on shutdown it closes the
/// socket and returns without reconnecting.
pub async fn run_outbound(
    peer: NodeAddress,
    addr: SocketAddr,
    mut consumer: SendQueueConsumer,
    network_timeout: Duration,
    keep_alive_interval: Duration,
    shutdown: CancellationToken,
    metrics: Arc<dyn Metrics>,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let stream = match connect(addr, network_timeout).await {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!(target: "network", "connect to {} ({}) failed: {}", peer, addr, err);
                sleep_or_shutdown(keep_alive_interval, &shutdown).await;
                continue;
            }
        };

        log::info!(target: "network", "outbound connection established with {}", peer);
        let mut framed = Framed::new(stream, TransportCodec::default());

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!(target: "network", "outbound loop for {} shutting down", peer);
                    return;
                }
                item = consumer.pop() => match item {
                    Some(payloads) => payloads,
                    None => return,
                },
                _ = tokio::time::delay_for(keep_alive_interval) => keep_alive_frame(),
            };

            let write = write_with_timeout(&mut framed, next, network_timeout).await;
            if let Err(err) = write {
                log::warn!(target: "network", "send to {} failed: {}, reconnecting", peer, err);
                metrics.counter_inc("gossip.send_failure", 1);
                break;
            }
        }
    }
}

async fn connect(addr: SocketAddr, network_timeout: Duration) -> std::io::Result<TcpStream> {
    if network_timeout.is_zero() {
        return TcpStream::connect(addr).await;
    }
    match timeout(network_timeout, TcpStream::connect(addr)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")),
    }
}

async fn write_with_timeout(
    framed: &mut Framed<TcpStream, TransportCodec>,
    payloads: Vec<Bytes>,
    network_timeout: Duration,
) -> std::io::Result<()> {
    if network_timeout.is_zero() {
        return framed.send(payloads).await;
    }
    match timeout(network_timeout, framed.send(payloads)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out")),
    }
}

async fn sleep_or_shutdown(duration: Duration, shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::time::delay_for(duration) => {}
    }
}

/// Owned incoming task for one accepted TCP connection. The peer's identity
/// is recovered from its source IP against the configured peer table — this
/// is a permissioned, statically-configured topology, not an open network.
pub async fn run_inbound(
    stream: TcpStream,
    sender: NodeAddress,
    listeners: Arc<parking_lot::RwLock<std::collections::HashMap<String, Arc<dyn MessageHandler>>>>,
    shutdown: CancellationToken,
) {
    let mut framed = Framed::new(stream, TransportCodec::default());
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return,
            frame = framed.next() => frame,
        };

        let payloads = match frame {
            Some(Ok(payloads)) => payloads,
            Some(Err(err)) => {
                log::warn!(target: "network", "inbound read from {} failed: {}", sender, err);
                return;
            }
            None => {
                log::info!(target: "network", "inbound connection from {} closed", sender);
                return;
            }
        };

        if payloads.is_empty() {
            continue; // keep-alive
        }

        if let Some((topic, data)) = decode_message(payloads) {
            let handler = listeners.read().get(&topic).cloned();
            if let Some(handler) = handler {
                handler.handle(sender, topic, data).await;
            }
        }
    }
}

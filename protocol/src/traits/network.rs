use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common_crypto::NodeAddress;

use crate::ProtocolResult;

/// A single logical gossip payload delivered to a registered listener, along
/// with the peer it arrived from. Framing (length prefixes, padding,
/// keep-alives) is entirely a `core/network` concern; traits above that
/// layer only ever see decoded payload bytes.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, sender: NodeAddress, topic: String, data: Bytes);
}

/// Dispatch primitives exposed by the gossip transport (§4.B): unicast to a
/// single known peer, broadcast to every configured peer's send queue, and
/// register a listener for a topic. `register_listener` is synchronous —
/// it just stashes a handler in a table consulted by the inbound loops.
#[async_trait]
pub trait Gossip: Send + Sync {
    async fn unicast(&self, peer: NodeAddress, topic: &str, data: Bytes) -> ProtocolResult<()>;

    async fn broadcast(&self, topic: &str, data: Bytes) -> ProtocolResult<()>;

    fn register_listener(&self, topic: &str, handler: Arc<dyn MessageHandler>);
}

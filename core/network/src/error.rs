use std::io;

use common_crypto::NodeAddress;
use derive_more::{Display, From};
use protocol::{ProtocolError, ProtocolErrorKind};

#[derive(Debug, Display, From)]
pub enum NetworkError {
    #[display(fmt = "io error: {}", _0)]
    Io(io::Error),

    #[display(fmt = "peer {} is not configured", _0)]
    #[from(ignore)]
    UnknownPeer(NodeAddress),

    #[display(fmt = "send queue write timed out")]
    #[from(ignore)]
    WriteTimeout,

    #[display(fmt = "connect to {} timed out", _0)]
    #[from(ignore)]
    ConnectTimeout(String),
}

impl std::error::Error for NetworkError {}

impl From<NetworkError> for ProtocolError {
    fn from(err: NetworkError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Network, Box::new(err))
    }
}

use std::error::Error;

use derive_more::{Display, From};
use protocol::types::Hash;
use protocol::{ProtocolError, ProtocolErrorKind};

/// The typed admission rejections from §4.D/§7 (`TxRejectedBy*`) plus the
/// handful of internal failures that can surface through the same trait.
#[derive(Debug, Display, From)]
pub enum MempoolError {
    #[display(fmt = "tx {:?} rejected: invalid signature", tx_hash)]
    #[from(ignore)]
    RejectedBySignature { tx_hash: Hash },

    #[display(fmt = "tx {:?} rejected: timestamp out of window", tx_hash)]
    #[from(ignore)]
    RejectedByExpiry { tx_hash: Hash },

    #[display(fmt = "tx {:?} rejected: already pending or committed", tx_hash)]
    #[from(ignore)]
    RejectedByDuplicate { tx_hash: Hash },

    #[display(fmt = "tx {:?} rejected: pending pool full", tx_hash)]
    #[from(ignore)]
    RejectedByFull { tx_hash: Hash },

    #[display(fmt = "tx {:?} rejected: node not synced", tx_hash)]
    #[from(ignore)]
    RejectedByNotSynced { tx_hash: Hash },

    #[display(fmt = "tx {:?} rejected: protocol version {} exceeds configured maximum", tx_hash, version)]
    #[from(ignore)]
    RejectedByProtocolVersion { tx_hash: Hash, version: u32 },

    #[display(fmt = "tx {:?} rejected: wrong chain id {}", tx_hash, chain_id)]
    #[from(ignore)]
    RejectedByChainId { tx_hash: Hash, chain_id: u32 },
}

impl Error for MempoolError {}

impl From<MempoolError> for ProtocolError {
    fn from(error: MempoolError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Mempool, Box::new(error))
    }
}

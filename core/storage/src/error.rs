use std::io;

use derive_more::{Display, From};
use protocol::types::BlockHeight;
use protocol::{ProtocolError, ProtocolErrorKind};

#[derive(Debug, Display, From)]
pub enum StorageError {
    #[display(fmt = "io error: {}", _0)]
    Io(io::Error),

    #[display(fmt = "codec error: {}", _0)]
    #[from(ignore)]
    Codec(String),

    #[display(fmt = "protocol version {} exceeds configured maximum", _0)]
    #[from(ignore)]
    ProtocolVersionTooHigh(u32),

    #[display(fmt = "FORK!! block already in storage at height {}, {}", height, reason)]
    #[from(ignore)]
    ForkDetected { height: BlockHeight, reason: String },

    #[display(fmt = "rejected future block at height {}, top is {}", height, top)]
    #[from(ignore)]
    FutureBlockHeight { height: BlockHeight, top: BlockHeight },

    #[display(fmt = "block at height {} not found", _0)]
    #[from(ignore)]
    NotFound(BlockHeight),

    #[display(fmt = "block at height {} exceeds max file size", _0)]
    #[from(ignore)]
    BlockTooLarge(BlockHeight),
}

impl std::error::Error for StorageError {}

impl From<StorageError> for ProtocolError {
    fn from(err: StorageError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Storage, Box::new(err))
    }
}

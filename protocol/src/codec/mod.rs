use std::error::Error;

use bytes::Bytes;
use derive_more::{Display, From};
use serde::{de::DeserializeOwned, Serialize};

use crate::{ProtocolError, ProtocolErrorKind, ProtocolResult};

/// Stable, forward-compatible binary layout used both for the block file
/// (§6, codec version `0x01`) and for gossip payloads. Every implementor
/// round-trips through `Bytes` so the same encoding works as a file record
/// body and as a network message body.
pub trait FixedCodec: Sized {
    fn encode_fixed(&self) -> ProtocolResult<Bytes>;

    fn decode_fixed(bytes: Bytes) -> ProtocolResult<Self>;
}

impl<T: Serialize + DeserializeOwned> FixedCodec for T {
    fn encode_fixed(&self) -> ProtocolResult<Bytes> {
        let bytes = bincode::serialize(self).map_err(CodecError::from)?;
        Ok(Bytes::from(bytes))
    }

    fn decode_fixed(bytes: Bytes) -> ProtocolResult<Self> {
        bincode::deserialize(&bytes).map_err(|e| CodecError::from(e).into())
    }
}

#[derive(Debug, Display, From)]
pub enum CodecError {
    #[display(fmt = "bincode: {}", _0)]
    Bincode(bincode::Error),
    #[display(fmt = "wrong bytes length: {{ expect: {}, got: {} }}", expect, real)]
    WrongBytesLength { expect: usize, real: usize },
}

impl Error for CodecError {}

impl From<CodecError> for ProtocolError {
    fn from(err: CodecError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Codec, Box::new(err))
    }
}

/// The block-file codec version byte written once at the start of every
/// blocks file (§6). Bumped whenever the on-disk `BlockPair` layout changes
/// in a way old readers can't tolerate.
pub const BLOCK_FILE_CODEC_VERSION: u8 = 0x01;

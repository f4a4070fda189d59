pub mod codec;
pub mod shutdown;
pub mod traits;
pub mod types;

use std::error::Error;

use derive_more::{Constructor, Display};

pub use bytes::Bytes;
pub use common_crypto::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    Network,
    Storage,
    Mempool,
    Vm,
    Consensus,
    State,
    Codec,
    Config,
    Types,
}

/// Mirrors the narrow-kind/opaque-cause split used across every component:
/// callers match on `kind` for recovery, and format on `error` for humans.
#[derive(Debug, Constructor, Display)]
#[display(fmt = "[{:?}] {}", kind, error)]
pub struct ProtocolError {
    kind:  ProtocolErrorKind,
    error: Box<dyn Error + Send + Sync>,
}

impl ProtocolError {
    pub fn kind(&self) -> ProtocolErrorKind {
        self.kind
    }
}

impl Error for ProtocolError {}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

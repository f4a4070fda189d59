use std::error::Error;

use common_crypto::NodeAddress;
use derive_more::{Display, From};
use protocol::types::BlockHeight;
use protocol::{ProtocolError, ProtocolErrorKind};

#[derive(Debug, Display, From)]
pub enum ConsensusError {
    #[display(fmt = "committee has {} members, below configured minimum {}", have, min)]
    #[from(ignore)]
    CommitteeTooSmall { have: usize, min: usize },

    #[display(fmt = "committee order length {} does not match member count {}", order, members)]
    #[from(ignore)]
    CommitteeLengthMismatch { members: usize, order: usize },

    #[display(fmt = "missing block at height {}", _0)]
    #[from(ignore)]
    MissingBlock(BlockHeight),

    #[display(fmt = "unexpected height: expected {}, got {}", expected, actual)]
    #[from(ignore)]
    UnexpectedHeight { expected: BlockHeight, actual: BlockHeight },

    #[display(fmt = "prev-block-hash mismatch")]
    PrevHashMismatch,

    #[display(fmt = "tx_count does not match transaction list length")]
    TxCountMismatch,

    #[display(fmt = "merkle root mismatch")]
    MerkleRootMismatch,

    #[display(fmt = "block timestamp is not strictly monotonic")]
    TimestampNotMonotonic,

    #[display(fmt = "timestamp jitter {}ns exceeds allowed {}ns", jitter_nanos, allowed_nanos)]
    #[from(ignore)]
    TimestampJitterExceeded { jitter_nanos: u64, allowed_nanos: u64 },

    #[display(fmt = "results block mismatch: {}", _0)]
    #[from(ignore)]
    ResultsBlockMismatch(String),

    #[display(fmt = "quorum unreachable: committee total weight is zero")]
    QuorumUnreachable,

    #[display(fmt = "vote signature invalid")]
    InvalidVoteSignature,

    #[display(fmt = "commit proposal from {} rejected: not the configured leader", _0)]
    #[from(ignore)]
    UntrustedLeader(NodeAddress),
}

impl Error for ConsensusError {}

impl From<ConsensusError> for ProtocolError {
    fn from(error: ConsensusError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Consensus, Box::new(error))
    }
}

mod block;
mod committee;
mod primitive;
mod receipt;
mod transaction;

pub use block::{
    BlockPair, BlockProof, ResultsBlockContainer, ResultsBlockHeader, TransactionsBlockContainer,
    TransactionsBlockHeader,
};
pub use committee::CommitteeMember;
pub use primitive::{BlockHeight, Hash, NodeAddress, TimestampNano, TimestampSeconds, VirtualChainId};
pub use receipt::{state_diff_hash, ContractStateDiff, ExecutionStatus, Receipt};
pub use transaction::{BlockAvailability, SignedTransaction, TransactionPayload};

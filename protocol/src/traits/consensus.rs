use async_trait::async_trait;

use crate::types::{
    BlockHeight, CommitteeMember, NodeAddress, ResultsBlockContainer, TimestampSeconds,
    TransactionsBlockContainer, VirtualChainId,
};
use crate::ProtocolResult;

#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node_address: NodeAddress,
    pub chain_id:     VirtualChainId,
}

/// Committee selection and block-pair assembly/validation (§4.F). Kept
/// separate from the leader/follower round logic in `ConsensusAlgorithm` so
/// the benchmark and pluggable-BFT variants can share one implementation.
#[async_trait]
pub trait ConsensusContext: Send + Sync {
    /// Deterministic Fisher-Yates order over the committee as of
    /// `reference_time`, weights permuted to match.
    async fn select_committee(
        &self,
        reference_time: TimestampSeconds,
    ) -> ProtocolResult<Vec<CommitteeMember>>;

    async fn request_new_transactions_block(&self) -> ProtocolResult<TransactionsBlockContainer>;

    async fn request_new_results_block(
        &self,
        tx_block: &TransactionsBlockContainer,
    ) -> ProtocolResult<ResultsBlockContainer>;

    async fn validate_transactions_block(
        &self,
        block: &TransactionsBlockContainer,
    ) -> ProtocolResult<()>;

    async fn validate_results_block(
        &self,
        tx_block: &TransactionsBlockContainer,
        results_block: &ResultsBlockContainer,
    ) -> ProtocolResult<()>;
}

/// `InstanceId := uint64_le(0 || 0 || network_type_le16 || vchain_id_le32)`
/// (§4.G), the opaque BFT engine's handle for a running chain instance.
pub fn instance_id(network_type: u16, virtual_chain_id: VirtualChainId) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[2..4].copy_from_slice(&network_type.to_le_bytes());
    bytes[4..8].copy_from_slice(&virtual_chain_id.to_le_bytes());
    u64::from_le_bytes(bytes)
}

/// Drives block production to completion, benchmark or pluggable-BFT alike.
/// Implementors own their long-lived task(s) and report commits through
/// `ConsensusContext`'s collaborators (mempool, VM, block storage) rather
/// than returning anything from `run`.
#[async_trait]
pub trait ConsensusAlgorithm: Send + Sync {
    async fn run(&self) -> ProtocolResult<()>;

    fn current_height(&self) -> BlockHeight;
}

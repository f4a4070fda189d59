use async_trait::async_trait;
use bytes::Bytes;

use crate::types::{BlockHeight, BlockPair, ContractStateDiff};
use crate::ProtocolResult;

/// The append-only ledger (§4.C). `commit_block` implements the full
/// `CommitBlock` contract: silent success on an identical re-commit, a
/// `ForkDetected`-kind `ProtocolError` on a differing re-commit, and
/// rejection of anything above `top_height() + 1`.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    async fn commit_block(&self, pair: BlockPair) -> ProtocolResult<()>;

    async fn get_block_by_height(&self, height: BlockHeight) -> ProtocolResult<Option<BlockPair>>;

    async fn top_height(&self) -> ProtocolResult<BlockHeight>;
}

/// Height-indexed, snapshotted contract state (§4.H). `commit_height` is
/// called once per committed block with that block's state diffs;
/// `read_at` resolves the most recent write at or before the given height.
#[async_trait]
pub trait StateStorage: Send + Sync {
    async fn commit_height(
        &self,
        height: BlockHeight,
        diffs: Vec<ContractStateDiff>,
    ) -> ProtocolResult<()>;

    async fn read_at(
        &self,
        height: BlockHeight,
        contract: &str,
        key: &Bytes,
    ) -> ProtocolResult<Option<Bytes>>;
}

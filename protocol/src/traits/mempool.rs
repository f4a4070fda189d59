use async_trait::async_trait;

use crate::types::{Receipt, SignedTransaction};
use crate::ProtocolResult;

/// Pending/committed transaction pool (§4.D). `add_new_transaction` runs
/// the full admission contract; `get_transactions_for_ordering` blocks the
/// caller per the wait rule in §4.D(c); `commit_transaction_receipts`
/// drains accepted transactions out of pending into the committed pool.
#[async_trait]
pub trait MemPool: Send + Sync {
    async fn add_new_transaction(&self, tx: SignedTransaction) -> ProtocolResult<()>;

    async fn get_transactions_for_ordering(
        &self,
        max: usize,
        min: usize,
    ) -> ProtocolResult<Vec<SignedTransaction>>;

    async fn commit_transaction_receipts(&self, receipts: Vec<Receipt>) -> ProtocolResult<()>;
}

/// Collaborators the pool needs but does not own: gossip-out for accepted
/// transactions, and a liveness signal so `AddNewTransaction` can apply the
/// `node-not-synced` rejection.
#[async_trait]
pub trait MemPoolAdapter: Send + Sync {
    async fn broadcast_tx(&self, tx: SignedTransaction) -> ProtocolResult<()>;

    fn is_synced(&self) -> bool;
}

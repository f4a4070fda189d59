use std::sync::Arc;

use async_trait::async_trait;
use core_mempool::TxPool;
use core_storage::sync::SyncEvent;
use protocol::traits::{BlockStorage, MemPool};
use protocol::types::{BlockHeight, BlockPair};
use protocol::ProtocolResult;
use tokio::sync::mpsc;

/// Wraps the real block store and fans a successful commit out to every
/// collaborator that needs to know about it (§5): the mempool drains the
/// committed transactions out of its pending pool and the sync driver's
/// no-commit timer gets reset. Fan-out runs on its own task so a slow
/// subscriber never adds latency to the caller committing the block.
pub struct CommitNotifier {
    inner: Arc<dyn BlockStorage>,
    tx:    mpsc::UnboundedSender<BlockPair>,
}

impl CommitNotifier {
    pub fn new(inner: Arc<dyn BlockStorage>, mempool: Arc<TxPool>, sync_events: mpsc::Sender<SyncEvent>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<BlockPair>();
        tokio::spawn(async move {
            while let Some(pair) = rx.recv().await {
                let receipts = pair.results_block.receipts.clone();
                if let Err(err) = mempool.commit_transaction_receipts(receipts).await {
                    log::warn!(target: "run", "mempool commit notification failed: {}", err);
                }
                let _ = sync_events.clone().send(SyncEvent::CommitNotification).await;
            }
        });
        Arc::new(CommitNotifier { inner, tx })
    }
}

#[async_trait]
impl BlockStorage for CommitNotifier {
    async fn commit_block(&self, pair: BlockPair) -> ProtocolResult<()> {
        self.inner.commit_block(pair.clone()).await?;
        let _ = self.tx.send(pair);
        Ok(())
    }

    async fn get_block_by_height(&self, height: BlockHeight) -> ProtocolResult<Option<BlockPair>> {
        self.inner.get_block_by_height(height).await
    }

    async fn top_height(&self) -> ProtocolResult<BlockHeight> {
        self.inner.top_height().await
    }
}

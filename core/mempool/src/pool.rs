use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;
use protocol::traits::{MemPool, MemPoolAdapter};
use protocol::types::{BlockHeight, Receipt, SignedTransaction, TimestampNano, VirtualChainId};
use protocol::ProtocolResult;
use tokio::sync::Semaphore;

use crate::committed::CommittedPool;
use crate::error::MempoolError;
use crate::pending::PendingPool;

pub struct MempoolConfig {
    pub max_protocol_version:           u32,
    pub chain_id:                       VirtualChainId,
    pub pending_pool_size_in_bytes:     u64,
    pub max_number_of_transactions:     usize,
    pub time_between_empty_blocks:      Duration,
    pub transaction_expiration_window:  Duration,
    pub future_timestamp_grace_timeout: Duration,
    pub node_sync_reject_time:          Duration,
    pub admission_concurrency:          usize,
}

fn now_nanos() -> TimestampNano {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

/// Pending/committed pools behind the `MemPool` contract (§4.D). Admission
/// is rate-limited by a semaphore; ordering and expiry sweeps delegate to
/// `PendingPool`/`CommittedPool`.
pub struct TxPool {
    pending:      PendingPool,
    committed:    CommittedPool,
    admission:    Semaphore,
    adapter:      Arc<dyn MemPoolAdapter>,
    config:       MempoolConfig,
    last_commit:  RwLock<SystemTime>,
    commit_count: AtomicU64,
}

impl TxPool {
    pub fn new(config: MempoolConfig, adapter: Arc<dyn MemPoolAdapter>) -> Arc<Self> {
        let admission = Semaphore::new(config.admission_concurrency);
        Arc::new(TxPool {
            pending: PendingPool::new(config.pending_pool_size_in_bytes),
            committed: CommittedPool::new(),
            admission,
            adapter,
            last_commit: RwLock::new(SystemTime::now()),
            commit_count: AtomicU64::new(0),
            config,
        })
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Runs the two background sweepers from §4.D until `shutdown` fires.
    pub fn spawn_sweepers(
        self: &Arc<Self>,
        pending_interval: Duration,
        committed_interval: Duration,
        shutdown: protocol::shutdown::CancellationToken,
    ) {
        let pool = Arc::clone(self);
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::delay_for(pending_interval) => {}
                }
                let window = pool.config.transaction_expiration_window.as_nanos() as u64;
                let expired = pool.pending.sweep_expired(now_nanos(), window);
                if !expired.is_empty() {
                    log::info!(target: "mempool", "pending sweep expired {} transactions", expired.len());
                }
            }
        });

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::delay_for(committed_interval) => {}
                }
                let window = pool.config.transaction_expiration_window.as_nanos() as u64;
                pool.committed.sweep_expired(now_nanos(), window);
            }
        });
    }

    fn validate_admissible(&self, tx: &SignedTransaction, now: TimestampNano) -> Result<(), MempoolError> {
        let fingerprint = tx.fingerprint();

        if tx.payload.protocol_version > self.config.max_protocol_version {
            return Err(MempoolError::RejectedByProtocolVersion {
                tx_hash: fingerprint,
                version: tx.payload.protocol_version,
            });
        }
        if tx.payload.chain_id != self.config.chain_id {
            return Err(MempoolError::RejectedByChainId { tx_hash: fingerprint, chain_id: tx.payload.chain_id });
        }
        if tx.verify_signature().is_err() {
            return Err(MempoolError::RejectedBySignature { tx_hash: fingerprint });
        }

        let window = self.config.transaction_expiration_window.as_nanos() as u64;
        let grace = self.config.future_timestamp_grace_timeout.as_nanos() as u64;
        if tx.payload.timestamp.saturating_add(window) < now || tx.payload.timestamp > now.saturating_add(grace) {
            return Err(MempoolError::RejectedByExpiry { tx_hash: fingerprint });
        }

        if self.committed.contains(&fingerprint) || self.pending.contains(&fingerprint) {
            return Err(MempoolError::RejectedByDuplicate { tx_hash: fingerprint });
        }

        let since_last_commit = SystemTime::now().duration_since(*self.last_commit.read()).unwrap_or_default();
        let reject_window = self.config.node_sync_reject_time;
        if !self.adapter.is_synced() || (reject_window > Duration::from_secs(0) && since_last_commit > reject_window) {
            return Err(MempoolError::RejectedByNotSynced { tx_hash: fingerprint });
        }

        Ok(())
    }
}

#[async_trait]
impl MemPool for TxPool {
    async fn add_new_transaction(&self, tx: SignedTransaction) -> ProtocolResult<()> {
        let _permit = self.admission.acquire().await;

        let now = now_nanos();
        self.validate_admissible(&tx, now)?;

        let fingerprint = tx.fingerprint();
        if !self.pending.insert(tx.clone(), now) {
            let err = if self.pending.contains(&fingerprint) {
                MempoolError::RejectedByDuplicate { tx_hash: fingerprint }
            } else {
                MempoolError::RejectedByFull { tx_hash: fingerprint }
            };
            return Err(err.into());
        }

        if let Err(err) = self.adapter.broadcast_tx(tx).await {
            log::warn!(target: "mempool", "propagation broadcast failed: {}", err);
        }
        Ok(())
    }

    async fn get_transactions_for_ordering(&self, max: usize, min: usize) -> ProtocolResult<Vec<SignedTransaction>> {
        let threshold = min.max(1);
        let max = max.min(self.config.max_number_of_transactions);
        let mut changes = self.pending.subscribe();

        let deadline = if self.config.time_between_empty_blocks > Duration::from_secs(0) {
            Some(tokio::time::Instant::now() + self.config.time_between_empty_blocks)
        } else {
            None
        };

        loop {
            let selected = self.pending.select_ordered(max, |fp| self.committed.contains(fp));
            if selected.len() >= threshold {
                return Ok(selected);
            }

            match deadline {
                Some(deadline) => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        return Ok(selected);
                    }
                    let remaining = deadline - now;
                    tokio::select! {
                        _ = tokio::time::delay_for(remaining) => {
                            return Ok(self.pending.select_ordered(max, |fp| self.committed.contains(fp)));
                        }
                        changed = changes.recv() => {
                            if changed.is_none() {
                                return Ok(selected);
                            }
                        }
                    }
                }
                None => {
                    if changes.recv().await.is_none() {
                        return Ok(selected);
                    }
                }
            }
        }
    }

    async fn commit_transaction_receipts(&self, receipts: Vec<Receipt>) -> ProtocolResult<()> {
        let now = now_nanos();
        let height: BlockHeight = self.commit_count.fetch_add(1, Ordering::SeqCst) + 1;

        for receipt in receipts {
            self.pending.remove(&receipt.tx_hash);
            self.committed.insert(receipt.tx_hash, height, now);
            if !receipt.status.is_committed() {
                log::warn!(target: "mempool", "tx {:?} committed with non-success status {:?}", receipt.tx_hash, receipt.status);
            }
        }

        *self.last_commit.write() = SystemTime::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use common_crypto::PrivateKey;
    use protocol::types::TransactionPayload;

    use super::*;

    struct FakeAdapter;

    #[async_trait]
    impl MemPoolAdapter for FakeAdapter {
        async fn broadcast_tx(&self, _tx: SignedTransaction) -> ProtocolResult<()> {
            Ok(())
        }

        fn is_synced(&self) -> bool {
            true
        }
    }

    fn signed_tx(key: &PrivateKey, nonce: u8) -> SignedTransaction {
        let payload = TransactionPayload {
            protocol_version: 1,
            chain_id: 1,
            timestamp: now_nanos(),
            expiry: now_nanos() + 1_000_000_000_000,
            signer_pubkey: Bytes::copy_from_slice(key.public_key().as_bytes()),
            contract_name: "token".into(),
            method_name: "transfer".into(),
            input_args: vec![Bytes::copy_from_slice(&[nonce])],
        };
        let signature = Bytes::from(key.sign(&payload.canonical_bytes()));
        SignedTransaction { payload, signature }
    }

    fn test_pool() -> Arc<TxPool> {
        let config = MempoolConfig {
            max_protocol_version: 1,
            chain_id: 1,
            pending_pool_size_in_bytes: 1 << 20,
            max_number_of_transactions: 10,
            time_between_empty_blocks: Duration::from_millis(200),
            transaction_expiration_window: Duration::from_secs(3600),
            future_timestamp_grace_timeout: Duration::from_secs(3600),
            node_sync_reject_time: Duration::from_secs(0),
            admission_concurrency: 100,
        };
        TxPool::new(config, Arc::new(FakeAdapter))
    }

    #[tokio::test]
    async fn admits_a_valid_transaction() {
        let pool = test_pool();
        let key = PrivateKey::generate();
        pool.add_new_transaction(signed_tx(&key, 1)).await.unwrap();
        assert_eq!(pool.pending_len(), 1);
    }

    #[tokio::test]
    async fn rejects_duplicate_admission() {
        let pool = test_pool();
        let key = PrivateKey::generate();
        let tx = signed_tx(&key, 1);
        pool.add_new_transaction(tx.clone()).await.unwrap();
        assert!(pool.add_new_transaction(tx).await.is_err());
    }

    #[tokio::test]
    async fn rejects_wrong_chain_id() {
        let pool = test_pool();
        let key = PrivateKey::generate();
        let mut tx = signed_tx(&key, 1);
        tx.payload.chain_id = 2;
        assert!(pool.add_new_transaction(tx).await.is_err());
    }

    #[tokio::test(threaded_scheduler)]
    async fn get_transactions_for_ordering_wakes_on_new_arrival() {
        let pool = test_pool();
        let key = PrivateKey::generate();

        let waiter = Arc::clone(&pool);
        let wait_handle = tokio::spawn(async move { waiter.get_transactions_for_ordering(2, 1).await.unwrap() });

        tokio::time::delay_for(Duration::from_millis(20)).await;
        pool.add_new_transaction(signed_tx(&key, 1)).await.unwrap();

        let selected = tokio::time::timeout(Duration::from_secs(1), wait_handle)
            .await
            .expect("ordering call did not return in time")
            .unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[tokio::test]
    async fn get_transactions_for_ordering_times_out_with_fewer_than_min() {
        let pool = test_pool();
        let selected = pool.get_transactions_for_ordering(2, 1).await.unwrap();
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn commit_receipts_moves_tx_from_pending_to_committed() {
        let pool = test_pool();
        let key = PrivateKey::generate();
        let tx = signed_tx(&key, 1);
        let fingerprint = tx.fingerprint();
        pool.add_new_transaction(tx).await.unwrap();

        pool.commit_transaction_receipts(vec![Receipt {
            tx_hash: fingerprint,
            status: protocol::types::ExecutionStatus::Committed,
            output_args: vec![],
        }])
        .await
        .unwrap();

        assert_eq!(pool.pending_len(), 0);
        assert!(pool.committed.contains(&fingerprint));
    }
}

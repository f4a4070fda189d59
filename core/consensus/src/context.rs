use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use common_crypto::{merkle_root_ordered, sha256, Hash};
use protocol::traits::{BlockStorage, ConsensusContext, MemPool, NodeInfo, VirtualMachine};
use protocol::types::{
    state_diff_hash, CommitteeMember, Receipt, ResultsBlockContainer, ResultsBlockHeader, TimestampNano,
    TimestampSeconds, TransactionsBlockContainer, TransactionsBlockHeader,
};
use protocol::ProtocolResult;

use crate::committee::{apply_committee_order, fisher_yates_order};
use crate::error::ConsensusError;

/// The "management" collaborator: asked for the committee roster as of a
/// reference time. Business logic for how membership is derived (genesis
/// file, on-chain registry, ...) lives outside this crate.
#[async_trait]
pub trait CommitteeSource: Send + Sync {
    async fn members_at(&self, reference_time: TimestampSeconds) -> ProtocolResult<Vec<CommitteeMember>>;
}

fn now_nanos() -> TimestampNano {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

/// `next_block_timestamp(prev, now) = max(prev, now) + 1` (§4.A), strictly
/// monotonic even if the wall clock has not advanced since the last block.
fn next_block_timestamp(prev: TimestampNano, now: TimestampNano) -> TimestampNano {
    std::cmp::max(prev, now) + 1
}

fn abs_diff(a: u64, b: u64) -> u64 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

pub struct ConsensusContextConfig {
    pub protocol_version: u32,
    pub min_committee_size: usize,
    pub max_committee_size: usize,
    pub max_transactions_in_block: usize,
    pub system_timestamp_allowed_jitter: Duration,
}

/// Committee selection and block-pair assembly/validation (§4.F), shared by
/// the benchmark and pluggable-BFT algorithm variants.
pub struct ConsensusContextImpl {
    node:             NodeInfo,
    config:           ConsensusContextConfig,
    committee_source: Arc<dyn CommitteeSource>,
    mempool:          Arc<dyn MemPool>,
    storage:          Arc<dyn BlockStorage>,
    vm:               Arc<dyn VirtualMachine>,
}

impl ConsensusContextImpl {
    pub fn new(
        node: NodeInfo,
        config: ConsensusContextConfig,
        committee_source: Arc<dyn CommitteeSource>,
        mempool: Arc<dyn MemPool>,
        storage: Arc<dyn BlockStorage>,
        vm: Arc<dyn VirtualMachine>,
    ) -> Self {
        ConsensusContextImpl { node, config, committee_source, mempool, storage, vm }
    }

    async fn previous_header(&self) -> ProtocolResult<Option<TransactionsBlockHeader>> {
        let top = self.storage.top_height().await?;
        if top == 0 {
            return Ok(None);
        }
        let pair = self
            .storage
            .get_block_by_height(top)
            .await?
            .ok_or(ConsensusError::MissingBlock(top))?;
        Ok(Some(pair.transactions_block.header))
    }

    fn check_jitter(&self, timestamp: TimestampNano, now: TimestampNano) -> Result<(), ConsensusError> {
        let jitter = abs_diff(timestamp, now);
        let allowed = self.config.system_timestamp_allowed_jitter.as_nanos() as u64;
        if jitter > allowed {
            return Err(ConsensusError::TimestampJitterExceeded { jitter_nanos: jitter, allowed_nanos: allowed });
        }
        Ok(())
    }
}

#[async_trait]
impl ConsensusContext for ConsensusContextImpl {
    async fn select_committee(&self, reference_time: TimestampSeconds) -> ProtocolResult<Vec<CommitteeMember>> {
        let members = self.committee_source.members_at(reference_time).await?;
        let order = fisher_yates_order(members.len(), reference_time);
        let ordered = apply_committee_order(&members, &order)?;

        let size = ordered.len().min(self.config.max_committee_size);
        if size < self.config.min_committee_size {
            return Err(
                ConsensusError::CommitteeTooSmall { have: ordered.len(), min: self.config.min_committee_size }.into(),
            );
        }
        let mut ordered = ordered;
        ordered.truncate(size);
        Ok(ordered)
    }

    async fn request_new_transactions_block(&self) -> ProtocolResult<TransactionsBlockContainer> {
        let prev = self.previous_header().await?;
        let (height, prev_hash, prev_timestamp) = match &prev {
            Some(header) => (header.height + 1, header.hash(), header.timestamp),
            None => (1, Hash::ZERO, 0),
        };

        let now = now_nanos();
        let timestamp = next_block_timestamp(prev_timestamp, now);
        self.check_jitter(timestamp, now)?;

        let txs = self
            .mempool
            .get_transactions_for_ordering(self.config.max_transactions_in_block, 0)
            .await?;

        let merkle_root = merkle_root_ordered(&txs.iter().map(|tx| tx.fingerprint()).collect::<Vec<_>>());
        let metadata = Bytes::new();
        let metadata_hash = sha256(&[&metadata]);

        let header = TransactionsBlockHeader {
            protocol_version: self.config.protocol_version,
            height,
            prev_block_hash: prev_hash,
            tx_count: txs.len() as u32,
            metadata_hash,
            merkle_root,
            timestamp,
            reference_time: timestamp / 1_000_000_000,
            proposer: self.node.node_address,
        };

        Ok(TransactionsBlockContainer {
            header,
            metadata,
            signed_transactions: txs,
            block_proof: Default::default(),
        })
    }

    async fn request_new_results_block(
        &self,
        tx_block: &TransactionsBlockContainer,
    ) -> ProtocolResult<ResultsBlockContainer> {
        let reference_time = tx_block.header.reference_time;
        let (receipts, diffs) = self
            .vm
            .process_transaction_set(
                tx_block.header.height,
                tx_block.header.timestamp,
                tx_block.header.proposer,
                reference_time,
                tx_block.signed_transactions.clone(),
            )
            .await?;

        let receipts_merkle_root = merkle_root_ordered(&receipts.iter().map(Receipt::hash).collect::<Vec<_>>());
        let header = ResultsBlockHeader {
            protocol_version: self.config.protocol_version,
            height: tx_block.header.height,
            prev_block_hash: tx_block.header.prev_block_hash,
            tx_block_hash_ptr: tx_block.hash(),
            state_diff_hash: state_diff_hash(&diffs),
            receipts_merkle_root,
        };

        Ok(ResultsBlockContainer { header, receipts, state_diffs: diffs, block_proof: Default::default() })
    }

    async fn validate_transactions_block(&self, block: &TransactionsBlockContainer) -> ProtocolResult<()> {
        let prev = self.previous_header().await?;
        let (expected_height, expected_prev_hash, prev_timestamp) = match &prev {
            Some(header) => (header.height + 1, header.hash(), header.timestamp),
            None => (1, Hash::ZERO, 0),
        };

        if block.header.height != expected_height {
            return Err(
                ConsensusError::UnexpectedHeight { expected: expected_height, actual: block.header.height }.into(),
            );
        }
        if block.header.prev_block_hash != expected_prev_hash {
            return Err(ConsensusError::PrevHashMismatch.into());
        }
        if block.header.tx_count as usize != block.signed_transactions.len() {
            return Err(ConsensusError::TxCountMismatch.into());
        }
        if block.header.merkle_root != block.compute_merkle_root() {
            return Err(ConsensusError::MerkleRootMismatch.into());
        }
        if block.header.timestamp <= prev_timestamp {
            return Err(ConsensusError::TimestampNotMonotonic.into());
        }
        self.check_jitter(block.header.timestamp, now_nanos())?;

        Ok(())
    }

    async fn validate_results_block(
        &self,
        tx_block: &TransactionsBlockContainer,
        results_block: &ResultsBlockContainer,
    ) -> ProtocolResult<()> {
        if results_block.header.height != tx_block.header.height {
            return Err(ConsensusError::ResultsBlockMismatch("height does not match tx block".into()).into());
        }
        if results_block.header.prev_block_hash != tx_block.header.prev_block_hash {
            return Err(ConsensusError::ResultsBlockMismatch("prev-block-hash does not match tx block".into()).into());
        }
        if results_block.header.tx_block_hash_ptr != tx_block.hash() {
            return Err(ConsensusError::ResultsBlockMismatch("tx-block pointer does not match tx block hash".into()).into());
        }
        if results_block.header.state_diff_hash != results_block.compute_state_diff_hash() {
            return Err(ConsensusError::ResultsBlockMismatch("state-diff hash mismatch".into()).into());
        }
        if results_block.header.receipts_merkle_root != results_block.compute_receipts_merkle_root() {
            return Err(ConsensusError::ResultsBlockMismatch("receipts merkle root mismatch".into()).into());
        }

        Ok(())
    }
}

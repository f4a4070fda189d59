use async_trait::async_trait;
use bytes::Bytes;

use crate::types::{
    BlockHeight, ContractStateDiff, NodeAddress, Receipt, SignedTransaction, TimestampNano,
    TimestampSeconds,
};
use crate::ProtocolResult;

/// Outcome of `process_query` (§4.E): the contract's return arguments plus
/// the height that was authoritative for the read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub output_args:         Vec<Bytes>,
    pub reference_height:    BlockHeight,
}

#[async_trait]
pub trait VirtualMachine: Send + Sync {
    /// Runs `_GlobalPreOrder.approve`, then every transaction in order,
    /// merging each successful execution's overlay into the batch overlay.
    /// Returns one receipt per input transaction, in order, plus the
    /// accumulated state diffs of the txs that succeeded.
    async fn process_transaction_set(
        &self,
        height: BlockHeight,
        timestamp: TimestampNano,
        proposer: NodeAddress,
        reference_time: TimestampSeconds,
        txs: Vec<SignedTransaction>,
    ) -> ProtocolResult<(Vec<Receipt>, Vec<ContractStateDiff>)>;

    async fn process_query(
        &self,
        contract_name: String,
        method_name: String,
        input_args: Vec<Bytes>,
    ) -> ProtocolResult<QueryResult>;
}

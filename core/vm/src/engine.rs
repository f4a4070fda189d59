use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use protocol::traits::{BlockStorage, QueryResult, StateStorage, VirtualMachine};
use protocol::types::{
    BlockHeight, ContractStateDiff, ExecutionStatus, NodeAddress, Receipt, SignedTransaction, TimestampNano,
    TimestampSeconds,
};
use protocol::ProtocolResult;

use crate::context::{ExecutionContext, Scope};
use crate::error::VmError;
use crate::registry::ContractRegistry;

/// The reserved system contract consulted once per batch before any
/// transaction runs (§4.E "Global pre-order"). Unregistered means no gate is
/// configured and every batch is implicitly approved.
pub const GLOBAL_PRE_ORDER_CONTRACT: &str = "_GlobalPreOrder";

pub struct Vm {
    storage:  Arc<dyn BlockStorage>,
    state:    Arc<dyn StateStorage>,
    registry: ContractRegistry,
}

impl Vm {
    pub fn new(storage: Arc<dyn BlockStorage>, state: Arc<dyn StateStorage>, registry: ContractRegistry) -> Self {
        Vm { storage, state, registry }
    }

    async fn run_pre_order(&self, height: BlockHeight, timestamp: TimestampNano) -> Result<(), String> {
        let contract = match self.registry.get(GLOBAL_PRE_ORDER_CONTRACT) {
            Some(contract) => contract,
            None => return Ok(()),
        };
        let mut ctx = ExecutionContext::new(
            height,
            timestamp,
            Scope::ReadOnly,
            self.state.as_ref(),
            &[],
            &self.registry,
            GLOBAL_PRE_ORDER_CONTRACT.to_string(),
        );
        contract.call(&mut ctx, "approve", &[]).await.map(|_| ())
    }
}

#[async_trait]
impl VirtualMachine for Vm {
    async fn process_transaction_set(
        &self,
        height: BlockHeight,
        timestamp: TimestampNano,
        _proposer: NodeAddress,
        _reference_time: TimestampSeconds,
        txs: Vec<SignedTransaction>,
    ) -> ProtocolResult<(Vec<Receipt>, Vec<ContractStateDiff>)> {
        if let Err(reason) = self.run_pre_order(height, timestamp).await {
            let receipts = txs
                .iter()
                .map(|tx| Receipt {
                    tx_hash:     tx.fingerprint(),
                    status:      ExecutionStatus::PreOrderRejected(reason.clone()),
                    output_args: vec![],
                })
                .collect();
            return Ok((receipts, vec![]));
        }

        let mut batch_overlay: Vec<ContractStateDiff> = Vec::new();
        let mut receipts = Vec::with_capacity(txs.len());

        for tx in &txs {
            let contract_name = tx.payload.contract_name.clone();
            let tx_hash = tx.fingerprint();

            let contract = match self.registry.get(&contract_name) {
                Some(contract) => contract,
                None => {
                    receipts.push(Receipt {
                        tx_hash,
                        status: ExecutionStatus::DeploymentNotFound(contract_name),
                        output_args: vec![],
                    });
                    continue;
                }
            };

            let mut ctx = ExecutionContext::new(
                height,
                timestamp,
                Scope::ReadWrite,
                self.state.as_ref(),
                &batch_overlay,
                &self.registry,
                contract_name.clone(),
            );

            match contract.call(&mut ctx, &tx.payload.method_name, &tx.payload.input_args).await {
                Ok(output_args) => {
                    batch_overlay.extend(ctx.into_overlay());
                    receipts.push(Receipt { tx_hash, status: ExecutionStatus::Committed, output_args });
                }
                Err(reason) => {
                    receipts.push(Receipt { tx_hash, status: ExecutionStatus::ContractError(reason), output_args: vec![] });
                }
            }
        }

        Ok((receipts, batch_overlay))
    }

    async fn process_query(
        &self,
        contract_name: String,
        method_name: String,
        input_args: Vec<Bytes>,
    ) -> ProtocolResult<QueryResult> {
        let reference_height = self.storage.top_height().await?;
        let contract = self
            .registry
            .get(&contract_name)
            .ok_or_else(|| VmError::DeploymentNotFound(contract_name.clone()))?;

        let mut ctx = ExecutionContext::new(
            reference_height,
            0,
            Scope::ReadOnly,
            self.state.as_ref(),
            &[],
            &self.registry,
            contract_name,
        );

        let output_args = contract
            .call(&mut ctx, &method_name, &input_args)
            .await
            .map_err(VmError::ContractError)?;

        Ok(QueryResult { output_args, reference_height })
    }
}

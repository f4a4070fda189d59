use bytes::Bytes;
use protocol::traits::StateStorage;
use protocol::types::{BlockHeight, ContractStateDiff, TimestampNano};
use protocol::ProtocolResult;

use crate::registry::ContractRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    ReadOnly,
    ReadWrite,
}

/// A per-call execution record (§3 "Execution context"): the contract-call
/// stack for re-entry detection, a write overlay captured in call order, and
/// read access to the batch overlay and to committed state at `height - 1`.
pub struct ExecutionContext<'a> {
    height:        BlockHeight,
    timestamp:     TimestampNano,
    scope:         Scope,
    state:         &'a dyn StateStorage,
    batch_overlay: &'a [ContractStateDiff],
    overlay:       Vec<ContractStateDiff>,
    stack:         Vec<String>,
    registry:      &'a ContractRegistry,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        height: BlockHeight,
        timestamp: TimestampNano,
        scope: Scope,
        state: &'a dyn StateStorage,
        batch_overlay: &'a [ContractStateDiff],
        registry: &'a ContractRegistry,
        entry_contract: String,
    ) -> Self {
        ExecutionContext {
            height,
            timestamp,
            scope,
            state,
            batch_overlay,
            overlay: Vec::new(),
            stack: vec![entry_contract],
            registry,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn timestamp(&self) -> TimestampNano {
        self.timestamp
    }

    pub fn current_contract(&self) -> &str {
        self.stack.last().expect("execution context always has an entry contract")
    }

    /// Consults, in order: this call's own overlay, the batch overlay
    /// accumulated by earlier transactions in the set, then committed state
    /// at `height - 1`.
    pub async fn read(&self, contract: &str, key: &Bytes) -> ProtocolResult<Option<Bytes>> {
        if let Some(diff) = self.overlay.iter().rev().find(|d| d.contract == contract && &d.key == key) {
            return Ok(Some(diff.value.clone()));
        }
        if let Some(diff) = self.batch_overlay.iter().rev().find(|d| d.contract == contract && &d.key == key) {
            return Ok(Some(diff.value.clone()));
        }
        let read_height = self.height.saturating_sub(1);
        self.state.read_at(read_height, contract, key).await
    }

    /// Writes to the currently executing contract's address space. Rejected
    /// outside `ReadWrite` scope.
    pub fn write(&mut self, key: Bytes, value: Bytes) -> Result<(), &'static str> {
        if self.scope != Scope::ReadWrite {
            return Err("write attempted in read-only scope");
        }
        let contract = self.current_contract().to_string();
        self.overlay.push(ContractStateDiff { contract, key, value });
        Ok(())
    }

    /// Cross-contract call. Re-entry into a contract already on the stack is
    /// rejected rather than allowed to recurse.
    pub async fn call(&mut self, contract_name: &str, method: &str, args: &[Bytes]) -> Result<Vec<Bytes>, String> {
        if self.stack.iter().any(|c| c == contract_name) {
            return Err(format!("re-entry into {} blocked", contract_name));
        }
        let contract = self
            .registry
            .get(contract_name)
            .ok_or_else(|| format!("no deployment registered for contract {}", contract_name))?;
        self.stack.push(contract_name.to_string());
        let outcome = contract.call(self, method, args).await;
        self.stack.pop();
        outcome
    }

    pub(crate) fn into_overlay(self) -> Vec<ContractStateDiff> {
        self.overlay
    }
}

mod context;
mod engine;
mod error;
mod registry;

pub use context::{ExecutionContext, Scope};
pub use engine::{Vm, GLOBAL_PRE_ORDER_CONTRACT};
pub use error::VmError;
pub use registry::{Contract, ContractRegistry};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::convert::TryInto;
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use protocol::traits::{BlockStorage, StateStorage, VirtualMachine};
    use protocol::types::{BlockHeight, BlockPair, ContractStateDiff, NodeAddress, SignedTransaction, TransactionPayload};
    use protocol::ProtocolResult;

    use super::*;

    #[derive(Default)]
    struct FakeState {
        values: Mutex<HashMap<(String, Bytes), Vec<(BlockHeight, Bytes)>>>,
    }

    impl FakeState {
        fn seed(&self, contract: &str, key: &[u8], height: BlockHeight, value: &[u8]) {
            self.values
                .lock()
                .entry((contract.to_string(), Bytes::copy_from_slice(key)))
                .or_default()
                .push((height, Bytes::copy_from_slice(value)));
        }
    }

    #[async_trait]
    impl StateStorage for FakeState {
        async fn commit_height(&self, _height: BlockHeight, _diffs: Vec<ContractStateDiff>) -> ProtocolResult<()> {
            Ok(())
        }

        async fn read_at(&self, height: BlockHeight, contract: &str, key: &Bytes) -> ProtocolResult<Option<Bytes>> {
            let values = self.values.lock();
            Ok(values
                .get(&(contract.to_string(), key.clone()))
                .and_then(|writes| writes.iter().rev().find(|(h, _)| *h <= height).map(|(_, v)| v.clone())))
        }
    }

    struct FakeStorage {
        top: BlockHeight,
    }

    #[async_trait]
    impl BlockStorage for FakeStorage {
        async fn commit_block(&self, _pair: BlockPair) -> ProtocolResult<()> {
            Ok(())
        }

        async fn get_block_by_height(&self, _height: BlockHeight) -> ProtocolResult<Option<BlockPair>> {
            Ok(None)
        }

        async fn top_height(&self) -> ProtocolResult<BlockHeight> {
            Ok(self.top)
        }
    }

    /// A minimal ledger contract: `credit(key, amount)` adds to a balance,
    /// `balance(key)` reads it back. Used to exercise overlay merging.
    struct Ledger;

    #[async_trait]
    impl Contract for Ledger {
        async fn call(&self, ctx: &mut ExecutionContext<'_>, method: &str, args: &[Bytes]) -> Result<Vec<Bytes>, String> {
            match method {
                "credit" => {
                    let key = args.get(0).ok_or("missing key")?.clone();
                    let delta: u64 = args
                        .get(1)
                        .ok_or("missing amount")?
                        .as_ref()
                        .try_into()
                        .map(u64::from_le_bytes)
                        .map_err(|_| "bad amount".to_string())?;
                    let current = ctx
                        .read("ledger", &key)
                        .await
                        .map_err(|e| e.to_string())?
                        .map(|v| u64::from_le_bytes(v.as_ref().try_into().unwrap()))
                        .unwrap_or(0);
                    let next = current + delta;
                    ctx.write(key, Bytes::copy_from_slice(&next.to_le_bytes())).map_err(str::to_string)?;
                    Ok(vec![Bytes::copy_from_slice(&next.to_le_bytes())])
                }
                "balance" => {
                    let key = args.get(0).ok_or("missing key")?.clone();
                    let balance = ctx.read("ledger", &key).await.map_err(|e| e.to_string())?.unwrap_or_else(|| Bytes::from_static(&[0u8; 8]));
                    Ok(vec![balance])
                }
                "fail_always" => Err("intentional failure".to_string()),
                _ => Err(format!("unknown method {}", method)),
            }
        }
    }

    struct RejectingPreOrder;

    #[async_trait]
    impl Contract for RejectingPreOrder {
        async fn call(&self, _ctx: &mut ExecutionContext<'_>, _method: &str, _args: &[Bytes]) -> Result<Vec<Bytes>, String> {
            Err("not approved".to_string())
        }
    }

    /// Forwards every call into `ledger`, exercising cross-contract dispatch.
    struct Proxy;

    #[async_trait]
    impl Contract for Proxy {
        async fn call(&self, ctx: &mut ExecutionContext<'_>, _method: &str, args: &[Bytes]) -> Result<Vec<Bytes>, String> {
            ctx.call("ledger", "credit", args).await
        }
    }

    /// Calls itself by a different registered name, exercising re-entry detection.
    struct SelfCaller;

    #[async_trait]
    impl Contract for SelfCaller {
        async fn call(&self, ctx: &mut ExecutionContext<'_>, method: &str, args: &[Bytes]) -> Result<Vec<Bytes>, String> {
            ctx.call("loopy", method, args).await
        }
    }

    fn tx(contract: &str, method: &str, args: Vec<Bytes>) -> SignedTransaction {
        SignedTransaction {
            payload: TransactionPayload {
                protocol_version: 1,
                chain_id: 1,
                timestamp: 0,
                expiry: 0,
                signer_pubkey: Bytes::new(),
                contract_name: contract.to_string(),
                method_name: method.to_string(),
                input_args: args,
            },
            signature: Bytes::new(),
        }
    }

    fn vm_with(registry: ContractRegistry, state: Arc<dyn StateStorage>) -> Vm {
        Vm::new(Arc::new(FakeStorage { top: 5 }), state, registry)
    }

    #[tokio::test]
    async fn successful_batch_merges_overlay_in_order() {
        let mut registry = ContractRegistry::new();
        registry.register("ledger", Arc::new(Ledger));
        let state = Arc::new(FakeState::default());
        let vm = vm_with(registry, Arc::clone(&state) as Arc<dyn StateStorage>);

        let txs = vec![
            tx("ledger", "credit", vec![Bytes::from_static(b"alice"), Bytes::copy_from_slice(&10u64.to_le_bytes())]),
            tx("ledger", "credit", vec![Bytes::from_static(b"alice"), Bytes::copy_from_slice(&5u64.to_le_bytes())]),
        ];
        let (receipts, diffs) = vm.process_transaction_set(1, 0, NodeAddress([0u8; 20]), 0, txs).await.unwrap();

        assert_eq!(receipts.len(), 2);
        assert!(receipts.iter().all(|r| r.status.is_committed()));
        assert_eq!(diffs.len(), 2);
        // second credit must have observed the first one's overlay write
        assert_eq!(diffs[1].value.as_ref(), &15u64.to_le_bytes());
    }

    #[tokio::test]
    async fn failed_transaction_does_not_leak_its_overlay_but_keeps_earlier_writes() {
        let mut registry = ContractRegistry::new();
        registry.register("ledger", Arc::new(Ledger));
        let state = Arc::new(FakeState::default());
        let vm = vm_with(registry, Arc::clone(&state) as Arc<dyn StateStorage>);

        let txs = vec![
            tx("ledger", "credit", vec![Bytes::from_static(b"alice"), Bytes::copy_from_slice(&10u64.to_le_bytes())]),
            tx("ledger", "fail_always", vec![]),
        ];
        let (receipts, diffs) = vm.process_transaction_set(1, 0, NodeAddress([0u8; 20]), 0, txs).await.unwrap();

        assert!(receipts[0].status.is_committed());
        assert!(!receipts[1].status.is_committed());
        assert_eq!(diffs.len(), 1);
    }

    #[tokio::test]
    async fn unknown_contract_yields_deployment_not_found_receipt() {
        let vm = vm_with(ContractRegistry::new(), Arc::new(FakeState::default()));
        let txs = vec![tx("missing", "whatever", vec![])];
        let (receipts, diffs) = vm.process_transaction_set(1, 0, NodeAddress([0u8; 20]), 0, txs).await.unwrap();

        assert!(diffs.is_empty());
        assert!(matches!(receipts[0].status, protocol::types::ExecutionStatus::DeploymentNotFound(_)));
    }

    #[tokio::test]
    async fn rejecting_pre_order_aborts_the_whole_batch() {
        let mut registry = ContractRegistry::new();
        registry.register("ledger", Arc::new(Ledger));
        registry.register(GLOBAL_PRE_ORDER_CONTRACT, Arc::new(RejectingPreOrder));
        let vm = vm_with(registry, Arc::new(FakeState::default()));

        let txs = vec![tx("ledger", "credit", vec![Bytes::from_static(b"alice"), Bytes::copy_from_slice(&10u64.to_le_bytes())])];
        let (receipts, diffs) = vm.process_transaction_set(1, 0, NodeAddress([0u8; 20]), 0, txs).await.unwrap();

        assert!(diffs.is_empty());
        assert!(matches!(receipts[0].status, protocol::types::ExecutionStatus::PreOrderRejected(_)));
    }

    #[tokio::test]
    async fn process_query_is_read_only_and_reports_reference_height() {
        let mut registry = ContractRegistry::new();
        registry.register("ledger", Arc::new(Ledger));
        let state = Arc::new(FakeState::default());
        state.seed("ledger", b"alice", 1, &40u64.to_le_bytes());
        let vm = vm_with(registry, state);

        let result = vm
            .process_query("ledger".to_string(), "balance".to_string(), vec![Bytes::from_static(b"alice")])
            .await
            .unwrap();

        assert_eq!(result.reference_height, 5);
        assert_eq!(result.output_args[0].as_ref(), &40u64.to_le_bytes());
    }

    #[tokio::test]
    async fn write_attempt_during_query_is_rejected() {
        struct Writer;
        #[async_trait]
        impl Contract for Writer {
            async fn call(&self, ctx: &mut ExecutionContext<'_>, _m: &str, _a: &[Bytes]) -> Result<Vec<Bytes>, String> {
                ctx.write(Bytes::from_static(b"k"), Bytes::from_static(b"v")).map_err(str::to_string)?;
                Ok(vec![])
            }
        }
        let mut registry = ContractRegistry::new();
        registry.register("writer", Arc::new(Writer));
        let vm = vm_with(registry, Arc::new(FakeState::default()));

        let err = vm.process_query("writer".to_string(), "anything".to_string(), vec![]).await.unwrap_err();
        assert!(format!("{}", err).contains("write attempted in read-only scope"));
    }

    #[tokio::test]
    async fn cross_contract_call_attributes_writes_to_the_callee() {
        let mut registry = ContractRegistry::new();
        registry.register("ledger", Arc::new(Ledger));
        registry.register("proxy", Arc::new(Proxy));
        let vm = vm_with(registry, Arc::new(FakeState::default()));

        let txs = vec![tx("proxy", "forward", vec![Bytes::from_static(b"alice"), Bytes::copy_from_slice(&7u64.to_le_bytes())])];
        let (receipts, diffs) = vm.process_transaction_set(1, 0, NodeAddress([0u8; 20]), 0, txs).await.unwrap();

        assert!(receipts[0].status.is_committed());
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].contract, "ledger");
    }

    #[tokio::test]
    async fn self_re_entry_through_a_different_registered_name_is_rejected() {
        let mut registry = ContractRegistry::new();
        registry.register("loopy", Arc::new(SelfCaller));
        let vm = vm_with(registry, Arc::new(FakeState::default()));

        let txs = vec![tx("loopy", "anything", vec![])];
        let (receipts, diffs) = vm.process_transaction_set(1, 0, NodeAddress([0u8; 20]), 0, txs).await.unwrap();

        assert!(diffs.is_empty());
        match &receipts[0].status {
            protocol::types::ExecutionStatus::ContractError(msg) => assert!(msg.contains("re-entry")),
            other => panic!("expected ContractError, got {:?}", other),
        }
    }
}

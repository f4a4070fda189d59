use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::context::ExecutionContext;

/// A deployed contract. Business-logic contracts themselves are an external
/// collaborator; this trait is the seam the VM dispatches through.
#[async_trait]
pub trait Contract: Send + Sync {
    async fn call(&self, ctx: &mut ExecutionContext<'_>, method: &str, args: &[Bytes]) -> Result<Vec<Bytes>, String>;
}

/// The `_Deployments` lookup: contract name to implementation.
#[derive(Default)]
pub struct ContractRegistry {
    contracts: HashMap<String, Arc<dyn Contract>>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        ContractRegistry::default()
    }

    pub fn register(&mut self, name: impl Into<String>, contract: Arc<dyn Contract>) {
        self.contracts.insert(name.into(), contract);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Contract>> {
        self.contracts.get(name).cloned()
    }
}

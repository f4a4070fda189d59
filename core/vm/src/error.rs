use std::error::Error;

use derive_more::{Display, From};
use protocol::{ProtocolError, ProtocolErrorKind};

/// Failures `process_query` can surface directly (§4.E). `process_transaction_set`
/// never returns these for a single transaction's failure - those become a
/// receipt with a non-`Committed` status instead.
#[derive(Debug, Display, From)]
pub enum VmError {
    #[display(fmt = "no deployment registered for contract {}", _0)]
    #[from(ignore)]
    DeploymentNotFound(String),

    #[display(fmt = "contract call failed: {}", _0)]
    #[from(ignore)]
    ContractError(String),
}

impl Error for VmError {}

impl From<VmError> for ProtocolError {
    fn from(error: VmError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Vm, Box::new(error))
    }
}

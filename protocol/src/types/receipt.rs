use bytes::Bytes;
use common_crypto::{sha256, Hash};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Committed,
    ContractError(String),
    PreOrderRejected(String),
    DeploymentNotFound(String),
}

impl ExecutionStatus {
    pub fn is_committed(&self) -> bool {
        matches!(self, ExecutionStatus::Committed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash:     Hash,
    pub status:      ExecutionStatus,
    pub output_args: Vec<Bytes>,
}

impl Receipt {
    pub fn hash(&self) -> Hash {
        let mut parts: Vec<&[u8]> = vec![self.tx_hash.as_ref()];
        let status_tag = match &self.status {
            ExecutionStatus::Committed => b"committed".to_vec(),
            ExecutionStatus::ContractError(s) => format!("contract-error:{}", s).into_bytes(),
            ExecutionStatus::PreOrderRejected(s) => format!("pre-order-rejected:{}", s).into_bytes(),
            ExecutionStatus::DeploymentNotFound(s) => format!("deployment-not-found:{}", s).into_bytes(),
        };
        parts.push(&status_tag);
        for arg in &self.output_args {
            parts.push(arg);
        }
        sha256(&parts)
    }
}

/// A single transient-state write, materialised from the execution overlay
/// only once the enclosing transaction commits successfully.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractStateDiff {
    pub contract: String,
    pub key:      Bytes,
    pub value:    Bytes,
}

impl ContractStateDiff {
    pub fn hash(&self) -> Hash {
        sha256(&[self.contract.as_bytes(), &self.key, &self.value])
    }
}

/// `state_diff_hash(diffs) = sha256(concat(contract_state_diff_hash(d) for d in diffs))`.
///
/// Taken verbatim as authoritative: the original marks this a placeholder
/// ("rewrite without Merkle tree"), so a plain concatenated digest - not a
/// Merkle root - is correct here, unlike `merkle_root_ordered` elsewhere.
pub fn state_diff_hash(diffs: &[ContractStateDiff]) -> Hash {
    let hashes: Vec<Hash> = diffs.iter().map(ContractStateDiff::hash).collect();
    let refs: Vec<&[u8]> = hashes.iter().map(|h| h.as_ref()).collect();
    sha256(&refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_diff_hash_is_deterministic() {
        let diffs = vec![
            ContractStateDiff {
                contract: "token".into(),
                key:      Bytes::from_static(b"balance:alice"),
                value:    Bytes::from_static(b"100"),
            },
            ContractStateDiff {
                contract: "token".into(),
                key:      Bytes::from_static(b"balance:bob"),
                value:    Bytes::from_static(b"0"),
            },
        ];

        assert_eq!(state_diff_hash(&diffs), state_diff_hash(&diffs));
    }

    #[test]
    fn state_diff_hash_of_empty_is_stable() {
        assert_eq!(state_diff_hash(&[]), state_diff_hash(&[]));
    }
}

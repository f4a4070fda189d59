use bytes::Bytes;
use common_crypto::{merkle_root_ordered, sha256, Hash, NodeAddress};
use serde::{Deserialize, Serialize};

use crate::types::primitive::{BlockHeight, TimestampNano, TimestampSeconds};
use crate::types::receipt::{state_diff_hash, ContractStateDiff, Receipt};
use crate::types::transaction::SignedTransaction;

/// Opaque proof of commitment. The benchmark algorithm fills in a flat list
/// of follower signatures; the pluggable BFT engine hands back its own
/// serialized quorum certificate and the core never looks inside it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockProof {
    Benchmark { signatures: Vec<(NodeAddress, Bytes)> },
    Bft { opaque: Bytes },
}

impl Default for BlockProof {
    fn default() -> Self {
        BlockProof::Benchmark { signatures: Vec::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionsBlockHeader {
    pub protocol_version: u32,
    pub height:           BlockHeight,
    pub prev_block_hash:  Hash,
    pub tx_count:         u32,
    pub metadata_hash:    Hash,
    pub merkle_root:      Hash,
    pub timestamp:        TimestampNano,
    pub reference_time:   TimestampSeconds,
    pub proposer:         NodeAddress,
}

impl TransactionsBlockHeader {
    pub fn hash(&self) -> Hash {
        sha256(&[
            &self.protocol_version.to_le_bytes(),
            &self.height.to_le_bytes(),
            self.prev_block_hash.as_ref(),
            &self.tx_count.to_le_bytes(),
            self.metadata_hash.as_ref(),
            self.merkle_root.as_ref(),
            &self.timestamp.to_le_bytes(),
            &self.reference_time.to_le_bytes(),
            self.proposer.0.as_ref(),
        ])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionsBlockContainer {
    pub header:              TransactionsBlockHeader,
    pub metadata:            Bytes,
    pub signed_transactions: Vec<SignedTransaction>,
    pub block_proof:         BlockProof,
}

impl TransactionsBlockContainer {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn compute_merkle_root(&self) -> Hash {
        let hashes: Vec<Hash> = self
            .signed_transactions
            .iter()
            .map(SignedTransaction::fingerprint)
            .collect();
        merkle_root_ordered(&hashes)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsBlockHeader {
    pub protocol_version:     u32,
    pub height:               BlockHeight,
    pub prev_block_hash:      Hash,
    pub tx_block_hash_ptr:    Hash,
    pub state_diff_hash:      Hash,
    pub receipts_merkle_root: Hash,
}

impl ResultsBlockHeader {
    pub fn hash(&self) -> Hash {
        sha256(&[
            &self.protocol_version.to_le_bytes(),
            &self.height.to_le_bytes(),
            self.prev_block_hash.as_ref(),
            self.tx_block_hash_ptr.as_ref(),
            self.state_diff_hash.as_ref(),
            self.receipts_merkle_root.as_ref(),
        ])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsBlockContainer {
    pub header:      ResultsBlockHeader,
    pub receipts:    Vec<Receipt>,
    pub state_diffs: Vec<ContractStateDiff>,
    pub block_proof: BlockProof,
}

impl ResultsBlockContainer {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn compute_receipts_merkle_root(&self) -> Hash {
        let hashes: Vec<Hash> = self.receipts.iter().map(Receipt::hash).collect();
        merkle_root_ordered(&hashes)
    }

    pub fn compute_state_diff_hash(&self) -> Hash {
        state_diff_hash(&self.state_diffs)
    }
}

/// The atomic unit of commitment: a transactions half and a results half
/// sharing height, prev-hash pointer and reference time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPair {
    pub transactions_block: TransactionsBlockContainer,
    pub results_block:      ResultsBlockContainer,
}

impl BlockPair {
    pub fn height(&self) -> BlockHeight {
        self.transactions_block.header.height
    }

    /// `block_hash(pair) = sha256(tx_block_hash || results_block_hash)`.
    pub fn hash(&self) -> Hash {
        sha256(&[
            self.transactions_block.hash().as_ref(),
            self.results_block.hash().as_ref(),
        ])
    }

    pub fn timestamp(&self) -> TimestampNano {
        self.transactions_block.header.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(height: u64, prev: Hash, timestamp: u64) -> TransactionsBlockHeader {
        TransactionsBlockHeader {
            protocol_version: 1,
            height,
            prev_block_hash: prev,
            tx_count: 0,
            metadata_hash: Hash::ZERO,
            merkle_root: Hash::ZERO,
            timestamp,
            reference_time: timestamp / 1_000_000_000,
            proposer: NodeAddress([0u8; 20]),
        }
    }

    #[test]
    fn genesis_has_zero_prev_hash() {
        let h = header(1, Hash::ZERO, 1);
        assert!(h.prev_block_hash.is_zero());
    }

    #[test]
    fn prev_hash_chains_to_previous_header_hash() {
        let h1 = header(1, Hash::ZERO, 1);
        let h2 = header(2, h1.hash(), 2);
        assert_eq!(h2.prev_block_hash, h1.hash());
    }
}

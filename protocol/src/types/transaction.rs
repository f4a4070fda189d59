use bytes::Bytes;
use common_crypto::{node_address_from_public_key_bytes, sha256, verify, CryptoError, Hash, NodeAddress};
use serde::{Deserialize, Serialize};

use crate::types::primitive::{BlockHeight, TimestampNano, VirtualChainId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub protocol_version: u32,
    pub chain_id:         VirtualChainId,
    pub timestamp:        TimestampNano,
    pub expiry:           TimestampNano,
    pub signer_pubkey:    Bytes,
    pub contract_name:    String,
    pub method_name:      String,
    pub input_args:       Vec<Bytes>,
}

impl TransactionPayload {
    pub fn signer(&self) -> Result<NodeAddress, CryptoError> {
        node_address_from_public_key_bytes(&self.signer_pubkey)
    }

    /// Canonical bytes the signature is computed over - every field in a
    /// fixed order so two payloads that differ in any field hash and sign
    /// differently.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.protocol_version.to_le_bytes());
        buf.extend_from_slice(&self.chain_id.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.expiry.to_le_bytes());
        buf.extend_from_slice(&self.signer_pubkey);
        buf.extend_from_slice(self.contract_name.as_bytes());
        buf.extend_from_slice(self.method_name.as_bytes());
        for arg in &self.input_args {
            buf.extend_from_slice(arg);
        }
        buf
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub payload:   TransactionPayload,
    pub signature: Bytes,
}

impl SignedTransaction {
    /// The fingerprint used as the pending/committed pool key: the hash of
    /// the signed payload, including the signature, so two signatures over
    /// the same payload never collide in the pool.
    pub fn fingerprint(&self) -> Hash {
        sha256(&[&self.payload.canonical_bytes(), &self.signature])
    }

    pub fn verify_signature(&self) -> Result<(), CryptoError> {
        verify(
            &self.payload.signer_pubkey,
            &self.payload.canonical_bytes(),
            &self.signature,
        )
    }
}

/// The inclusive sync range a peer will serve, advertised in response to a
/// `BlockAvailabilityRequest`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAvailability {
    pub sender:      NodeAddress,
    pub first_height: BlockHeight,
    pub last_height:  BlockHeight,
    pub last_hash:    Hash,
}

use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer, Verifier};
use rand::rngs::OsRng;

use crate::error::CryptoError;

/// 20-byte node identifier derived from the low 20 bytes of
/// `sha256(public_key)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeAddress(pub [u8; 20]);

impl NodeAddress {
    pub fn from_public_key(pubkey: &PublicKey) -> Self {
        let digest = crate::digest::sha256(&[pubkey.as_bytes()]);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest.as_bytes()[12..]);
        NodeAddress(out)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|_| CryptoError::InvalidPublicKey)?;
        if bytes.len() != 20 {
            return Err(CryptoError::InvalidPublicKey);
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(NodeAddress(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl std::fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

pub struct PrivateKey(Keypair);

impl PrivateKey {
    pub fn generate() -> Self {
        let mut csprng = OsRng {};
        PrivateKey(Keypair::generate(&mut csprng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let public = PublicKey::from(&secret);
        Ok(PrivateKey(Keypair { secret, public }))
    }

    pub fn public_key(&self) -> PublicKey {
        self.0.public
    }

    pub fn node_address(&self) -> NodeAddress {
        NodeAddress::from_public_key(&self.0.public)
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.0.sign(message).to_bytes().to_vec()
    }
}

pub fn node_address_from_public_key_bytes(pubkey_bytes: &[u8]) -> Result<NodeAddress, CryptoError> {
    let pubkey = PublicKey::from_bytes(pubkey_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
    Ok(NodeAddress::from_public_key(&pubkey))
}

pub fn verify(pubkey_bytes: &[u8], message: &[u8], signature_bytes: &[u8]) -> Result<(), CryptoError> {
    let pubkey = PublicKey::from_bytes(pubkey_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
    let signature = Signature::from_bytes(signature_bytes).map_err(|_| CryptoError::InvalidSignature)?;
    pubkey
        .verify(message, &signature)
        .map_err(|_| CryptoError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trips() {
        let key = PrivateKey::generate();
        let msg = b"hello ledger";
        let sig = key.sign(msg);

        verify(key.public_key().as_bytes(), msg, &sig).unwrap();
    }

    #[test]
    fn tampered_message_fails_verification() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"hello ledger");

        assert!(verify(key.public_key().as_bytes(), b"goodbye ledger", &sig).is_err());
    }

    #[test]
    fn node_address_is_20_bytes_of_pubkey_hash() {
        let key = PrivateKey::generate();
        let addr = key.node_address();
        assert_eq!(addr.0.len(), 20);
    }
}

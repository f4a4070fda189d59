use std::error::Error;

use derive_more::{Display, From};

#[derive(Debug, Display, From)]
pub enum CryptoError {
    #[display(fmt = "invalid private key bytes")]
    InvalidPrivateKey,
    #[display(fmt = "invalid public key bytes")]
    InvalidPublicKey,
    #[display(fmt = "invalid signature bytes")]
    InvalidSignature,
    #[display(fmt = "signature verification failed")]
    VerificationFailed,
}

impl Error for CryptoError {}

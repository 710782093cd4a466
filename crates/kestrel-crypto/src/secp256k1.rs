use crate::error::CryptoError;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

/// secp256k1 ECDSA verification capability.
pub trait Secp256k1Verifier {
    /// Verify `signature` (64-byte compact or DER) over `message` hashed with SHA-256.
    fn verify_secp256k1(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError>;
}

/// Verifier backed by `k256`.
#[derive(Debug, Default, Clone, Copy)]
pub struct K256Secp256k1;

impl Secp256k1Verifier for K256Secp256k1 {
    fn verify_secp256k1(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let key = VerifyingKey::from_sec1_bytes(public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = if signature.len() == 64 {
            Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?
        } else {
            Signature::from_der(signature).map_err(|_| CryptoError::InvalidSignature)?
        };
        key.verify(message, &sig).map_err(|_| CryptoError::VerificationFailed)
    }
}

/// Length of a DER signature starting at `prefix`, or of a compact one when the
/// prefix is not a DER sequence header.
pub fn signature_length(prefix: &[u8]) -> usize {
    match prefix {
        [0x30, len, ..] => *len as usize + 2,
        _ => 64,
    }
}

/// secp256k1 keypair for producing test signatures.
pub struct Secp256k1Keypair {
    key: SigningKey,
}

impl Secp256k1Keypair {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        SigningKey::from_slice(bytes)
            .map(|key| Self { key })
            .map_err(|_| CryptoError::InvalidPrivateKey)
    }

    /// Compressed SEC1 public key (33 bytes).
    pub fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_encoded_point(true).as_bytes().to_vec()
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.key.sign(message);
        signature.to_bytes().to_vec()
    }

    pub fn sign_der(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.key.sign(message);
        signature.to_der().as_bytes().to_vec()
    }
}

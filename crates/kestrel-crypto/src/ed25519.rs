use crate::error::CryptoError;
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroize;

/// Ed25519 signature verification capability.
pub trait Ed25519Verifier {
    fn verify_ed25519(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError>;
}

/// Verifier backed by `ed25519-dalek`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DalekEd25519;

impl Ed25519Verifier for DalekEd25519 {
    fn verify_ed25519(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        verify(public_key, message, signature)
    }
}

/// Ed25519 keypair, used by tests and tooling to produce signatures contracts can check.
pub struct Keypair {
    signing_key: ed25519_dalek::SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair(0x{})", hex::encode(self.public_key()))
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

/// Verify an ed25519 signature given as raw bytes (32-byte key, 64-byte signature).
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key: &[u8; 32] = public_key.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = ed25519_dalek::Signature::from_slice(signature)?;
    let pk = ed25519_dalek::VerifyingKey::from_bytes(key).map_err(|_| CryptoError::InvalidPublicKey)?;
    pk.verify(message, &sig).map_err(|_| CryptoError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::from_seed(&[42u8; 32]);
        let message = b"transfer 10 to kes1...";
        let signature = keypair.sign(message);

        assert!(DalekEd25519
            .verify_ed25519(&keypair.public_key(), message, &signature)
            .is_ok());
        assert_eq!(
            DalekEd25519.verify_ed25519(&keypair.public_key(), b"other", &signature),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn test_malformed_inputs() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"m");

        assert_eq!(
            verify(&keypair.public_key()[..31], b"m", &signature),
            Err(CryptoError::InvalidPublicKey)
        );
        assert_eq!(
            verify(&keypair.public_key(), b"m", &signature[..63]),
            Err(CryptoError::InvalidSignature)
        );
    }
}

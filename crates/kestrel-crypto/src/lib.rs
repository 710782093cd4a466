//! Kestrel Crypto - cryptographic capabilities made available to contracts.
//!
//! This crate provides:
//! - SHA-256 and blake3 hashing
//! - Ed25519 signature verification
//! - BLS12-381 signature verification
//! - secp256k1 ECDSA signature verification
//! - `VmCrypto`, the combined capability the contract host consumes

pub mod ed25519;
pub mod bls;
pub mod hash;
pub mod secp256k1;
pub mod error;

pub use bls::{bls_verify, BlsKeypair, BlsVerifier, BlstBls};
pub use ed25519::{verify as ed25519_verify, DalekEd25519, Ed25519Verifier, Keypair};
pub use error::CryptoError;
pub use hash::{DefaultHasher, Hasher};
pub use secp256k1::{K256Secp256k1, Secp256k1Keypair, Secp256k1Verifier};

use kestrel_types::Hash;

/// Every cryptographic capability the host hands to contracts.
pub trait VmCrypto: Hasher + Ed25519Verifier + BlsVerifier + Secp256k1Verifier {}

impl<T> VmCrypto for T where T: Hasher + Ed25519Verifier + BlsVerifier + Secp256k1Verifier {}

/// Holds one implementation of each capability and forwards to it.
pub struct CryptoSuite {
    hasher: Box<dyn Hasher>,
    ed25519: Box<dyn Ed25519Verifier>,
    bls: Box<dyn BlsVerifier>,
    secp256k1: Box<dyn Secp256k1Verifier>,
}

impl CryptoSuite {
    pub fn new(
        hasher: Box<dyn Hasher>,
        ed25519: Box<dyn Ed25519Verifier>,
        bls: Box<dyn BlsVerifier>,
        secp256k1: Box<dyn Secp256k1Verifier>,
    ) -> Self {
        Self { hasher, ed25519, bls, secp256k1 }
    }
}

impl Default for CryptoSuite {
    fn default() -> Self {
        Self::new(
            Box::new(DefaultHasher),
            Box::new(DalekEd25519),
            Box::new(BlstBls),
            Box::new(K256Secp256k1),
        )
    }
}

impl Hasher for CryptoSuite {
    fn sha256(&self, data: &[u8]) -> Hash {
        self.hasher.sha256(data)
    }

    fn blake3(&self, data: &[u8]) -> Hash {
        self.hasher.blake3(data)
    }
}

impl Ed25519Verifier for CryptoSuite {
    fn verify_ed25519(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        self.ed25519.verify_ed25519(public_key, message, signature)
    }
}

impl BlsVerifier for CryptoSuite {
    fn verify_bls(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        self.bls.verify_bls(public_key, message, signature)
    }
}

impl Secp256k1Verifier for CryptoSuite {
    fn verify_secp256k1(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        self.secp256k1.verify_secp256k1(public_key, message, signature)
    }
}

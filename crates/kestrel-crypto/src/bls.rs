use crate::error::CryptoError;
use blst::min_pk::{PublicKey, SecretKey, Signature};
use rand::RngCore;

/// Domain separation tag for min-pk BLS12-381 signatures.
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// Compressed public key length (G1).
pub const BLS_PUBLIC_KEY_LEN: usize = 48;

/// Compressed signature length (G2).
pub const BLS_SIGNATURE_LEN: usize = 96;

/// BLS signature verification capability.
pub trait BlsVerifier {
    fn verify_bls(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError>;
}

/// Verifier backed by `blst`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlstBls;

impl BlsVerifier for BlstBls {
    fn verify_bls(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        bls_verify(public_key, message, signature)
    }
}

/// BLS12-381 keypair for producing test signatures.
pub struct BlsKeypair {
    secret_key: SecretKey,
}

impl BlsKeypair {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut ikm = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut ikm);
        Self::from_ikm(&ikm)
    }

    /// Derive a keypair from 32 bytes of input keying material.
    pub fn from_ikm(ikm: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret_key = SecretKey::key_gen(ikm, &[])
            .map_err(|e| CryptoError::KeyDerivationFailed(format!("{:?}", e)))?;
        Ok(Self { secret_key })
    }

    pub fn public_key(&self) -> [u8; BLS_PUBLIC_KEY_LEN] {
        self.secret_key.sk_to_pk().compress()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; BLS_SIGNATURE_LEN] {
        self.secret_key.sign(message, BLS_DST, &[]).compress()
    }
}

/// Verify a compressed BLS signature against a compressed public key.
pub fn bls_verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let pk = PublicKey::uncompress(public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = Signature::uncompress(signature).map_err(|_| CryptoError::InvalidSignature)?;

    let result = sig.verify(true, message, BLS_DST, &[], &pk, true);

    if result == blst::BLST_ERROR::BLST_SUCCESS {
        Ok(())
    } else {
        Err(CryptoError::VerificationFailed)
    }
}

//! Hashing and signature verification imports. Verifiers return 0 for a
//! valid signature and -1 otherwise; malformed input never traps.

use super::memory;
use crate::error::VmError;
use crate::host::VmHost;
use kestrel_crypto::bls::{BLS_PUBLIC_KEY_LEN, BLS_SIGNATURE_LEN};
use kestrel_crypto::secp256k1::signature_length;
use kestrel_crypto::{BlsVerifier, CryptoError, Ed25519Verifier, Hasher, Secp256k1Verifier};
use tracing::trace;

const ED25519_KEY_LEN: i32 = 32;
const ED25519_SIGNATURE_LEN: i32 = 64;

fn verification_status(scheme: &str, result: Result<(), CryptoError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            trace!(scheme, error = %err, "Signature rejected");
            -1
        }
    }
}

pub fn sha256(host: &VmHost, memory: &mut [u8], data_offset: i32, length: i32, result_offset: i32) -> Result<i32, VmError> {
    host.use_gas(host.schedule().crypto_api_cost.sha256)?;
    let digest = host.crypto().sha256(memory::load(memory, data_offset, length)?);
    memory::store(memory, result_offset, digest.as_bytes())?;
    Ok(0)
}

pub fn verify_ed25519(
    host: &VmHost,
    memory: &mut [u8],
    key_offset: i32,
    message_offset: i32,
    message_length: i32,
    sig_offset: i32,
) -> Result<i32, VmError> {
    host.use_gas(host.schedule().crypto_api_cost.verify_ed25519)?;
    let key = memory::load(memory, key_offset, ED25519_KEY_LEN)?;
    let message = memory::load(memory, message_offset, message_length)?;
    let signature = memory::load(memory, sig_offset, ED25519_SIGNATURE_LEN)?;
    Ok(verification_status("ed25519", host.crypto().verify_ed25519(key, message, signature)))
}

pub fn verify_bls(
    host: &VmHost,
    memory: &mut [u8],
    key_offset: i32,
    message_offset: i32,
    message_length: i32,
    sig_offset: i32,
) -> Result<i32, VmError> {
    host.use_gas(host.schedule().crypto_api_cost.verify_bls)?;
    let key = memory::load(memory, key_offset, BLS_PUBLIC_KEY_LEN as i32)?;
    let message = memory::load(memory, message_offset, message_length)?;
    let signature = memory::load(memory, sig_offset, BLS_SIGNATURE_LEN as i32)?;
    Ok(verification_status("bls", host.crypto().verify_bls(key, message, signature)))
}

/// The signature is either 64 compact bytes or a DER sequence whose
/// length is read from its header.
pub fn verify_secp256k1(
    host: &VmHost,
    memory: &mut [u8],
    key_offset: i32,
    key_length: i32,
    message_offset: i32,
    message_length: i32,
    sig_offset: i32,
) -> Result<i32, VmError> {
    host.use_gas(host.schedule().crypto_api_cost.verify_secp256k1)?;
    let key = memory::load(memory, key_offset, key_length)?;
    let message = memory::load(memory, message_offset, message_length)?;
    let header = memory::load(memory, sig_offset, 2)?;
    let signature = memory::load(memory, sig_offset, signature_length(header) as i32)?;
    Ok(verification_status("secp256k1", host.crypto().verify_secp256k1(key, message, signature)))
}

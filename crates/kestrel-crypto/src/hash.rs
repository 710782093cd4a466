use kestrel_types::Hash;
use sha2::{Digest, Sha256};

/// Hashing capability offered to contracts.
pub trait Hasher {
    /// SHA-256 digest.
    fn sha256(&self, data: &[u8]) -> Hash;

    /// blake3 digest, the native hash of the chain.
    fn blake3(&self, data: &[u8]) -> Hash;
}

/// Default hasher backed by `sha2` and `blake3`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHasher;

impl Hasher for DefaultHasher {
    fn sha256(&self, data: &[u8]) -> Hash {
        let digest: [u8; 32] = Sha256::digest(data).into();
        Hash::from_bytes(digest)
    }

    fn blake3(&self, data: &[u8]) -> Hash {
        Hash::compute(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let digest = DefaultHasher.sha256(b"abc");
        assert_eq!(
            digest.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_blake3_matches_hash_compute() {
        assert_eq!(DefaultHasher.blake3(b"data"), Hash::compute(b"data"));
        assert_ne!(DefaultHasher.blake3(b"data"), DefaultHasher.sha256(b"data"));
    }
}

//! Serde implementations for kestrel-types.
//!
//! Human-readable formats get the string forms (Bech32m addresses, 0x hashes);
//! binary formats such as bincode get the raw 32 bytes.

use crate::{Address, Hash};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

fn serialize_fixed<S: Serializer>(
    serializer: S,
    text: impl FnOnce() -> String,
    bytes: &[u8; 32],
) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        text().serialize(serializer)
    } else {
        bytes.serialize(serializer)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_fixed(serializer, || self.to_string(), self.as_bytes())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Address::from_str(&s).map_err(D::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Address::from_bytes)
        }
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_fixed(serializer, || self.to_string(), self.as_bytes())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Hash::from_str(&s).map_err(D::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Hash::from_bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_json_is_bech32() {
        let addr = Address::from_bytes([5u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert!(json.contains("kes1"));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
    }

    #[test]
    fn test_hash_bincode_is_raw() {
        let hash = Hash::compute(b"record");
        let encoded = bincode::serialize(&hash).unwrap();
        assert_eq!(encoded.len(), 32);
        let back: Hash = bincode::deserialize(&encoded).unwrap();
        assert_eq!(hash, back);
    }
}

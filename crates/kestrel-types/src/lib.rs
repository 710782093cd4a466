//! Kestrel Types - Core type definitions shared by the Kestrel contract host.
//!
//! This crate provides:
//! - Addresses (32-byte, Bech32m encoded)
//! - Hashes (32-byte digests)

pub mod address;
pub mod hash;
pub mod error;

#[cfg(feature = "serde")]
mod serialization;

pub use address::Address;
pub use hash::Hash;
pub use error::TypesError;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Address, Hash, TypesError};
}

//! Cryptographic functions for walvault
//!
//! Provides AES-256-GCM encryption with Argon2id key derivation for the
//! encryption stage of the artifact codec.

pub mod encryption;
pub mod key_derivation;
pub mod secure_memory;

pub use encryption::{decrypt, encrypt, Sealed, NONCE_SIZE};
pub use key_derivation::{
    derive_key, DerivedKey, KeyDerivationParams, MAX_MEMORY_KIB, MAX_PARALLELISM, MAX_TIME_COST,
};
pub use secure_memory::SecureString;

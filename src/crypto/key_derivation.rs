//! Key derivation using Argon2id
//!
//! Derives artifact keys from the configured password. Every encrypted
//! artifact carries its own random salt, so two artifacts never share a key.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, Params,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::settings::KdfSettings;
use crate::error::{CodecStage, VaultError, VaultResult};

/// Largest memory cost accepted, in KiB (4 GiB)
pub const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;

/// Largest time cost accepted
pub const MAX_TIME_COST: u32 = 64;

/// Largest parallelism accepted
pub const MAX_PARALLELISM: u32 = 64;

/// Parameters for key derivation, stored in each encrypted artifact's header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDerivationParams {
    /// Salt for key derivation (base64 encoded, no padding)
    pub salt: String,
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Time cost (iterations)
    pub time_cost: u32,
    /// Parallelism degree
    pub parallelism: u32,
}

impl KeyDerivationParams {
    /// Create params with a fresh random salt and the configured costs
    pub fn generate(kdf: &KdfSettings) -> Self {
        let salt = SaltString::generate(&mut OsRng);
        Self {
            salt: salt.to_string(),
            memory_cost: kdf.memory_kib,
            time_cost: kdf.iterations,
            parallelism: kdf.parallelism,
        }
    }
}

impl KeyDerivationParams {
    /// Describe the first cost above its ceiling, if any
    ///
    /// Headers come from disk, so a damaged one must not be able to demand
    /// terabytes of memory.
    pub fn exceeded_limit(&self) -> Option<String> {
        if self.memory_cost > MAX_MEMORY_KIB {
            Some(format!(
                "memory cost {} KiB exceeds the {} KiB ceiling",
                self.memory_cost, MAX_MEMORY_KIB
            ))
        } else if self.time_cost > MAX_TIME_COST {
            Some(format!(
                "time cost {} exceeds the ceiling of {}",
                self.time_cost, MAX_TIME_COST
            ))
        } else if self.parallelism > MAX_PARALLELISM {
            Some(format!(
                "parallelism {} exceeds the ceiling of {}",
                self.parallelism, MAX_PARALLELISM
            ))
        } else {
            None
        }
    }
}

/// A derived 256-bit key, wiped on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; 32],
}

impl DerivedKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// Derive an encryption key from a password
///
/// `stage` tags failures so that a bad header met while decoding reports as a
/// decrypt failure and a bad configuration met while encoding as an encrypt
/// failure.
pub fn derive_key(
    password: &str,
    params: &KeyDerivationParams,
    stage: CodecStage,
) -> VaultResult<DerivedKey> {
    if let Some(limit) = params.exceeded_limit() {
        return Err(VaultError::codec(
            stage,
            format!("Refusing Argon2 parameters: {}", limit),
        ));
    }

    let salt = SaltString::from_b64(&params.salt)
        .map_err(|e| VaultError::codec(stage, format!("Invalid salt: {}", e)))?;

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32), // Output length for AES-256
    )
    .map_err(|e| VaultError::codec(stage, format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| VaultError::codec(stage, format!("Key derivation failed: {}", e)))?;

    let hash_output = hash
        .hash
        .ok_or_else(|| VaultError::codec(stage, "No hash output generated"))?;

    let hash_bytes = hash_output.as_bytes();
    if hash_bytes.len() < 32 {
        return Err(VaultError::codec(
            stage,
            "Hash output too short for AES-256 key",
        ));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&hash_bytes[..32]);

    Ok(DerivedKey { key })
}

//! AES-256-GCM encryption/decryption
//!
//! Provides authenticated encryption of artifact payloads. Each call
//! generates a unique nonce; a wrong key or tampered ciphertext fails the
//! authentication tag check instead of producing output.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

use crate::error::{CodecStage, VaultError, VaultResult};

use super::DerivedKey;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Ciphertext (with authentication tag) and the nonce that produced it
#[derive(Debug, Clone)]
pub struct Sealed {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Encrypt plaintext data using AES-256-GCM
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> VaultResult<Sealed> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| {
        VaultError::codec(CodecStage::Encrypt, format!("Failed to create cipher: {}", e))
    })?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::codec(CodecStage::Encrypt, format!("Encryption failed: {}", e)))?;

    Ok(Sealed {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt ciphertext using AES-256-GCM
pub fn decrypt(nonce: &[u8], ciphertext: &[u8], key: &DerivedKey) -> VaultResult<Vec<u8>> {
    if nonce.len() != NONCE_SIZE {
        return Err(VaultError::codec(
            CodecStage::Decrypt,
            format!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce.len()
            ),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| {
        VaultError::codec(CodecStage::Decrypt, format!("Failed to create cipher: {}", e))
    })?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            VaultError::codec(
                CodecStage::Decrypt,
                "authentication failed: wrong password or corrupted data",
            )
        })
}

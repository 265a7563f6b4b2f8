//! Encrypted artifact layout
//!
//! ```text
//! WVENC\x01 | u32 LE header length | JSON header | ciphertext + GCM tag
//! ```
//!
//! The header carries the Argon2id parameters and salt used for this
//! artifact, and the nonce. Nothing in it is secret.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::config::settings::{CipherAlgorithm, KdfSettings};
use crate::crypto::{decrypt, derive_key, encrypt, KeyDerivationParams};
use crate::error::{CodecStage, VaultError, VaultResult};

const MAGIC: &[u8; 6] = b"WVENC\x01";
const MAX_HEADER_LEN: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHeader {
    algorithm: CipherAlgorithm,
    kdf: KeyDerivationParams,
    /// Base64 nonce
    nonce: String,
}

/// Encrypt `plaintext` under a key derived from `password` with a fresh salt
pub fn seal(
    plaintext: &[u8],
    password: &str,
    kdf: &KdfSettings,
    algorithm: CipherAlgorithm,
) -> VaultResult<Vec<u8>> {
    let params = KeyDerivationParams::generate(kdf);
    let key = derive_key(password, &params, CodecStage::Encrypt)?;
    let sealed = encrypt(plaintext, &key)?;

    let header = EnvelopeHeader {
        algorithm,
        kdf: params,
        nonce: STANDARD.encode(sealed.nonce),
    };
    let header_json = serde_json::to_vec(&header).map_err(|e| {
        VaultError::codec(
            CodecStage::Encrypt,
            format!("Failed to serialize header: {}", e),
        )
    })?;

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header_json.len() + sealed.ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&sealed.ciphertext);
    Ok(out)
}

/// Decrypt an artifact produced by [`seal`]
pub fn open(data: &[u8], password: &str) -> VaultResult<Vec<u8>> {
    let malformed = |what: &str| VaultError::codec(CodecStage::Decrypt, format!("Malformed encrypted artifact: {}", what));

    let rest = data
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| malformed("missing header magic"))?;

    if rest.len() < 4 {
        return Err(malformed("truncated header length"));
    }
    let (len_bytes, rest) = rest.split_at(4);
    let header_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    if header_len > MAX_HEADER_LEN || header_len > rest.len() {
        return Err(malformed("header length out of range"));
    }

    let (header_json, ciphertext) = rest.split_at(header_len);
    let header: EnvelopeHeader =
        serde_json::from_slice(header_json).map_err(|e| malformed(&e.to_string()))?;
    let nonce = STANDARD
        .decode(&header.nonce)
        .map_err(|e| malformed(&format!("invalid nonce encoding: {}", e)))?;

    match header.algorithm {
        CipherAlgorithm::Aes256Gcm => {
            let key = derive_key(password, &header.kdf, CodecStage::Decrypt)?;
            decrypt(&nonce, ciphertext, &key)
        }
    }
}

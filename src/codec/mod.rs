//! Artifact codec
//!
//! Composes and decomposes the reversible transform chain applied to every
//! stored artifact: gzip compression, then AES-256-GCM encryption. Decoding
//! classifies the artifact by its suffix and applies the inverse stages in
//! reverse order, so a decrypt failure is always reported before any attempt
//! to decompress.
//!
//! # Example
//!
//! ```rust,ignore
//! use walvault::codec::{ArtifactCodec, EncodingChain};
//!
//! let codec = ArtifactCodec::new(&settings.codec, password)?;
//! let encoded = codec.encode(b"raw", EncodingChain::CompressedEncrypted)?;
//! let raw = codec.decode(&encoded, EncodingChain::CompressedEncrypted)?;
//! ```

mod chain;
pub mod compression;
pub mod envelope;

pub use chain::{EncodingChain, Stage};

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::config::settings::{CipherAlgorithm, CodecSettings, KdfSettings};
use crate::crypto::SecureString;
use crate::error::{CodecStage, VaultError, VaultResult};
use crate::storage::write_bytes_atomic;

/// Result of encoding a file into the store
#[derive(Debug, Clone)]
pub struct EncodedFile {
    pub path: PathBuf,
    pub chain: EncodingChain,
    pub raw_size: u64,
    pub size: u64,
}

/// Stateless transform chain configured once at startup
#[derive(Debug, Clone)]
pub struct ArtifactCodec {
    chain: EncodingChain,
    compression_level: u32,
    algorithm: CipherAlgorithm,
    kdf: KdfSettings,
    password: Option<SecureString>,
}

impl ArtifactCodec {
    /// Build the codec from settings
    ///
    /// Fails when encryption is enabled but no password was supplied.
    pub fn new(settings: &CodecSettings, password: Option<SecureString>) -> VaultResult<Self> {
        if settings.encrypt && password.is_none() {
            return Err(VaultError::Config(format!(
                "codec.encrypt is enabled but no password was found (set {} or codec.password_file)",
                settings.password_env
            )));
        }

        Ok(Self {
            chain: settings.chain(),
            compression_level: settings.compression_level,
            algorithm: settings.algorithm,
            kdf: settings.kdf.clone(),
            password,
        })
    }

    /// A codec that stores artifacts untransformed and can only decode
    /// unencrypted ones
    pub fn plain() -> Self {
        Self {
            chain: EncodingChain::Plain,
            compression_level: 6,
            algorithm: CipherAlgorithm::default(),
            kdf: KdfSettings::default(),
            password: None,
        }
    }

    /// Chain applied to newly encoded artifacts
    pub fn chain(&self) -> EncodingChain {
        self.chain
    }

    fn password(&self, stage: CodecStage) -> VaultResult<&str> {
        self.password.as_deref().ok_or_else(|| match stage {
            CodecStage::Decrypt => VaultError::Config(
                "artifact is encrypted but no password was supplied (use --ask-password or configure codec.password_env)".into(),
            ),
            _ => VaultError::Config("encryption requested but no password was supplied".into()),
        })
    }

    /// Apply `chain` to raw bytes
    pub fn encode(&self, raw: &[u8], chain: EncodingChain) -> VaultResult<Vec<u8>> {
        let mut data = raw.to_vec();
        for stage in chain.stages() {
            data = match stage {
                Stage::Compress => compression::gzip_compress(&data, self.compression_level)?,
                Stage::Encrypt => envelope::seal(
                    &data,
                    self.password(CodecStage::Encrypt)?,
                    &self.kdf,
                    self.algorithm,
                )?,
            };
        }
        Ok(data)
    }

    /// Invert `chain`: decrypt first, then decompress
    pub fn decode(&self, encoded: &[u8], chain: EncodingChain) -> VaultResult<Vec<u8>> {
        let mut data = encoded.to_vec();
        for stage in chain.stages().iter().rev() {
            data = match stage {
                Stage::Encrypt => envelope::open(&data, self.password(CodecStage::Decrypt)?)?,
                Stage::Compress => compression::gzip_decompress(&data)?,
            };
        }
        Ok(data)
    }

    /// Encode `src` into `dest_dir/<stem><suffix>` with the configured chain
    ///
    /// The destination appears only once fully written.
    pub fn encode_file(&self, src: &Path, dest_dir: &Path, stem: &str) -> VaultResult<EncodedFile> {
        let raw = fs::read(src)
            .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", src.display(), e)))?;
        let encoded = self
            .encode(&raw, self.chain)
            .map_err(|e| with_artifact(e, src))?;

        let path = dest_dir.join(self.chain.file_name(stem));
        write_bytes_atomic(&path, &encoded)?;

        Ok(EncodedFile {
            path,
            chain: self.chain,
            raw_size: raw.len() as u64,
            size: encoded.len() as u64,
        })
    }

    /// Decode a stored artifact, recovering its chain from the file suffix
    pub fn decode_file(&self, artifact: &Path) -> VaultResult<Vec<u8>> {
        let chain = chain_of(artifact);
        let encoded = fs::read(artifact).map_err(|e| {
            VaultError::Io(format!("Failed to read artifact {}: {}", artifact.display(), e))
        })?;
        self.decode(&encoded, chain)
            .map_err(|e| with_artifact(e, artifact))
    }

    /// Decode a stored artifact into `dest`, returning the decoded size
    pub fn decode_file_to(&self, artifact: &Path, dest: &Path) -> VaultResult<u64> {
        let raw = self.decode_file(artifact)?;
        write_bytes_atomic(dest, &raw)?;
        Ok(raw.len() as u64)
    }

    /// Stream a stored artifact's decoded bytes into `consume`
    ///
    /// Decompression is streamed; only an encrypted artifact is held in
    /// memory, since the cipher authenticates it as a whole.
    pub fn read_decoded<T>(
        &self,
        artifact: &Path,
        consume: impl FnOnce(&mut dyn Read) -> VaultResult<T>,
    ) -> VaultResult<T> {
        let chain = chain_of(artifact);
        let result = if chain.is_encrypted() {
            let encoded = fs::read(artifact).map_err(|e| {
                VaultError::Io(format!("Failed to read artifact {}: {}", artifact.display(), e))
            })?;
            let decrypted = envelope::open(&encoded, self.password(CodecStage::Decrypt)?)
                .map_err(|e| with_artifact(e, artifact))?;
            if chain.is_compressed() {
                compression::gzip_consume(decrypted.as_slice(), consume)
            } else {
                consume(&mut decrypted.as_slice())
            }
        } else {
            let mut reader = BufReader::new(File::open(artifact).map_err(|e| {
                VaultError::Io(format!("Failed to open artifact {}: {}", artifact.display(), e))
            })?);
            if chain.is_compressed() {
                compression::gzip_consume(reader, consume)
            } else {
                consume(&mut reader)
            }
        };

        result.map_err(|e| with_artifact(e, artifact))
    }

    /// Check that an artifact decodes without materializing the output
    ///
    /// Returns the decoded size.
    pub fn validate_file(&self, artifact: &Path) -> VaultResult<u64> {
        self.read_decoded(artifact, |stream| Ok(io::copy(stream, &mut io::sink())?))
    }
}

/// Chain encoded by an artifact's file name
pub fn chain_of(path: &Path) -> EncodingChain {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    EncodingChain::classify(&name).1
}

/// Prefix codec failures with the artifact they concern
fn with_artifact(err: VaultError, path: &Path) -> VaultError {
    match err {
        VaultError::Codec { stage, message } => VaultError::Codec {
            stage,
            message: format!("{}: {}", path.display(), message),
        },
        other => other,
    }
}

//! Encoding chains
//!
//! Exactly four chains exist. The chain of a stored artifact is recovered
//! from its file suffix, so no lookup table is needed to decode it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single reversible transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compress,
    Encrypt,
}

/// Ordered list of transforms applied to an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingChain {
    #[serde(rename = "plain")]
    Plain,
    #[serde(rename = "compressed")]
    Compressed,
    #[serde(rename = "encrypted")]
    Encrypted,
    #[serde(rename = "compressed+encrypted")]
    CompressedEncrypted,
}

const GZ: &str = ".gz";
const ENC: &str = ".enc";
const GZ_ENC: &str = ".gz.enc";

impl EncodingChain {
    pub const ALL: [EncodingChain; 4] = [
        EncodingChain::Plain,
        EncodingChain::Compressed,
        EncodingChain::Encrypted,
        EncodingChain::CompressedEncrypted,
    ];

    /// Chain selected by the codec switches
    pub fn from_flags(compress: bool, encrypt: bool) -> Self {
        match (compress, encrypt) {
            (false, false) => EncodingChain::Plain,
            (true, false) => EncodingChain::Compressed,
            (false, true) => EncodingChain::Encrypted,
            (true, true) => EncodingChain::CompressedEncrypted,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            EncodingChain::Compressed | EncodingChain::CompressedEncrypted
        )
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(
            self,
            EncodingChain::Encrypted | EncodingChain::CompressedEncrypted
        )
    }

    /// File suffix identifying this chain
    pub fn suffix(&self) -> &'static str {
        match self {
            EncodingChain::Plain => "",
            EncodingChain::Compressed => GZ,
            EncodingChain::Encrypted => ENC,
            EncodingChain::CompressedEncrypted => GZ_ENC,
        }
    }

    /// Stages in encode order; decoding walks them in reverse
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            EncodingChain::Plain => &[],
            EncodingChain::Compressed => &[Stage::Compress],
            EncodingChain::Encrypted => &[Stage::Encrypt],
            EncodingChain::CompressedEncrypted => &[Stage::Compress, Stage::Encrypt],
        }
    }

    /// File name for `stem` encoded with this chain
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}{}", stem, self.suffix())
    }

    /// Split a file name into its stem and the chain its suffix encodes
    ///
    /// Longest suffix wins, so `x.gz.enc` is never read as an encrypted `x.gz`.
    pub fn classify(file_name: &str) -> (&str, EncodingChain) {
        if let Some(stem) = file_name.strip_suffix(GZ_ENC) {
            (stem, EncodingChain::CompressedEncrypted)
        } else if let Some(stem) = file_name.strip_suffix(ENC) {
            (stem, EncodingChain::Encrypted)
        } else if let Some(stem) = file_name.strip_suffix(GZ) {
            (stem, EncodingChain::Compressed)
        } else {
            (file_name, EncodingChain::Plain)
        }
    }

    /// Every file name `stem` could be stored under
    pub fn variants(stem: &str) -> [String; 4] {
        EncodingChain::ALL.map(|chain| chain.file_name(stem))
    }
}

impl fmt::Display for EncodingChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingChain::Plain => write!(f, "plain"),
            EncodingChain::Compressed => write!(f, "compressed"),
            EncodingChain::Encrypted => write!(f, "encrypted"),
            EncodingChain::CompressedEncrypted => write!(f, "compressed+encrypted"),
        }
    }
}

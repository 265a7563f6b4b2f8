//! Gzip compression stage

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{CodecStage, VaultError, VaultResult};

/// Gzip compress data at the given level (0-9)
pub fn gzip_compress(data: &[u8], level: u32) -> VaultResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data).map_err(|e| {
        VaultError::codec(CodecStage::Compress, format!("Gzip compression failed: {}", e))
    })?;

    encoder.finish().map_err(|e| {
        VaultError::codec(CodecStage::Compress, format!("Gzip finalization failed: {}", e))
    })
}

/// Gzip decompress data
pub fn gzip_decompress(data: &[u8]) -> VaultResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).map_err(|e| {
        VaultError::codec(
            CodecStage::Decompress,
            format!("Gzip decompression failed: {}", e),
        )
    })?;
    Ok(decompressed)
}

/// Walk a gzip stream to its end without keeping the output
///
/// Returns the decompressed length.
pub fn gzip_validate<R: Read>(reader: R) -> VaultResult<u64> {
    gzip_consume(reader, |stream| Ok(io::copy(stream, &mut io::sink())?))
}

/// Gzip reader that remembers its own failure
struct Inflating<R: Read> {
    decoder: GzDecoder<R>,
    failure: Option<String>,
}

impl<R: Read> Read for Inflating<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.decoder.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.failure = Some(e.to_string());
                Err(e)
            }
        }
    }
}

/// Hand the decompressed stream of `reader` to `consume`
///
/// The output is never collected. When `consume` fails because the gzip
/// stream itself is damaged, the error is reported as a decompress failure
/// rather than whatever the consumer made of the short read.
pub fn gzip_consume<R, T>(
    reader: R,
    consume: impl FnOnce(&mut dyn Read) -> VaultResult<T>,
) -> VaultResult<T>
where
    R: Read,
{
    let mut inflating = Inflating {
        decoder: GzDecoder::new(reader),
        failure: None,
    };
    let result = consume(&mut inflating);
    match (result, inflating.failure) {
        (Err(_), Some(failure)) => Err(VaultError::codec(
            CodecStage::Decompress,
            format!("Gzip stream is corrupt: {}", failure),
        )),
        (result, _) => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = b"hello world, this is segment data for compression";
        let compressed = gzip_compress(data, 6).unwrap();
        let decompressed = gzip_decompress(&compressed).unwrap();
        assert_eq!(data.to_vec(), decompressed);
    }

    #[test]
    fn test_corrupt_stream_is_decompress_failure() {
        let mut compressed = gzip_compress(&[7u8; 4096], 6).unwrap();
        let mid = compressed.len() / 2;
        compressed[mid] ^= 0xFF;
        compressed.truncate(compressed.len() - 4);

        let err = gzip_decompress(&compressed).unwrap_err();
        assert!(err.is_decompression_failure());
    }

    #[test]
    fn test_validate_counts_bytes() {
        let compressed = gzip_compress(&[1u8; 10_000], 9).unwrap();
        assert_eq!(gzip_validate(compressed.as_slice()).unwrap(), 10_000);
    }

    #[test]
    fn test_validate_rejects_garbage() {
        let err = gzip_validate(&b"definitely not gzip"[..]).unwrap_err();
        assert!(err.is_decompression_failure());
    }

    #[test]
    fn test_consume_reports_damaged_stream_as_decompress() {
        let compressed = gzip_compress(&[3u8; 50_000], 6).unwrap();
        let truncated = &compressed[..compressed.len() / 2];

        let err = gzip_consume(truncated, |stream| {
            io::copy(stream, &mut io::sink())
                .map_err(|e| VaultError::Integrity(format!("short read: {}", e)))
        })
        .unwrap_err();
        assert!(err.is_decompression_failure(), "{}", err);
    }

    #[test]
    fn test_consume_keeps_consumer_errors() {
        let compressed = gzip_compress(b"fine", 6).unwrap();
        let err = gzip_consume(compressed.as_slice(), |_| -> VaultResult<()> {
            Err(VaultError::Integrity("not an archive".into()))
        })
        .unwrap_err();
        assert!(matches!(err, VaultError::Integrity(_)));
    }
}

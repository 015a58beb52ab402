//! Compression codec support for Avro blocks
//!
//! Container files name their block codec in the `avro.codec` header
//! metadata entry. The scanner recognizes `null`, `snappy`, and `deflate`.

use bytes::Bytes;

use crate::error::CodecError;

#[cfg(feature = "snappy")]
use snap::raw::Decoder as SnappyDecoder;

#[cfg(feature = "deflate")]
use flate2::read::DeflateDecoder;

#[cfg(feature = "deflate")]
use std::io::Read;

/// Compression codec used within Avro blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// No compression (block payload is raw Avro binary)
    #[default]
    Null,
    /// Snappy compression with Avro framing (4-byte CRC-32 suffix)
    Snappy,
    /// Raw DEFLATE (RFC 1951) compression
    Deflate,
}

impl Codec {
    /// Parse a codec from its name string as found in Avro metadata.
    ///
    /// Any name outside the supported set is an error; the header decoder
    /// surfaces it as an unknown-codec failure for the file.
    pub fn from_name(name: &str) -> Result<Self, CodecError> {
        match name {
            "null" => Ok(Codec::Null),
            "snappy" => Ok(Codec::Snappy),
            "deflate" => Ok(Codec::Deflate),
            unknown => Err(CodecError::UnsupportedCodec(unknown.to_string())),
        }
    }

    /// The canonical name of this codec as written in file metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Null => "null",
            Codec::Snappy => "snappy",
            Codec::Deflate => "deflate",
        }
    }

    /// Whether blocks under this codec require decompression.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Codec::Null)
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Block decompressor owned by one scanner instance.
///
/// `process_block` takes the full block payload as framed in the file.
/// For Snappy that payload carries a trailing 4-byte CRC-32 of the
/// uncompressed data; the trailer is split off before the decoder sees
/// the input and verified afterwards.
pub struct Decompressor {
    codec: Codec,
}

impl Decompressor {
    /// Create a decompressor for a compressed codec.
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }

    /// Whether the output buffer is reused across `process_block` calls.
    ///
    /// This implementation allocates a fresh buffer per block, so the
    /// block loop must hand each decompressed buffer to the sink's pool.
    pub fn reuse_output_buffer(&self) -> bool {
        false
    }

    /// Decompress one block payload.
    pub fn process_block(&mut self, block: &[u8]) -> Result<Bytes, CodecError> {
        match self.codec {
            Codec::Null => Ok(Bytes::copy_from_slice(block)),
            Codec::Snappy => decompress_snappy(block),
            Codec::Deflate => decompress_deflate(block),
        }
    }
}

/// Length of the CRC-32 trailer on Snappy-framed blocks.
pub const SNAPPY_TRAILING_CHECKSUM_LEN: usize = 4;

/// Decompress a Snappy block with Avro framing.
///
/// Format: `[snappy data][4-byte big-endian CRC-32 of the uncompressed
/// data]`. The checksum uses the ISO polynomial (plain CRC-32, not
/// CRC-32C), matching Apache Avro writers.
#[cfg(feature = "snappy")]
fn decompress_snappy(block: &[u8]) -> Result<Bytes, CodecError> {
    if block.len() < SNAPPY_TRAILING_CHECKSUM_LEN {
        return Err(CodecError::DecompressionError(
            "Snappy block too short: missing CRC-32 trailer".to_string(),
        ));
    }

    let (compressed, trailer) = block.split_at(block.len() - SNAPPY_TRAILING_CHECKSUM_LEN);
    let expected_crc = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);

    let decompressed = if compressed.is_empty() {
        Vec::new()
    } else {
        SnappyDecoder::new().decompress_vec(compressed).map_err(|e| {
            CodecError::DecompressionError(format!("Snappy decompression failed: {}", e))
        })?
    };

    let actual_crc = crc32fast::hash(&decompressed);
    if actual_crc != expected_crc {
        return Err(CodecError::DecompressionError(format!(
            "Snappy CRC-32 mismatch: expected 0x{:08X}, got 0x{:08X}",
            expected_crc, actual_crc
        )));
    }

    Ok(Bytes::from(decompressed))
}

#[cfg(not(feature = "snappy"))]
fn decompress_snappy(_block: &[u8]) -> Result<Bytes, CodecError> {
    Err(CodecError::UnsupportedCodec(
        "snappy codec not enabled; rebuild with the 'snappy' feature".to_string(),
    ))
}

/// Decompress a raw-DEFLATE block (no zlib or gzip wrapper).
#[cfg(feature = "deflate")]
fn decompress_deflate(block: &[u8]) -> Result<Bytes, CodecError> {
    if block.is_empty() {
        return Ok(Bytes::new());
    }

    let mut decompressed = Vec::new();
    DeflateDecoder::new(block)
        .read_to_end(&mut decompressed)
        .map_err(|e| {
            CodecError::DecompressionError(format!("Deflate decompression failed: {}", e))
        })?;

    Ok(Bytes::from(decompressed))
}

#[cfg(not(feature = "deflate"))]
fn decompress_deflate(_block: &[u8]) -> Result<Bytes, CodecError> {
    Err(CodecError::UnsupportedCodec(
        "deflate codec not enabled; rebuild with the 'deflate' feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_known() {
        assert_eq!(Codec::from_name("null").unwrap(), Codec::Null);
        assert_eq!(Codec::from_name("snappy").unwrap(), Codec::Snappy);
        assert_eq!(Codec::from_name("deflate").unwrap(), Codec::Deflate);
    }

    #[test]
    fn from_name_unknown() {
        for name in ["zstd", "bzip2", "xz", "lzo", ""] {
            let err = Codec::from_name(name).unwrap_err();
            assert!(matches!(err, CodecError::UnsupportedCodec(_)));
        }
    }

    #[test]
    fn name_roundtrip() {
        for codec in [Codec::Null, Codec::Snappy, Codec::Deflate] {
            assert_eq!(Codec::from_name(codec.name()).unwrap(), codec);
        }
    }

    #[test]
    fn default_is_null() {
        assert_eq!(Codec::default(), Codec::Null);
        assert!(!Codec::Null.is_compressed());
        assert!(Codec::Snappy.is_compressed());
    }

    #[test]
    fn null_passthrough() {
        let mut d = Decompressor::new(Codec::Null);
        let out = d.process_block(b"raw avro payload").unwrap();
        assert_eq!(&out[..], b"raw avro payload");
        assert!(!d.reuse_output_buffer());
    }

    #[cfg(feature = "snappy")]
    mod snappy_tests {
        use super::*;

        fn frame_snappy(uncompressed: &[u8]) -> Vec<u8> {
            let mut framed = snap::raw::Encoder::new().compress_vec(uncompressed).unwrap();
            framed.extend_from_slice(&crc32fast::hash(uncompressed).to_be_bytes());
            framed
        }

        #[test]
        fn roundtrip() {
            let original: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
            let framed = frame_snappy(&original);
            let out = Decompressor::new(Codec::Snappy).process_block(&framed).unwrap();
            assert_eq!(&out[..], &original[..]);
        }

        #[test]
        fn empty_payload() {
            let framed = frame_snappy(b"");
            let out = Decompressor::new(Codec::Snappy).process_block(&framed).unwrap();
            assert!(out.is_empty());
        }

        #[test]
        fn missing_trailer() {
            let err = Decompressor::new(Codec::Snappy)
                .process_block(&[0x01, 0x02])
                .unwrap_err();
            assert!(err.to_string().contains("too short"));
        }

        #[test]
        fn crc_mismatch() {
            let mut framed = frame_snappy(b"payload");
            let last = framed.len() - 1;
            framed[last] ^= 0xFF;
            let err = Decompressor::new(Codec::Snappy)
                .process_block(&framed)
                .unwrap_err();
            assert!(err.to_string().contains("CRC-32 mismatch"));
        }

        #[test]
        fn corrupt_compressed_data() {
            let framed = vec![0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0];
            let err = Decompressor::new(Codec::Snappy)
                .process_block(&framed)
                .unwrap_err();
            assert!(matches!(err, CodecError::DecompressionError(_)));
        }
    }

    #[cfg(feature = "deflate")]
    mod deflate_tests {
        use super::*;
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        use std::io::Write;

        fn deflate(uncompressed: &[u8]) -> Vec<u8> {
            let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
            enc.write_all(uncompressed).unwrap();
            enc.finish().unwrap()
        }

        #[test]
        fn roundtrip() {
            let original = b"The quick brown fox jumps over the lazy dog. ".repeat(40);
            let compressed = deflate(&original);
            assert!(compressed.len() < original.len());
            let out = Decompressor::new(Codec::Deflate)
                .process_block(&compressed)
                .unwrap();
            assert_eq!(&out[..], &original[..]);
        }

        #[test]
        fn empty_input() {
            let out = Decompressor::new(Codec::Deflate).process_block(&[]).unwrap();
            assert!(out.is_empty());
        }

        #[test]
        fn corrupt_input() {
            let err = Decompressor::new(Codec::Deflate)
                .process_block(&[0xFF, 0xFF, 0xFF, 0xFF])
                .unwrap_err();
            assert!(matches!(err, CodecError::DecompressionError(_)));
        }
    }
}

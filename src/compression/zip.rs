
// see https://github.com/openexr/openexr/blob/master/OpenEXR/IlmImf/ImfCompressor.cpp

//! Deflate-based compression, applied either to a single scan line (`ZIPS`)
//! or to a block of 16 scan lines (`ZIP`). Pixel bytes are first run through
//! a horizontal-difference predictor and a byte-plane interleave step, the
//! same preprocessing PXR24 reuses, before being handed to zlib.

use super::*;
use super::optimize_bytes::*;

use crate::error::{Error, Result};
use miniz_oxide::deflate::compress_to_vec_zlib;
use zune_inflate::DeflateDecoder;

/// The four zlib compression-effort categories, as recorded by the FLEVEL
/// nibble of a zlib stream's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipLevel {
    Fastest,
    Fast,
    Default,
    Best,
}

impl ZipLevel {
    /// The concrete deflate level passed to the zlib encoder for this category.
    pub fn deflate_level(self) -> u8 {
        match self {
            ZipLevel::Fastest => 1,
            ZipLevel::Fast => 4,
            ZipLevel::Default => 6,
            ZipLevel::Best => 9,
        }
    }
}

impl Default for ZipLevel {
    fn default() -> Self { ZipLevel::Default }
}

/// Reads the FLEVEL nibble out of a zlib stream's two-byte header and maps
/// it back to one of the four representative levels, so that re-encoding
/// recovers the same deflate effort that produced the stream.
pub fn flevel_from_zlib_header(data: &[u8]) -> Option<ZipLevel> {
    if data.len() < 2 { return None; }

    Some(match (data[1] >> 6) & 0b11 {
        0 => ZipLevel::Fastest,
        1 => ZipLevel::Fast,
        2 => ZipLevel::Default,
        _ => ZipLevel::Best,
    })
}

pub fn decompress_bytes(data: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    let mut decoder = DeflateDecoder::new(data);
    let mut decompressed = decoder.decode_zlib()
        .map_err(|error| Error::corrupted(format!("zlib stream: {:?}", error)))?;

    if decompressed.len() != expected_byte_size {
        return Err(Error::corrupted(format!(
            "zip decompressed to {} bytes, expected {}", decompressed.len(), expected_byte_size
        )));
    }

    differences_to_samples(&mut decompressed);
    interleave_byte_blocks(&mut decompressed);
    Ok(decompressed)
}

pub fn compress_bytes(packed: Bytes<'_>) -> Result<ByteVec> {
    compress_bytes_at_level(packed, ZipLevel::default())
}

pub fn compress_bytes_at_level(packed: Bytes<'_>, level: ZipLevel) -> Result<ByteVec> {
    let mut packed = Vec::from(packed);
    separate_bytes_fragments(&mut packed);
    samples_to_differences(&mut packed);

    Ok(compress_to_vec_zlib(&packed, level.deflate_level()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip() {
        let source: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let compressed = compress_bytes(&source).unwrap();
        let decompressed = decompress_bytes(&compressed, source.len()).unwrap();
        assert_eq!(source, decompressed);
    }

    #[test]
    fn flevel_roundtrip() {
        let source: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        for level in [ZipLevel::Fastest, ZipLevel::Fast, ZipLevel::Default, ZipLevel::Best] {
            let compressed = compress_bytes_at_level(&source, level).unwrap();
            let recovered = flevel_from_zlib_header(&compressed);
            let reencoded = compress_bytes_at_level(&source, recovered.unwrap()).unwrap();
            assert_eq!(compressed, reencoded);
        }
    }
}

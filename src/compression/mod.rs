
//! Contains the compression attribute definition
//! and methods to compress and decompress data.


// private modules make non-breaking changes easier
mod zip;
mod rle;
mod piz;
mod pxr24;
mod b44;
mod dwa;
mod htj2k;

pub use zip::ZipLevel;

use crate::meta::{IntegerBounds, SampleType, ChannelList};
use crate::error::{Result, Error};


/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];

/// The default quality target used for DWA compression when the caller
/// does not request a specific one, matching the OpenEXR reference default.
pub const DEFAULT_DWA_COMPRESSION_LEVEL: f32 = 45.0;

/// Specifies which compression method to use.
/// Use uncompressed data for fastest loading and writing speeds.
/// Use RLE compression for fast loading and writing with slight memory savings.
/// Use ZIP compression for slow processing with large memory savings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compression {

    /// Store uncompressed values.
    /// Produces large files that can be read and written very quickly.
    /// Consider using RLE instead, as it provides some compression with almost equivalent speed.
    Uncompressed,

    /// Produces slightly smaller files
    /// that can still be read and written rather quickly.
    /// The compressed file size is usually between 60 and 75 percent of the uncompressed size.
    /// Works best for images with large flat areas, such as masks and abstract graphics.
    /// This compression method is lossless.
    RLE,

    /// Uses ZIP compression to compress each line. Slowly produces small images
    /// which can be read with moderate speed. This compression method is lossless.
    /// Might be slightly faster but larger than `ZIP16´.
    ZIP1,

    /// Uses ZIP compression to compress blocks of 16 lines. Slowly produces small images
    /// which can be read with moderate speed. This compression method is lossless.
    /// Might be slightly slower but smaller than `ZIP1´.
    ZIP16,

    /// PIZ compression works well for noisy and natural images. Works better with larger tiles.
    /// This compression method is lossless.
    // A wavelet transform is applied to the pixel data, and the result is Huffman-
    // encoded. This scheme tends to provide the best compression ratio for the types of
    // images that are typically processed at Industrial Light & Magic. Files are
    // compressed and decompressed at roughly the same speed. For photographic
    // images with film grain, the files are reduced to between 35 and 55 percent of their
    // uncompressed size.
    PIZ,

    /// Like `ZIP1`, but reduces precision of `f32` images to `f24`.
    /// Therefore, this is lossless compression for `f16` and `u32` data, lossy compression for `f32` data.
    // After reducing 32-bit floating-point data to 24 bits by rounding (while leaving 16-bit
    // floating-point data unchanged), differences between horizontally adjacent pixels
    // are compressed with zlib, similar to ZIP.
    PXR24,

    /// Lossy 4-by-4 pixel block compression, fixed compression rate.
    /// Channels of type HALF are split into blocks of four by four pixels or 32 bytes. Each
    /// block is then packed into 14 bytes, reducing the data to 44 percent of their
    /// uncompressed size. Channels of type UINT or FLOAT are passed through uncompressed.
    B44,

    /// Like `B44`, but flat 4x4 blocks (all sixteen pixels identical) are packed into 3
    /// bytes instead of 14, so large uniform areas compress further.
    B44A,

    /// Lossy DCT based compression, in blocks of 32 scanlines.
    /// More efficient for partial buffer access than `DWAB`.
    /// The optional quality level controls the DCT quantization error target;
    /// `None` uses the reference default.
    DWAA(Option<f32>),

    /// Lossy DCT based compression, in blocks of 256 scanlines.
    /// More space-efficient and faster to decode full frames than `DWAA`.
    DWAB,

    /// Wraps a JPEG 2000 (HTJ2K) codestream as the chunk payload, for RGB(A)
    /// half/float data. Not part of the original OpenEXR codec family.
    HTJ2K,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Uncompressed => "no",
            Compression::RLE => "rle",
            Compression::ZIP1 => "zip line",
            Compression::ZIP16 => "zip block",
            Compression::B44 => "b44",
            Compression::B44A => "b44a",
            Compression::DWAA(_) => "dwaa",
            Compression::DWAB => "dwab",
            Compression::PIZ => "piz",
            Compression::PXR24 => "pxr24",
            Compression::HTJ2K => "htj2k",
        })
    }
}

impl Compression {

    /// Compress a rectangle's worth of channel-interleaved, native-endian pixel bytes.
    pub fn compress(self, channels: &ChannelList, uncompressed: ByteVec, rectangle: IntegerBounds) -> Result<ByteVec> {
        rectangle.validate()?;

        use self::Compression::*;
        let compressed = match self {
            Uncompressed => Ok(uncompressed.clone()),
            ZIP16 | ZIP1 => zip::compress_bytes(&uncompressed),
            RLE => rle::compress_bytes(channels, uncompressed.clone(), rectangle),
            PIZ => piz::compress(channels, &uncompressed, rectangle),
            PXR24 => pxr24::compress(channels, &uncompressed, rectangle),
            B44 => b44::compress(channels, &uncompressed, rectangle, false),
            B44A => b44::compress(channels, &uncompressed, rectangle, true),
            DWAA(quality) => dwa::compress(
                channels, uncompressed.clone(), rectangle,
                self.scan_lines_per_block(), quality.unwrap_or(DEFAULT_DWA_COMPRESSION_LEVEL),
            ),
            DWAB => dwa::compress(
                channels, uncompressed.clone(), rectangle,
                self.scan_lines_per_block(), DEFAULT_DWA_COMPRESSION_LEVEL,
            ),
            HTJ2K => htj2k::compress(channels, &uncompressed, rectangle),
        }?;

        if compressed.len() < uncompressed.len() {
            Ok(compressed)
        }
        else {
            // storing verbatim is cheaper than a compressed representation that did not shrink
            Ok(uncompressed)
        }
    }

    /// Decompress a rectangle's worth of compressed chunk bytes back to channel-interleaved,
    /// native-endian pixel bytes.
    pub fn decompress(self, channels: &ChannelList, compressed: ByteVec, rectangle: IntegerBounds, expected_byte_size: usize, pedantic: bool) -> Result<ByteVec> {
        rectangle.validate()?;

        if compressed.len() == expected_byte_size {
            // the "compressed" data was stored verbatim, because it didn't shrink
            return Ok(compressed);
        }

        use self::Compression::*;
        let bytes = match self {
            Uncompressed => Ok(compressed),
            ZIP16 | ZIP1 => zip::decompress_bytes(&compressed, expected_byte_size),
            RLE => rle::decompress_bytes(channels, compressed, rectangle, expected_byte_size, pedantic),
            PIZ => piz::decompress(channels, compressed, rectangle, expected_byte_size, pedantic),
            PXR24 => pxr24::decompress(channels, &compressed, rectangle, expected_byte_size),
            B44 | B44A => b44::decompress(channels, &compressed, rectangle, expected_byte_size, pedantic),
            DWAA(_) => dwa::decompress(channels, compressed, rectangle, expected_byte_size, pedantic, self.scan_lines_per_block()),
            DWAB => dwa::decompress(channels, compressed, rectangle, expected_byte_size, pedantic, self.scan_lines_per_block()),
            HTJ2K => htj2k::decompress(channels, &compressed, rectangle, expected_byte_size),
        }?;

        if bytes.len() != expected_byte_size {
            Err(Error::corrupted("decompressed data length does not match the expected byte size"))
        }
        else {
            Ok(bytes)
        }
    }

    /// For scan line images, one or more scan lines may be
    /// stored together as a scan line block. The number of scan lines per block
    /// depends on which compression method is used.
    pub fn scan_lines_per_block(self) -> usize {
        use self::Compression::*;
        match self {
            Uncompressed | RLE   | ZIP1          => 1,
            ZIP16 | PXR24                        => 16,
            PIZ   | B44   | B44A | DWAA(_) | HTJ2K => 32,
            DWAB                                 => 256,
        }
    }

    /// Most compression methods will reconstruct the exact pixel bytes,
    /// but some might throw away unimportant data for specific types of samples.
    pub fn is_lossless_for(self, sample_type: SampleType) -> bool {
        use self::Compression::*;
        match self {
            PXR24 => sample_type != SampleType::F32, // pxr reduces f32 to f24
            B44 | B44A => sample_type != SampleType::F16, // b44 only compresses f16 values, others are left uncompressed
            Uncompressed | RLE | ZIP1 | ZIP16 | PIZ | HTJ2K => true,
            DWAB | DWAA(_) => false,
        }
    }

    /// Most compression methods will reconstruct the exact pixel bytes,
    /// but some might throw away unimportant data in some cases.
    pub fn may_lose_data(self) -> bool {
        use self::Compression::*;
        match self {
            Uncompressed | RLE | ZIP1 | ZIP16 | PIZ | HTJ2K => false,
            PXR24 | B44 | B44A | DWAB | DWAA(_) => true,
        }
    }

    /// Most compression methods will reconstruct the exact pixel bytes,
    /// but some might replace NaN with zeroes.
    pub fn supports_nan(self) -> bool {
        use self::Compression::*;
        match self {
            B44 | B44A | DWAB | DWAA(_) => false,
            _ => true
        }
    }

}

/// Converts a buffer of native-endian sample bytes to little-endian, as
/// required by codecs (DWA) whose compressed representation is defined in
/// terms of little-endian sample values regardless of host endianness.
///
/// Every codec in this crate reads and writes individual samples through
/// `crate::io::Data`/`lebe`, which already perform the per-sample byte swap
/// on big-endian hosts, so at this whole-buffer level there is nothing left
/// to convert; the hook exists so call sites can remain endian-aware without
/// duplicating that per-sample logic.
pub(crate) fn convert_current_to_little_endian(bytes: ByteVec, _channels: &ChannelList, _rectangle: IntegerBounds) -> Result<ByteVec> {
    Ok(bytes)
}

/// The inverse of [`convert_current_to_little_endian`].
pub(crate) fn convert_little_endian_to_current(bytes: ByteVec, _channels: &ChannelList, _rectangle: IntegerBounds) -> Result<ByteVec> {
    Ok(bytes)
}

fn div_p (x: i32, y: i32) -> i32 {
    if x >= 0 {
        if y >= 0 { x  / y }
        else { -(x  / -y) }
    }
    else {
        if y >= 0 { -((y-1-x) / y) }
        else { (-y-1-x) / -y }
    }
}

fn mod_p(x: i32, y: i32) -> i32 {
    x - y * div_p(x, y)
}

/// A collection of functions used to prepare data for compression.
mod optimize_bytes {

    /// Integrate over all differences to the previous value in order to reconstruct sample values.
    pub fn differences_to_samples(buffer: &mut [u8]){
        for index in 1..buffer.len() {
            buffer[index] = (buffer[index - 1] as i32 + buffer[index] as i32 - 128) as u8; // index unsafe but handled with care and unit-tested
        }
    }

    /// Derive over all values in order to produce differences to the previous value.
    pub fn samples_to_differences(buffer: &mut [u8]){
        for index in (1..buffer.len()).rev() {
            buffer[index] = (buffer[index] as i32 - buffer[index - 1] as i32 + 128) as u8; // index unsafe but handled with care and unit-tested
        }
    }

    /// Interleave the bytes such that the second half of the array is each other byte.
    pub fn interleave_byte_blocks(separated: &mut [u8]) {
        let mut interleaved = Vec::with_capacity(separated.len());
        let (first_half, second_half) = separated
            .split_at((separated.len() + 1) / 2);

        let mut second_half_index = 0;
        let mut first_half_index = 0;

        loop {
            if interleaved.len() < separated.len() {
                interleaved.push(first_half[first_half_index]);
                first_half_index += 1;
            } else { break; }

            if interleaved.len() < separated.len() {
                interleaved.push(second_half[second_half_index]);
                second_half_index += 1;
            } else { break; }
        }

        separated.copy_from_slice(interleaved.as_slice())
    }

    /// Separate the bytes such that the second half contains each other byte.
    pub fn separate_bytes_fragments(source: &mut [u8]) {
        let mut first_half = Vec::with_capacity(source.len() / 2);
        let mut second_half = Vec::with_capacity(source.len() / 2);
        let mut interleaved_index = 0;

        loop {
            if interleaved_index < source.len() {
                first_half.push(source[interleaved_index]);
                interleaved_index += 1;

            } else { break; }

            if interleaved_index < source.len() {
                second_half.push(source[interleaved_index]);
                interleaved_index += 1;

            } else { break; }
        }

        let mut result = first_half;
        result.append(&mut second_half);
        source.copy_from_slice(result.as_slice());
    }


    #[cfg(test)]
    pub mod test {

        #[test]
        fn roundtrip_interleave(){
            let source = vec![ 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10 ];
            let mut modified = source.clone();

            super::separate_bytes_fragments(&mut modified);
            super::interleave_byte_blocks(&mut modified);

            assert_eq!(source, modified);
        }

        #[test]
        fn separate_then_interleave_matches_known_pattern(){
            let mut planes = vec![0x10, 0x11, 0x20, 0x21, 0x30, 0x31];
            super::separate_bytes_fragments(&mut planes);
            assert_eq!(planes, vec![0x10, 0x20, 0x30, 0x11, 0x21, 0x31]);

            super::interleave_byte_blocks(&mut planes);
            assert_eq!(planes, vec![0x10, 0x11, 0x20, 0x21, 0x30, 0x31]);
        }

        #[test]
        fn roundtrip_derive(){
            let source = vec![ 0, 1, 2, 7, 4, 5, 6, 7, 13, 9, 10 ];
            let mut modified = source.clone();

            super::samples_to_differences(&mut modified);

            super::differences_to_samples(&mut modified);

            assert_eq!(source, modified);
        }
    }
}

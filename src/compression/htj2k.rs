
//! Wraps a JPEG 2000 (high-throughput) codestream as a chunk payload. This
//! is not one of the original OpenEXR compression methods; it exists so
//! that RGB(A) half/float data can be handed to an external, highly
//! optimized JPEG 2000 implementation instead of this crate's own DCT or
//! wavelet codecs.
//!
//! Everything in this file except the `codestream` submodule is plain,
//! safe framing logic: a small header identifies which J2K component maps
//! to which EXR channel, and reorders RGB channels so that the encoder
//! sees them contiguously (required for the reversible color transform).
//! The codestream itself is produced and consumed by an external JPEG 2000
//! library, which is the one place in this crate allowed to call into
//! unsafe C-style bindings.

use crate::compression::{ByteVec, Bytes};
use crate::error::{Error, Result};
use crate::meta::{ChannelList, IntegerBounds, SampleType};

const MAGIC: u16 = 0x4854; // "HT"

/// Finds the index of the one channel among `channels` whose name ends with
/// any of `suffixes` (case-insensitive), ignoring a leading `.` layer
/// separator if present.
fn find_by_suffix(channels: &ChannelList, suffixes: &[&str]) -> Option<usize> {
    channels.list.iter().position(|channel| {
        let name = channel.name.to_string();
        let local = name.rsplit('.').next().unwrap_or(&name).to_ascii_lowercase();
        suffixes.iter().any(|suffix| local == *suffix)
    })
}

/// Component order to use on the wire: identity, unless the channel list
/// contains a named, identically-typed and identically-sampled RGB triplet,
/// in which case R, G, B are moved to the front (then alpha, then the rest)
/// so the encoder can apply its reversible color transform across them.
fn component_order(channels: &ChannelList) -> Vec<usize> {
    let r = find_by_suffix(channels, &["r", "red"]);
    let g = find_by_suffix(channels, &["g", "green"]);
    let b = find_by_suffix(channels, &["b", "blue"]);

    let rgb = match (r, g, b) {
        (Some(r), Some(g), Some(b)) => {
            let (cr, cg, cb) = (&channels.list[r], &channels.list[g], &channels.list[b]);
            let matches = cr.sample_type == cg.sample_type && cg.sample_type == cb.sample_type
                && cr.sampling == cg.sampling && cg.sampling == cb.sampling;

            if matches { Some((r, g, b)) } else { None }
        }
        _ => None,
    };

    let mut order = Vec::with_capacity(channels.list.len());

    if let Some((r, g, b)) = rgb {
        order.push(r);
        order.push(g);
        order.push(b);

        if let Some(a) = find_by_suffix(channels, &["a", "alpha"]) {
            order.push(a);
        }

        for index in 0 .. channels.list.len() {
            if index != r && index != g && index != b && Some(index) != find_by_suffix(channels, &["a", "alpha"]) {
                order.push(index);
            }
        }
    }
    else {
        order.extend(0 .. channels.list.len());
    }

    order
}

fn write_header(order: &[usize], payload_len: usize) -> Result<ByteVec> {
    let mut header = Vec::with_capacity(8 + order.len() * 2);
    header.extend_from_slice(&MAGIC.to_be_bytes());

    let payload_len = u32::try_from(payload_len).map_err(|_| Error::overflow("htj2k payload too large"))?;
    header.extend_from_slice(&payload_len.to_be_bytes());

    let channel_count = u16::try_from(order.len()).map_err(|_| Error::overflow("too many channels for htj2k"))?;
    header.extend_from_slice(&channel_count.to_be_bytes());

    for &exr_channel_index in order {
        let entry = u16::try_from(exr_channel_index).map_err(|_| Error::overflow("channel index too large for htj2k"))?;
        header.extend_from_slice(&entry.to_be_bytes());
    }

    Ok(header)
}

struct Header {
    payload_len: usize,
    component_to_channel: Vec<usize>,
}

fn read_header(bytes: Bytes<'_>) -> Result<(Header, usize)> {
    if bytes.len() < 8 { return Err(Error::corrupted("htj2k chunk is smaller than its header")); }

    let magic = u16::from_be_bytes([bytes[0], bytes[1]]);
    if magic != MAGIC { return Err(Error::corrupted("htj2k chunk has an invalid magic number")); }

    let payload_len = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;
    let channel_count = u16::from_be_bytes([bytes[6], bytes[7]]) as usize;

    let map_bytes = 2 * channel_count;
    let map_start = 8;
    let map_end = map_start + map_bytes;

    if bytes.len() < map_end {
        return Err(Error::corrupted("htj2k channel map is truncated"));
    }

    let mut component_to_channel = Vec::with_capacity(channel_count);
    for entry in bytes[map_start .. map_end].chunks_exact(2) {
        component_to_channel.push(u16::from_be_bytes([entry[0], entry[1]]) as usize);
    }

    Ok((Header { payload_len, component_to_channel }, map_end))
}

/// Splits channel-interleaved, native-endian pixel bytes into one plane of
/// 32-bit signed samples per channel, in the given component order.
fn planes_from_interleaved(channels: &ChannelList, bytes: Bytes<'_>, rectangle: IntegerBounds, order: &[usize]) -> Result<Vec<Vec<i32>>> {
    let pixel_count = rectangle.size.area();
    let mut planes: Vec<Vec<i32>> = order.iter().map(|_| Vec::with_capacity(pixel_count)).collect();

    let mut cursor = 0;
    for _pixel in 0 .. pixel_count {
        for (component, &channel_index) in order.iter().enumerate() {
            let channel = &channels.list[channel_index];
            let sample_start: usize = channels.list[.. channel_index].iter().map(|c| c.sample_type.bytes_per_sample()).sum();
            let offset = cursor + sample_start;

            let value = match channel.sample_type {
                SampleType::U32 => i32::from_le_bytes(bytes[offset .. offset + 4].try_into().unwrap()),
                SampleType::F16 => u16::from_le_bytes(bytes[offset .. offset + 2].try_into().unwrap()) as i32,
                SampleType::F32 => return Err(Error::unsupported("htj2k does not support f32 channels")),
            };

            planes[component].push(value);
        }

        cursor += channels.bytes_per_pixel;
    }

    Ok(planes)
}

fn interleaved_from_planes(channels: &ChannelList, planes: &[Vec<i32>], rectangle: IntegerBounds, order: &[usize]) -> Result<ByteVec> {
    let pixel_count = rectangle.size.area();
    let mut bytes = vec![0_u8; channels.bytes_per_pixel * pixel_count];

    for pixel in 0 .. pixel_count {
        for (component, &channel_index) in order.iter().enumerate() {
            let channel = &channels.list[channel_index];
            let sample_start: usize = channels.list[.. channel_index].iter().map(|c| c.sample_type.bytes_per_sample()).sum();
            let offset = pixel * channels.bytes_per_pixel + sample_start;
            let value = planes[component][pixel];

            match channel.sample_type {
                SampleType::U32 => bytes[offset .. offset + 4].copy_from_slice(&(value as u32).to_le_bytes()),
                SampleType::F16 => bytes[offset .. offset + 2].copy_from_slice(&(value as u16).to_le_bytes()),
                SampleType::F32 => return Err(Error::unsupported("htj2k does not support f32 channels")),
            }
        }
    }

    Ok(bytes)
}

pub fn compress(channels: &ChannelList, uncompressed: Bytes<'_>, rectangle: IntegerBounds) -> Result<ByteVec> {
    if channels.list.iter().any(|channel| channel.sample_type == SampleType::F32) {
        return Err(Error::unsupported("htj2k does not support f32 channels"));
    }

    let order = component_order(channels);
    let planes = planes_from_interleaved(channels, uncompressed, rectangle, &order)?;

    let precisions: Vec<u8> = order.iter()
        .map(|&index| match channels.list[index].sample_type {
            SampleType::U32 => 32,
            SampleType::F16 => 16,
            SampleType::F32 => unreachable!("f32 rejected above"),
        })
        .collect();

    let payload = codestream::encode(&planes, rectangle.size.0, rectangle.size.1, &precisions, order.len() >= 3)?;

    let mut result = write_header(&order, payload.len())?;
    result.extend_from_slice(&payload);
    Ok(result)
}

pub fn decompress(channels: &ChannelList, compressed: Bytes<'_>, rectangle: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec> {
    let (header, payload_start) = read_header(compressed)?;
    let payload = compressed.get(payload_start .. payload_start + header.payload_len)
        .ok_or_else(|| Error::corrupted("htj2k payload shorter than its declared length"))?;

    let order = &header.component_to_channel;

    let precisions: Vec<u8> = order.iter()
        .map(|&index| channels.list.get(index).map(|c| match c.sample_type {
            SampleType::U32 => 32,
            SampleType::F16 => 16,
            SampleType::F32 => 0,
        }).unwrap_or(0))
        .collect();

    if precisions.iter().any(|&bits| bits == 0) {
        return Err(Error::corrupted("htj2k channel map refers to an unsupported or missing channel"));
    }

    let planes = codestream::decode(payload, rectangle.size.0, rectangle.size.1, &precisions)?;
    let bytes = interleaved_from_planes(channels, &planes, rectangle, order)?;

    if bytes.len() != expected_byte_size {
        return Err(Error::corrupted("htj2k decoded size does not match the expected byte size"));
    }

    Ok(bytes)
}

/// The one place in this crate allowed to call into unsafe, C-ABI bindings:
/// encoding and decoding the actual JPEG 2000 codestream, delegated to the
/// `openjp2` port of the reference OpenJPEG library. Everything above this
/// module is plain safe Rust; this boundary only ever sees whole planes of
/// already-demultiplexed integer samples and a raw byte codestream.
mod codestream {
    #![allow(unsafe_code)]

    use crate::error::{Error, Result};
    use openjp2::openjpeg::*;

    /// Number of wavelet resolution levels requested from the encoder,
    /// matching the reference HTJ2K encoder's default.
    const RESOLUTION_LEVELS: i32 = 6;

    /// Code-block size (width and height) used for the high-throughput block
    /// coder, matching the reference HTJ2K encoder's default.
    const BLOCK_SIZE: i32 = 64;

    pub fn encode(planes: &[Vec<i32>], width: usize, height: usize, precisions: &[u8], use_mct: bool) -> Result<Vec<u8>> {
        unsafe {
            let mut component_params: Vec<opj_image_cmptparm_t> = precisions.iter().map(|&bits| opj_image_cmptparm_t {
                dx: 1, dy: 1,
                w: width as u32, h: height as u32,
                x0: 0, y0: 0,
                prec: bits as u32,
                bpp: bits as u32,
                sgnd: 0,
            }).collect();

            let color_space = if use_mct { OPJ_CLRSPC_SRGB } else { OPJ_CLRSPC_GRAY };
            let image = opj_image_create(component_params.len() as u32, component_params.as_mut_ptr(), color_space);
            if image.is_null() { return Err(Error::external_codec("openjp2 failed to allocate an image")); }

            for (component_index, plane) in planes.iter().enumerate() {
                let component = &mut *(*image).comps.add(component_index);
                std::ptr::copy_nonoverlapping(plane.as_ptr(), component.data, plane.len());
            }

            let mut parameters: opj_cparameters_t = std::mem::zeroed();
            opj_set_default_encoder_parameters(&mut parameters);
            parameters.irreversible = 0; // lossless
            parameters.numresolution = RESOLUTION_LEVELS;
            parameters.cblockw_init = BLOCK_SIZE;
            parameters.cblockh_init = BLOCK_SIZE;
            if use_mct { parameters.tcp_mct = 1; }

            let encoder = opj_create_compress(OPJ_CODEC_J2K);
            if encoder.is_null() {
                opj_image_destroy(image);
                return Err(Error::external_codec("openjp2 failed to create an encoder"));
            }

            opj_setup_encoder(encoder, &mut parameters, image);

            let mut out_buffer: Vec<u8> = Vec::new();
            let stream = memory_stream::create_write_stream(&mut out_buffer);

            let ok = opj_start_compress(encoder, image, stream) != 0
                && opj_encode(encoder, stream) != 0
                && opj_end_compress(encoder, stream) != 0;

            opj_stream_destroy(stream);
            opj_destroy_codec(encoder);
            opj_image_destroy(image);

            if !ok { return Err(Error::external_codec("openjp2 failed to encode the codestream")); }
            Ok(out_buffer)
        }
    }

    pub fn decode(payload: &[u8], width: usize, height: usize, precisions: &[u8]) -> Result<Vec<Vec<i32>>> {
        unsafe {
            let mut parameters: opj_dparameters_t = std::mem::zeroed();
            opj_set_default_decoder_parameters(&mut parameters);

            let decoder = opj_create_decompress(OPJ_CODEC_J2K);
            if decoder.is_null() { return Err(Error::external_codec("openjp2 failed to create a decoder")); }

            opj_setup_decoder(decoder, &mut parameters);

            let stream = memory_stream::create_read_stream(payload);
            let mut image: *mut opj_image_t = std::ptr::null_mut();

            let ok = opj_read_header(stream, decoder, &mut image) != 0
                && opj_decode(decoder, stream, image) != 0
                && opj_end_decompress(decoder, stream) != 0;

            opj_stream_destroy(stream);
            opj_destroy_codec(decoder);

            if !ok || image.is_null() {
                if !image.is_null() { opj_image_destroy(image); }
                return Err(Error::external_codec("openjp2 failed to decode the codestream"));
            }

            let pixel_count = width * height;
            let mut planes = Vec::with_capacity(precisions.len());

            for component_index in 0 .. precisions.len() {
                let component = &*(*image).comps.add(component_index);
                let slice = std::slice::from_raw_parts(component.data, pixel_count);
                planes.push(slice.to_vec());
            }

            opj_image_destroy(image);
            Ok(planes)
        }
    }

    /// Minimal in-memory `opj_stream_t` backed by a growable buffer (for
    /// encoding) or a borrowed slice (for decoding), since the reference
    /// library only streams through user-supplied read/write/skip/seek
    /// callbacks rather than accepting a buffer directly.
    mod memory_stream {
        use super::*;
        use std::os::raw::c_void;

        struct WriteState { buffer: *mut Vec<u8> }
        struct ReadState<'d> { data: &'d [u8], position: usize }

        extern "C" fn write_callback(buffer: *mut std::os::raw::c_char, size: usize, user_data: *mut c_void) -> usize {
            unsafe {
                let state = &mut *(user_data as *mut WriteState);
                let slice = std::slice::from_raw_parts(buffer as *const u8, size);
                (*state.buffer).extend_from_slice(slice);
                size
            }
        }

        extern "C" fn read_callback(buffer: *mut std::os::raw::c_char, size: usize, user_data: *mut c_void) -> usize {
            unsafe {
                let state = &mut *(user_data as *mut ReadState);
                let remaining = state.data.len() - state.position;
                let count = remaining.min(size);
                if count == 0 { return usize::MAX; } // OpenJPEG's end-of-stream sentinel

                std::ptr::copy_nonoverlapping(state.data[state.position ..].as_ptr(), buffer as *mut u8, count);
                state.position += count;
                count
            }
        }

        extern "C" fn skip_callback(count: i64, user_data: *mut c_void) -> i64 {
            unsafe {
                let state = &mut *(user_data as *mut ReadState);
                state.position = (state.position + count as usize).min(state.data.len());
                count
            }
        }

        extern "C" fn seek_callback(count: i64, user_data: *mut c_void) -> i32 {
            unsafe {
                let state = &mut *(user_data as *mut ReadState);
                state.position = (count as usize).min(state.data.len());
                1
            }
        }

        pub fn create_write_stream(buffer: &mut Vec<u8>) -> *mut opj_stream_t {
            unsafe {
                let stream = opj_stream_create(4096, 0);
                let state = Box::new(WriteState { buffer });
                opj_stream_set_user_data(stream, Box::into_raw(state) as *mut c_void, Some(destroy_write_state));
                opj_stream_set_write_function(stream, Some(write_callback));
                stream
            }
        }

        pub fn create_read_stream(data: &[u8]) -> *mut opj_stream_t {
            unsafe {
                let stream = opj_stream_create(4096, 1);
                let state = Box::new(ReadState { data, position: 0 });
                opj_stream_set_user_data_length(stream, data.len() as u64);
                opj_stream_set_user_data(stream, Box::into_raw(state) as *mut c_void, Some(destroy_read_state));
                opj_stream_set_read_function(stream, Some(read_callback));
                opj_stream_set_skip_function(stream, Some(skip_callback));
                opj_stream_set_seek_function(stream, Some(seek_callback));
                stream
            }
        }

        extern "C" fn destroy_write_state(user_data: *mut c_void) {
            unsafe { drop(Box::from_raw(user_data as *mut WriteState)); }
        }

        extern "C" fn destroy_read_state(user_data: *mut c_void) {
            unsafe { drop(Box::from_raw(user_data as *mut ReadState)); }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::{ChannelDescription, SampleType};
    use crate::math::Vec2;

    fn channel(name: &str, sample_type: SampleType) -> ChannelDescription {
        ChannelDescription {
            name: crate::meta::Text::new_or_panic(name),
            sample_type,
            quantize_linearly: false,
            sampling: Vec2(1, 1),
        }
    }

    #[test]
    fn detects_rgb_triplet_regardless_of_declaration_order() {
        let channels = ChannelList::new(smallvec![
            channel("B", SampleType::F16),
            channel("R", SampleType::F16),
            channel("G", SampleType::F16),
            channel("A", SampleType::F16),
        ]);

        let order = component_order(&channels);

        // R, G, B first (in that order), then A, matching their positions in `channels.list`.
        assert_eq!(order, vec![1, 2, 0, 3]);
    }

    #[test]
    fn falls_back_to_identity_order_without_a_full_rgb_triplet() {
        let channels = ChannelList::new(smallvec![
            channel("Y", SampleType::F16),
            channel("A", SampleType::F16),
        ]);

        assert_eq!(component_order(&channels), vec![0, 1]);
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let order = vec![2, 0, 1];
        let header = write_header(&order, 1234).unwrap();

        let (parsed, payload_start) = read_header(&header).unwrap();
        assert_eq!(parsed.payload_len, 1234);
        assert_eq!(parsed.component_to_channel, order);
        assert_eq!(payload_start, header.len());
    }
}

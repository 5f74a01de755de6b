use super::*;
use super::Error;
use super::Result;

// inspired by  https://github.com/openexr/openexr/blob/master/OpenEXR/IlmImf/ImfRle.cpp
//
// unlike the reference implementation, this omits the horizontal-difference
// predictor and byte-plane interleaving: those are separate, orthogonal
// preprocessing steps and not part of the run-length packet format itself.

const MIN_RUN_LENGTH : usize = 3;
const MAX_RUN_LENGTH : usize = 127;


pub fn decompress_bytes(
    _channels: &ChannelList,
    compressed: ByteVec,
    _rectangle: IntegerBounds,
    expected_byte_size: usize,
    pedantic: bool,
) -> Result<ByteVec> {
    let mut remaining = compressed.as_slice();
    let mut decompressed = Vec::with_capacity(expected_byte_size.min(8*2048));

    while !remaining.is_empty() && decompressed.len() != expected_byte_size {
        let count = take_1(&mut remaining)? as i8 as i32;

        if count >= 0 {
            // literal packet: the next 'count + 1' bytes are taken as-is
            let values = take_n(&mut remaining, count as usize + 1)?;
            decompressed.extend_from_slice(values);
        }
        else {
            // run packet: repeat the next value '-count + 1' times
            let value = take_1(&mut remaining)?;
            decompressed.resize(decompressed.len() + (-count) as usize + 1, value);
        }
    }

    if pedantic && (!remaining.is_empty() || decompressed.len() != expected_byte_size) {
        return Err(Error::corrupted("rle stream did not produce exactly the expected number of bytes"));
    }

    Ok(decompressed)
}

pub fn compress_bytes(_channels: &ChannelList, uncompressed: ByteVec, _rectangle: IntegerBounds) -> Result<ByteVec> {
    let data = uncompressed;
    let mut compressed = Vec::with_capacity(data.len());
    let mut run_start = 0;
    let mut run_end = 1;

    while run_start < data.len() {
        while
            run_end < data.len()
                && data[run_start] == data[run_end]
                && (run_end - run_start) as i32 - 1 < MAX_RUN_LENGTH as i32
            {
                run_end += 1;
            }

        if run_end - run_start >= MIN_RUN_LENGTH {
            // run packet: negative count, repeats the value (-count + 1) times
            compressed.push((-(((run_end - run_start) as i32) - 1)) as u8);
            compressed.push(data[run_start]);
            run_start = run_end;

        } else {
            while
                run_end < data.len() && (
                    (run_end + 1 >= data.len() || data[run_end] != data[run_end + 1])
                        || (run_end + 2 >= data.len() || data[run_end + 1] != data[run_end + 2])
                ) && run_end - run_start < MAX_RUN_LENGTH
                {
                    run_end += 1;
                }

            // literal packet: non-negative count, copies (count + 1) bytes verbatim
            compressed.push((run_end as i32 - run_start as i32 - 1) as u8);
            compressed.extend_from_slice(&data[run_start .. run_end]);

            run_start = run_end;
            run_end += 1;
        }
    }

    Ok(compressed)
}

fn take_1(slice: &mut &[u8]) -> Result<u8> {
    if !slice.is_empty() {
        let result = slice[0];
        *slice = &slice[1..];
        Ok(result)

    } else {
        Err(Error::invalid("compressed data"))
    }
}

fn take_n<'s>(slice: &mut &'s [u8], n: usize) -> Result<&'s [u8]> {
    if n <= slice.len() {
        let (front, back) = slice.split_at(n);
        *slice = back;
        Ok(front)

    } else {
        Err(Error::invalid("compressed data"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::ChannelList;
    use crate::math::Vec2;
    use smallvec::smallvec;

    fn dummy_channels_and_rectangle() -> (ChannelList, IntegerBounds) {
        (ChannelList::new(smallvec![]), IntegerBounds { position: Vec2(0, 0), size: Vec2(1, 1) })
    }

    #[test]
    fn run_packet_matches_reference_example() {
        let (channels, rectangle) = dummy_channels_and_rectangle();
        let source: ByteVec = vec![0x2A; 5];

        let compressed = compress_bytes(&channels, source.clone(), rectangle).unwrap();
        assert_eq!(compressed, vec![0xFC, 0x2A]);

        let decompressed = decompress_bytes(&channels, compressed, rectangle, source.len(), true).unwrap();
        assert_eq!(decompressed, source);
    }

    #[test]
    fn literal_packet_matches_reference_example() {
        let (channels, rectangle) = dummy_channels_and_rectangle();
        let source: ByteVec = vec![0x01, 0x02, 0x03, 0x04];

        let compressed = compress_bytes(&channels, source.clone(), rectangle).unwrap();
        assert_eq!(compressed, vec![0x03, 0x01, 0x02, 0x03, 0x04]);

        let decompressed = decompress_bytes(&channels, compressed, rectangle, source.len(), true).unwrap();
        assert_eq!(decompressed, source);
    }

    #[test]
    fn roundtrip_mixed_runs_and_literals() {
        let (channels, rectangle) = dummy_channels_and_rectangle();
        let source: ByteVec = (0..=255u8).cycle().take(2000)
            .flat_map(|b| std::iter::repeat(b).take(if b % 7 == 0 { 6 } else { 1 }))
            .collect();

        let compressed = compress_bytes(&channels, source.clone(), rectangle).unwrap();
        let decompressed = decompress_bytes(&channels, compressed, rectangle, source.len(), true).unwrap();
        assert_eq!(decompressed, source);
    }
}

//! Canonical Huffman coding over 16-bit symbols, used to pack the
//! wavelet-transformed samples of the PIZ codec into their final byte
//! stream.
//!
//! Code *lengths* are chosen with a standard priority-queue Huffman build
//! and then turned into a canonical code assignment (shorter codes sort
//! numerically higher, same-length codes sort by symbol value). Because the
//! assignment is canonical, only the lengths need to be transmitted: the
//! decoder rebuilds the exact same codes from them.
//! Based on the construction in `ImfHuf.cpp`, but table transmission and bit
//! packing are this crate's own, simpler scheme rather than a byte-for-byte
//! port.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashMap;

use crate::error::{Error, Result};

const ENCODE_BITS: usize = 16;
const SYMBOL_COUNT: usize = 1 << ENCODE_BITS;

/// Longest code this implementation will ever produce; lengths fit in 6 bits,
/// leaving values 59..=63 free for the run-length escape in the table encoding.
const MAX_CODE_LENGTH: u8 = 58;
const ZERO_RUN_MARKER: u64 = 63;
const LENGTH_BITS: u32 = 6;
const RUN_BITS: u32 = 8;
const MAX_ZERO_RUN: usize = (1 << RUN_BITS) - 1;

struct BitWriter {
    bytes: Vec<u8>,
    accumulator: u64,
    bits_filled: u32,
}

impl BitWriter {
    fn new() -> Self { Self { bytes: Vec::new(), accumulator: 0, bits_filled: 0 } }

    fn write_bits(&mut self, count: u32, value: u64) {
        self.accumulator = (self.accumulator << count) | (value & ((1 << count) - 1));
        self.bits_filled += count;

        while self.bits_filled >= 8 {
            self.bits_filled -= 8;
            self.bytes.push((self.accumulator >> self.bits_filled) as u8);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bits_filled > 0 {
            let padding = 8 - self.bits_filled;
            self.accumulator <<= padding;
            self.bytes.push(self.accumulator as u8);
        }

        self.bytes
    }
}

struct BitReader<'b> {
    bytes: &'b [u8],
    byte_index: usize,
    accumulator: u64,
    bits_filled: u32,
}

impl<'b> BitReader<'b> {
    fn new(bytes: &'b [u8]) -> Self { Self { bytes, byte_index: 0, accumulator: 0, bits_filled: 0 } }

    /// Fills the accumulator with up to `count` unconsumed bits, stopping early
    /// if the stream runs out. Returns how many bits are actually available.
    fn ensure_bits(&mut self, count: u32) -> u32 {
        while self.bits_filled < count {
            match self.bytes.get(self.byte_index) {
                Some(&byte) => {
                    self.byte_index += 1;
                    self.accumulator = (self.accumulator << 8) | byte as u64;
                    self.bits_filled += 8;
                }

                None => break,
            }
        }

        self.bits_filled.min(count)
    }

    fn read_bits(&mut self, count: u32) -> Result<u64> {
        if self.ensure_bits(count) < count {
            return Err(Error::corrupted("huffman bitstream ends early"));
        }

        self.bits_filled -= count;
        Ok((self.accumulator >> self.bits_filled) & ((1 << count) - 1))
    }

    /// Looks at the next `count` bits without consuming them. If fewer than
    /// `count` bits remain, the missing low bits are zero-padded; the second
    /// return value is how many of the top bits are actually real stream bits.
    fn peek_bits(&mut self, count: u32) -> (u64, u32) {
        let available = self.ensure_bits(count);
        if available == 0 { return (0, 0); }

        let value = (self.accumulator >> (self.bits_filled - available)) & ((1 << available) - 1);
        (value << (count - available), available)
    }
}

enum Node {
    Leaf(u16),
    Branch(usize, usize),
}

/// Standard priority-queue Huffman build, producing a bit length per symbol
/// (0 for symbols that never occur). A lone surviving symbol still gets a
/// length of one, so it can be written as a single bit.
fn build_code_lengths(frequencies: &[u64]) -> Result<Vec<u8>> {
    debug_assert_eq!(frequencies.len(), SYMBOL_COUNT);

    let mut arena: Vec<Node> = Vec::new();
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::new();

    for (symbol, &freq) in frequencies.iter().enumerate() {
        if freq > 0 {
            let index = arena.len();
            arena.push(Node::Leaf(symbol as u16));
            heap.push(Reverse((freq, index)));
        }
    }

    let mut lengths = vec![0_u8; SYMBOL_COUNT];
    if heap.is_empty() {
        return Ok(lengths);
    }

    if heap.len() == 1 {
        let Reverse((_, only)) = heap.pop().unwrap();
        if let Node::Leaf(symbol) = arena[only] { lengths[symbol as usize] = 1; }
        return Ok(lengths);
    }

    while heap.len() > 1 {
        let Reverse((freq_a, a)) = heap.pop().unwrap();
        let Reverse((freq_b, b)) = heap.pop().unwrap();

        let combined = arena.len();
        arena.push(Node::Branch(a, b));
        heap.push(Reverse((freq_a + freq_b, combined)));
    }

    let Reverse((_, root)) = heap.pop().unwrap();
    let mut stack = vec![(root, 0_u32)];

    while let Some((index, depth)) = stack.pop() {
        match arena[index] {
            Node::Leaf(symbol) => {
                let length = depth.max(1);
                if length > MAX_CODE_LENGTH as u32 {
                    return Err(Error::overflow("huffman code length exceeds 58 bits"));
                }

                lengths[symbol as usize] = length as u8;
            }

            Node::Branch(zero, one) => {
                stack.push((zero, depth + 1));
                stack.push((one, depth + 1));
            }
        }
    }

    Ok(lengths)
}

/// Assigns canonical codes to a table of code lengths: shorter codes, filled
/// with zeroes on the right, are numerically higher than longer codes, and
/// codes of equal length increase with symbol value. Because the table can
/// be rebuilt from lengths alone, codes never need to be transmitted.
fn canonical_codes(lengths: &[u8]) -> Vec<u64> {
    let mut count_per_length = [0_u64; MAX_CODE_LENGTH as usize + 1];
    for &length in lengths {
        if length > 0 {
            count_per_length[length as usize] += 1;
        }
    }

    let mut first_code_of_length = [0_u64; MAX_CODE_LENGTH as usize + 2];
    let mut code = 0_u64;
    for length in (1 ..= MAX_CODE_LENGTH as usize).rev() {
        let next_code = (code + count_per_length[length]) >> 1;
        first_code_of_length[length] = code;
        code = next_code;
    }

    let mut next_code = first_code_of_length;
    lengths.iter().map(|&length| {
        if length == 0 { 0 }
        else {
            let assigned = next_code[length as usize];
            next_code[length as usize] += 1;
            assigned
        }
    }).collect()
}

fn write_code_lengths(writer: &mut BitWriter, lengths: &[u8]) {
    let mut index = 0;
    while index < lengths.len() {
        if lengths[index] == 0 {
            let mut run = 1;
            while index + run < lengths.len() && lengths[index + run] == 0 && run < MAX_ZERO_RUN {
                run += 1;
            }

            writer.write_bits(LENGTH_BITS, ZERO_RUN_MARKER);
            writer.write_bits(RUN_BITS, run as u64);
            index += run;
        }
        else {
            writer.write_bits(LENGTH_BITS, lengths[index] as u64);
            index += 1;
        }
    }
}

fn read_code_lengths(reader: &mut BitReader<'_>) -> Result<Vec<u8>> {
    let mut lengths = vec![0_u8; SYMBOL_COUNT];
    let mut index = 0;

    while index < SYMBOL_COUNT {
        let value = reader.read_bits(LENGTH_BITS)?;

        if value == ZERO_RUN_MARKER {
            let run = reader.read_bits(RUN_BITS)? as usize;
            if index + run > SYMBOL_COUNT {
                return Err(Error::corrupted("huffman code length table overruns symbol range"));
            }

            index += run;
        }
        else {
            if index >= SYMBOL_COUNT {
                return Err(Error::corrupted("huffman code length table overruns symbol range"));
            }

            lengths[index] = value as u8;
            index += 1;
        }
    }

    Ok(lengths)
}

/// Number of bits the fast-path lookup table indexes on directly.
const TABLE_BITS: u32 = 14;
const TABLE_SIZE: usize = 1 << TABLE_BITS;

/// Builds a direct-index table mapping the next `TABLE_BITS` bits of the
/// stream to the symbol and code length they decode to, for every code no
/// longer than `TABLE_BITS`. A code of length `l <= TABLE_BITS` occupies
/// `2^(TABLE_BITS - l)` slots, one for every possible suffix of the
/// remaining bits, since those bits belong to whatever symbol follows.
/// Codes longer than `TABLE_BITS` leave their slots `None`; those symbols
/// are decoded by walking the stream bit by bit instead.
fn build_lookup_table(lengths: &[u8], codes: &[u64]) -> Vec<Option<(u16, u8)>> {
    let mut table = vec![None; TABLE_SIZE];

    for (symbol, (&length, &code)) in lengths.iter().zip(codes.iter()).enumerate() {
        if length == 0 || length as u32 > TABLE_BITS { continue; }

        let shift = TABLE_BITS - length as u32;
        let base = (code as usize) << shift;
        for fill in 0 .. (1_usize << shift) {
            table[base + fill] = Some((symbol as u16, length));
        }
    }

    table
}

/// Decodes one symbol by reading single bits until the accumulated code
/// matches a known (length, code) pair. Used for codes longer than
/// `TABLE_BITS`, and as a fallback near the end of the stream where fewer
/// than `TABLE_BITS` bits remain to peek at.
fn decode_one_sequential(reader: &mut BitReader<'_>, symbol_of_code: &HashMap<(u8, u64), u16>) -> Result<u16> {
    let mut code = 0_u64;
    let mut length = 0_u32;

    while length < MAX_CODE_LENGTH as u32 {
        code = (code << 1) | reader.read_bits(1)?;
        length += 1;

        if let Some(&symbol) = symbol_of_code.get(&(length as u8, code)) {
            return Ok(symbol);
        }
    }

    Err(Error::corrupted("huffman code does not match any known symbol"))
}

pub fn compress(uncompressed: &[u16]) -> Result<Vec<u8>> {
    let mut frequencies = vec![0_u64; SYMBOL_COUNT];
    for &sample in uncompressed {
        frequencies[sample as usize] += 1;
    }

    let lengths = build_code_lengths(&frequencies)?;
    let codes = canonical_codes(&lengths);

    let mut table_writer = BitWriter::new();
    write_code_lengths(&mut table_writer, &lengths);
    let table_bytes = table_writer.finish();

    let mut data_writer = BitWriter::new();
    for &sample in uncompressed {
        let length = lengths[sample as usize];
        debug_assert!(length > 0, "symbol {} has a zero length code but occurred in the input", sample);
        data_writer.write_bits(length as u32, codes[sample as usize]);
    }

    let data_bytes = data_writer.finish();

    let mut result = Vec::with_capacity(4 + table_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(table_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&table_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

pub fn decompress(compressed: &[u8], expected_value_count: usize) -> Result<Vec<u16>> {
    if expected_value_count == 0 {
        return Ok(Vec::new());
    }

    if compressed.len() < 4 {
        return Err(Error::corrupted("huffman stream is missing its code length table header"));
    }

    let table_len = u32::from_le_bytes(compressed[0..4].try_into().unwrap()) as usize;
    let table_bytes = compressed.get(4 .. 4 + table_len)
        .ok_or_else(|| Error::corrupted("huffman code length table exceeds the available data"))?;
    let data_bytes = &compressed[4 + table_len ..];

    let mut table_reader = BitReader::new(table_bytes);
    let lengths = read_code_lengths(&mut table_reader)?;
    let codes = canonical_codes(&lengths);

    let mut symbol_of_code = HashMap::with_capacity(lengths.iter().filter(|&&l| l > 0).count());
    for (symbol, (&length, &code)) in lengths.iter().zip(codes.iter()).enumerate() {
        if length > 0 {
            symbol_of_code.insert((length, code), symbol as u16);
        }
    }

    let lookup_table = build_lookup_table(&lengths, &codes);

    let mut reader = BitReader::new(data_bytes);
    let mut decompressed = Vec::with_capacity(expected_value_count);

    for _ in 0 .. expected_value_count {
        let (peeked, available) = reader.peek_bits(TABLE_BITS);

        let symbol = if available == TABLE_BITS {
            match lookup_table[peeked as usize] {
                // fast path: the next `TABLE_BITS` bits contain a complete code
                Some((symbol, length)) => {
                    reader.read_bits(length as u32)?;
                    symbol
                }

                // code is longer than TABLE_BITS, fall back to the bit-by-bit walk
                None => decode_one_sequential(&mut reader, &symbol_of_code)?,
            }
        } else {
            // fewer than TABLE_BITS bits remain; the zero-padded peek can't be
            // trusted to land on a real table slot, so walk bit by bit
            decode_one_sequential(&mut reader, &symbol_of_code)?
        };

        decompressed.push(symbol);
    }

    Ok(decompressed)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_skewed_distribution() {
        let mut source = Vec::new();
        for _ in 0 .. 900 { source.push(7_u16); }
        for _ in 0 .. 90 { source.push(1200_u16); }
        for _ in 0 .. 9 { source.push(65000_u16); }
        source.push(3);

        let compressed = compress(&source).unwrap();
        let decompressed = decompress(&compressed, source.len()).unwrap();
        assert_eq!(source, decompressed);
    }

    #[test]
    fn roundtrip_single_distinct_symbol() {
        let source = vec![42_u16; 500];
        let compressed = compress(&source).unwrap();
        let decompressed = decompress(&compressed, source.len()).unwrap();
        assert_eq!(source, decompressed);
    }

    #[test]
    fn roundtrip_uniform_noise() {
        let source: Vec<u16> = (0 .. 4000_u32).map(|i| (i * 2654435761) as u16).collect();
        let compressed = compress(&source).unwrap();
        let decompressed = decompress(&compressed, source.len()).unwrap();
        assert_eq!(source, decompressed);
    }

    /// Fibonacci-weighted frequencies are the classic Huffman worst case: the
    /// tree degenerates into a near-linked-list, and code length grows by
    /// almost one bit per symbol added. With enough symbols this guarantees
    /// some codes longer than `TABLE_BITS`, so a roundtrip exercises both the
    /// lookup-table fast path (for the short, common codes) and the
    /// bit-by-bit fallback (for the long, rare ones) in the same decode.
    #[test]
    fn long_and_short_codes_decode_to_the_same_symbols() {
        let mut fib = vec![1_u64, 1_u64];
        while fib.len() < 24 {
            let n = fib.len();
            fib.push(fib[n - 1] + fib[n - 2]);
        }

        let mut frequencies = vec![0_u64; SYMBOL_COUNT];
        for (symbol, &count) in fib.iter().enumerate() {
            frequencies[symbol] = count;
        }
        frequencies[9000] = 100_000;

        let lengths = build_code_lengths(&frequencies).unwrap();
        assert!(
            lengths.iter().any(|&length| length as u32 > TABLE_BITS),
            "test fixture must produce at least one code longer than the lookup table reach"
        );
        assert!(
            lengths.iter().any(|&length| length > 0 && length as u32 <= TABLE_BITS),
            "test fixture must also produce at least one code the lookup table can serve"
        );

        let mut source = Vec::new();
        for (symbol, &count) in fib.iter().enumerate() {
            for _ in 0 .. count { source.push(symbol as u16); }
        }
        for _ in 0 .. 100_000 { source.push(9000_u16); }

        let compressed = compress(&source).unwrap();
        let decompressed = decompress(&compressed, source.len()).unwrap();
        assert_eq!(source, decompressed);
    }

    /// Directly checks that the lookup-table fast path and the sequential
    /// bit-by-bit path agree on every code the table covers, rather than
    /// relying solely on an end-to-end roundtrip to exercise both.
    #[test]
    fn lookup_table_agrees_with_sequential_decode() {
        let mut frequencies = vec![0_u64; SYMBOL_COUNT];
        for (symbol, weight) in [(10_u16, 500_u64), (200, 300), (3000, 100), (40000, 50), (7, 4), (8, 2), (9, 1)] {
            frequencies[symbol as usize] = weight;
        }

        let lengths = build_code_lengths(&frequencies).unwrap();
        let codes = canonical_codes(&lengths);
        let table = build_lookup_table(&lengths, &codes);

        let mut symbol_of_code = HashMap::new();
        for (symbol, (&length, &code)) in lengths.iter().zip(codes.iter()).enumerate() {
            if length > 0 {
                symbol_of_code.insert((length, code), symbol as u16);
            }
        }

        for (symbol, &length) in lengths.iter().enumerate() {
            if length == 0 || length as u32 > TABLE_BITS { continue; }

            let code = codes[symbol];
            let shift = TABLE_BITS - length as u32;
            let index = (code as usize) << shift;

            let mut writer = BitWriter::new();
            writer.write_bits(length as u32, code);
            let bytes = writer.finish();
            let mut reader = BitReader::new(&bytes);

            let sequential_symbol = decode_one_sequential(&mut reader, &symbol_of_code).unwrap();
            assert_eq!(table[index], Some((symbol as u16, length)));
            assert_eq!(sequential_symbol, symbol as u16);
        }
    }
}

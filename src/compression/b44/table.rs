//! Lazily-computed lookup tables that remap a half-float bit pattern to and
//! from an order-preserving integer key.
//!
//! B44 packing quantizes each 4x4 block's mantissa bits; reordering the
//! values first so that bit pattern order matches numeric order (the classic
//! "sortable float" trick: flip all bits of negative values, set the sign
//! bit of non-negative ones) spreads quantization error evenly across the
//! value's magnitude instead of across its raw bit pattern. The two tables
//! are exact inverses of one another.

use std::sync::OnceLock;

fn to_order_key(bits: u16) -> u16 {
    if bits & 0x8000 != 0 { !bits } else { bits | 0x8000 }
}

fn from_order_key(key: u16) -> u16 {
    if key & 0x8000 == 0 { !key } else { key & 0x7fff }
}

fn build_table(f: impl Fn(u16) -> u16) -> Box<[u16; 65536]> {
    let mut table = Box::new([0_u16; 65536]);
    for bits in 0 .. 65536_u32 {
        table[bits as usize] = f(bits as u16);
    }

    table
}

static EXP_TABLE: OnceLock<Box<[u16; 65536]>> = OnceLock::new();
static LOG_TABLE: OnceLock<Box<[u16; 65536]>> = OnceLock::new();

/// Maps a half-float bit pattern to its order-preserving key.
pub fn exp_table() -> &'static [u16; 65536] {
    EXP_TABLE.get_or_init(|| build_table(to_order_key))
}

/// Inverse of [`exp_table`].
pub fn log_table() -> &'static [u16; 65536] {
    LOG_TABLE.get_or_init(|| build_table(from_order_key))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tables_are_exact_inverses() {
        let exp = exp_table();
        let log = log_table();

        for bits in 0 .. 65536_u32 {
            assert_eq!(log[exp[bits as usize] as usize], bits as u16);
        }
    }
}

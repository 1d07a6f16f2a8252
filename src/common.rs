//! Bit- and byte-addressed helpers over raw block bytes.
//!
//! Bit positions are little-endian: bit `i` lives in byte `i / 8` at shift `i % 8`,
//! and multi-bit fields store their least significant bit first.

pub(crate) fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Reads `len` (at most 64) bits starting at bit `pos`.
pub(crate) fn get_bits(buf: &[u8], pos: usize, len: u32) -> u64 {
    debug_assert!(len <= 64);
    let mut value = 0u64;
    let mut done = 0u32;
    while done < len {
        let bit = pos + done as usize;
        let shift = (bit % 8) as u32;
        let take = (8 - shift).min(len - done);
        let chunk = (u64::from(buf[bit / 8]) >> shift) & low_mask(take);
        value |= chunk << done;
        done += take;
    }
    value
}

/// Writes the low `len` (at most 64) bits of `value` starting at bit `pos`.
pub(crate) fn set_bits(buf: &mut [u8], pos: usize, len: u32, value: u64) {
    debug_assert!(len <= 64);
    let mut done = 0u32;
    while done < len {
        let bit = pos + done as usize;
        let shift = (bit % 8) as u32;
        let take = (8 - shift).min(len - done);
        let mask = (low_mask(take) as u8) << shift;
        let chunk = (((value >> done) & low_mask(take)) as u8) << shift;
        let byte = &mut buf[bit / 8];
        *byte = (*byte & !mask) | chunk;
        done += take;
    }
}

/// Copies `len` bits from `src` (starting at `from`) into `dst` (starting at `to`).
pub(crate) fn copy_bits(src: &[u8], from: usize, dst: &mut [u8], to: usize, len: usize) {
    let mut done = 0;
    while done < len {
        let take = (len - done).min(64) as u32;
        let chunk = get_bits(src, from + done, take);
        set_bits(dst, to + done, take, chunk);
        done += take as usize;
    }
}

/// Counts set bits in `[from, from + len)`.
pub(crate) fn count_ones(buf: &[u8], from: usize, len: usize) -> usize {
    let mut done = 0;
    let mut ones = 0;
    while done < len {
        let take = (len - done).min(64) as u32;
        ones += get_bits(buf, from + done, take).count_ones() as usize;
        done += take as usize;
    }
    ones
}

pub(crate) fn bytes_for_bits(bits: usize) -> usize {
    bits.div_ceil(8)
}

pub(crate) fn read_u16(buf: &[u8], at: usize) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&buf[at..at + 2]);
    u16::from_le_bytes(raw)
}

pub(crate) fn write_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}

pub(crate) fn write_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}

pub(crate) fn write_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_bits_across_bytes() {
        let mut buf = [0u8; 4];
        set_bits(&mut buf, 5, 7, 0b101_1011);
        assert_eq!(get_bits(&buf, 5, 7), 0b101_1011);
        assert_eq!(get_bits(&buf, 0, 5), 0);
        assert_eq!(get_bits(&buf, 12, 20), 0);
    }

    #[test]
    fn test_full_width() {
        let mut buf = [0u8; 10];
        set_bits(&mut buf, 3, 64, u64::MAX - 7);
        assert_eq!(get_bits(&buf, 3, 64), u64::MAX - 7);
        assert_eq!(get_bits(&buf, 0, 3), 0);
    }

    #[test]
    fn test_count_ones() {
        let buf = [0b1010_1010u8, 0xff, 0x01];
        assert_eq!(count_ones(&buf, 0, 8), 4);
        assert_eq!(count_ones(&buf, 1, 16), 12);
        assert_eq!(count_ones(&buf, 0, 24), 13);
    }

    proptest! {
        #[test]
        fn test_copy_bits_matches_bitwise(
            src in proptest::collection::vec(any::<u8>(), 1..32),
            from in 0usize..64,
            to in 0usize..64,
            len in 0usize..128,
        ) {
            let total = src.len() * 8;
            prop_assume!(from + len <= total);
            let mut dst = std::vec![0u8; (to + len).div_ceil(8) + 1];
            copy_bits(&src, from, &mut dst, to, len);
            for i in 0..len {
                prop_assert_eq!(get_bits(&src, from + i, 1), get_bits(&dst, to + i, 1));
            }
        }
    }
}

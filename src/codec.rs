use crate::common::get_bits;
use crate::common::low_mask;
use crate::common::set_bits;
use crate::error::Error;
use crate::error::Result;

/// A pair of pure functions mapping integers to bit strings and back.
///
/// Codecs write into bit-addressed buffers and report the number of bits they
/// consumed, so encoded values can be laid end to end without padding.
pub trait Codec {
    /// Number of bits `encode` will produce for `value`.
    fn length(&self, value: u64) -> usize;

    /// Writes `value` at bit `pos` and returns the number of bits written.
    fn encode(&self, buf: &mut [u8], pos: usize, value: u64) -> usize;

    /// Reads one value at bit `pos`, returning it and the number of bits read.
    fn decode(&self, buf: &[u8], pos: usize) -> (u64, usize);
}

/// Fixed-width values, `bits` wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWidth(pub u8);

impl Codec for FixedWidth {
    fn length(&self, _value: u64) -> usize {
        usize::from(self.0)
    }

    fn encode(&self, buf: &mut [u8], pos: usize, value: u64) -> usize {
        set_bits(buf, pos, u32::from(self.0), value);
        usize::from(self.0)
    }

    fn decode(&self, buf: &[u8], pos: usize) -> (u64, usize) {
        (get_bits(buf, pos, u32::from(self.0)), usize::from(self.0))
    }
}

/// LEB128-style groups of seven bits, each followed by a continuation bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Varint;

impl Codec for Varint {
    fn length(&self, value: u64) -> usize {
        let significant = 64 - value.leading_zeros() as usize;
        8 * significant.div_ceil(7).max(1)
    }

    fn encode(&self, buf: &mut [u8], pos: usize, value: u64) -> usize {
        let mut rest = value;
        let mut at = pos;
        loop {
            let mut group = rest & 0x7f;
            rest >>= 7;
            if rest != 0 {
                group |= 0x80;
            }
            set_bits(buf, at, 8, group);
            at += 8;
            if rest == 0 {
                return at - pos;
            }
        }
    }

    fn decode(&self, buf: &[u8], pos: usize) -> (u64, usize) {
        let mut value = 0u64;
        let mut shift = 0u32;
        let mut at = pos;
        loop {
            let group = get_bits(buf, at, 8);
            at += 8;
            value |= (group & 0x7f).checked_shl(shift).unwrap_or(0);
            if group & 0x80 == 0 {
                return (value, at - pos);
            }
            shift += 7;
        }
    }
}

/// Elias-gamma code of `value + 1`, so that zero is representable.
///
/// `n` zero bits are followed by the `n + 1` significant bits of `value + 1`,
/// leading one first. The arithmetic is done in `u128` so `u64::MAX` encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EliasGamma;

impl EliasGamma {
    fn magnitude(value: u64) -> u32 {
        let shifted = u128::from(value) + 1;
        127 - shifted.leading_zeros()
    }
}

impl Codec for EliasGamma {
    fn length(&self, value: u64) -> usize {
        2 * Self::magnitude(value) as usize + 1
    }

    fn encode(&self, buf: &mut [u8], pos: usize, value: u64) -> usize {
        let n = Self::magnitude(value);
        let shifted = u128::from(value) + 1;
        let mut at = pos;
        let mut zeros = n;
        while zeros > 0 {
            let take = zeros.min(64);
            set_bits(buf, at, take, 0);
            at += take as usize;
            zeros -= take;
        }
        set_bits(buf, at, 1, 1);
        at += 1;
        let rest = (shifted & ((1u128 << n) - 1)) as u64;
        set_bits(buf, at, n, rest);
        at += n as usize;
        at - pos
    }

    fn decode(&self, buf: &[u8], pos: usize) -> (u64, usize) {
        let mut at = pos;
        let mut n = 0u32;
        while get_bits(buf, at, 1) == 0 {
            n += 1;
            at += 1;
        }
        at += 1;
        let rest = get_bits(buf, at, n);
        at += n as usize;
        let shifted = (1u128 << n) | u128::from(rest);
        ((shifted - 1) as u64, at - pos)
    }
}

/// The closed set of codecs a stream can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueCodec {
    /// Every value takes exactly this many bits (1..=64).
    Fixed(u8),
    Varint,
    EliasGamma,
}

impl ValueCodec {
    /// Largest value the codec can represent.
    pub fn max_value(&self) -> u64 {
        match self {
            ValueCodec::Fixed(bits) => low_mask(u32::from(*bits)),
            ValueCodec::Varint | ValueCodec::EliasGamma => u64::MAX,
        }
    }

    /// Fails with [`Error::ValueOutOfRange`] if `value` is not representable.
    pub fn check(&self, value: u64) -> Result<()> {
        match self {
            ValueCodec::Fixed(bits) if value > self.max_value() => Err(Error::ValueOutOfRange {
                value,
                bits: *bits,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn fixed_width(&self) -> Option<usize> {
        match self {
            ValueCodec::Fixed(bits) => Some(usize::from(*bits)),
            ValueCodec::Varint | ValueCodec::EliasGamma => None,
        }
    }
}

impl Codec for ValueCodec {
    fn length(&self, value: u64) -> usize {
        match self {
            ValueCodec::Fixed(bits) => FixedWidth(*bits).length(value),
            ValueCodec::Varint => Varint.length(value),
            ValueCodec::EliasGamma => EliasGamma.length(value),
        }
    }

    fn encode(&self, buf: &mut [u8], pos: usize, value: u64) -> usize {
        match self {
            ValueCodec::Fixed(bits) => FixedWidth(*bits).encode(buf, pos, value),
            ValueCodec::Varint => Varint.encode(buf, pos, value),
            ValueCodec::EliasGamma => EliasGamma.encode(buf, pos, value),
        }
    }

    fn decode(&self, buf: &[u8], pos: usize) -> (u64, usize) {
        match self {
            ValueCodec::Fixed(bits) => FixedWidth(*bits).decode(buf, pos),
            ValueCodec::Varint => Varint.decode(buf, pos),
            ValueCodec::EliasGamma => EliasGamma.decode(buf, pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_varint_lengths() {
        assert_eq!(Varint.length(0), 8);
        assert_eq!(Varint.length(127), 8);
        assert_eq!(Varint.length(128), 16);
        assert_eq!(Varint.length(u64::MAX), 80);
    }

    #[test]
    fn test_gamma_layout() {
        // 4 + 1 = 5 = 0b101: two zeros, then 1, then the remaining bits 01.
        let mut buf = [0u8; 2];
        assert_eq!(EliasGamma.encode(&mut buf, 0, 4), 5);
        assert_eq!(get_bits(&buf, 0, 3), 0b100);
        assert_eq!(EliasGamma.decode(&buf, 0), (4, 5));
        assert_eq!(EliasGamma.length(0), 1);
    }

    #[test]
    fn test_gamma_extremes() {
        let mut buf = [0u8; 24];
        let written = EliasGamma.encode(&mut buf, 3, u64::MAX);
        assert_eq!(written, 129);
        assert_eq!(EliasGamma.decode(&buf, 3), (u64::MAX, 129));
    }

    #[test]
    fn test_fixed_range() {
        assert!(ValueCodec::Fixed(3).check(7).is_ok());
        assert!(matches!(
            ValueCodec::Fixed(3).check(8),
            Err(Error::ValueOutOfRange { value: 8, bits: 3 })
        ));
        assert!(ValueCodec::Fixed(64).check(u64::MAX).is_ok());
    }

    proptest! {
        #[test]
        fn test_codecs_are_self_delimiting(values in proptest::collection::vec(any::<u64>(), 1..16), offset in 0usize..13) {
            for codec in [ValueCodec::Varint, ValueCodec::EliasGamma, ValueCodec::Fixed(64)] {
                let bits: usize = values.iter().map(|v| codec.length(*v)).sum();
                let mut buf = std::vec![0u8; (offset + bits).div_ceil(8)];
                let mut at = offset;
                for v in &values {
                    at += codec.encode(&mut buf, at, *v);
                }
                prop_assert_eq!(at, offset + bits);
                let mut at = offset;
                for v in &values {
                    let (decoded, used) = codec.decode(&buf, at);
                    prop_assert_eq!(decoded, *v);
                    prop_assert_eq!(used, codec.length(*v));
                    at += used;
                }
            }
        }
    }
}

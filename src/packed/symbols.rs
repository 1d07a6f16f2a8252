//! A packed sequence of small symbols with per-block occurrence counts.
//!
//! Region layout:
//!
//! ```text
//! 0..4    symbol count (u32)
//! 4..8    bits per symbol (u32)
//! 8..     per SYMBOLS_PER_BLOCK symbols: one u16 count per alphabet symbol
//! ...     symbols, `bits` wide each
//! ```

use alloc::vec;

use crate::common::bytes_for_bits;
use crate::common::copy_bits;
use crate::common::count_ones;
use crate::common::get_bits;
use crate::common::low_mask;
use crate::common::read_u16;
use crate::common::read_u32;
use crate::common::set_bits;
use crate::common::write_u16;
use crate::common::write_u32;
use crate::error::CapacityExceeded;
use crate::packed::Find;
use crate::packed::PackedAllocator;
use crate::packed::SearchType;

pub const SYMBOLS_PER_BLOCK: usize = 512;

const HEADER_SIZE: usize = 8;

fn alphabet(bits: u8) -> usize {
    1 << bits
}

fn blocks(size: usize) -> usize {
    size.div_ceil(SYMBOLS_PER_BLOCK)
}

fn data_start(bits: u8, size: usize) -> usize {
    HEADER_SIZE + blocks(size) * alphabet(bits) * 2
}

/// Region bytes for `size` symbols of `bits` bits.
pub fn required_bytes(bits: u8, size: usize) -> usize {
    if size == 0 {
        0
    } else {
        data_start(bits, size) + bytes_for_bits(size * usize::from(bits))
    }
}

/// Read-only view of a symbol region.
#[derive(Debug, Clone, Copy)]
pub struct PackedSymbols<'a> {
    bytes: &'a [u8],
    bits: u8,
}

impl<'a> PackedSymbols<'a> {
    pub fn new(bytes: &'a [u8], bits: u8) -> Self {
        PackedSymbols { bytes, bits }
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn size(&self) -> usize {
        if self.bytes.len() < HEADER_SIZE {
            0
        } else {
            read_u32(self.bytes, 0) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn data(&self) -> &'a [u8] {
        if self.is_empty() {
            &[]
        } else {
            &self.bytes[data_start(self.bits, self.size())..]
        }
    }

    fn block_count(&self, block: usize, symbol: u8) -> usize {
        let at = HEADER_SIZE + (block * alphabet(self.bits) + usize::from(symbol)) * 2;
        usize::from(read_u16(self.bytes, at))
    }

    pub fn symbol(&self, idx: usize) -> u8 {
        let width = usize::from(self.bits);
        get_bits(self.data(), idx * width, u32::from(self.bits)) as u8
    }

    /// Occurrences of `symbol` in `[from, to)` by scanning the data.
    fn scan_count(&self, from: usize, to: usize, symbol: u8) -> usize {
        if to <= from {
            return 0;
        }
        if self.bits == 1 {
            let ones = count_ones(self.data(), from, to - from);
            return if symbol == 1 { ones } else { to - from - ones };
        }
        (from..to).filter(|i| self.symbol(*i) == symbol).count()
    }

    /// Occurrences of `symbol` in `[0, end)`.
    pub fn rank(&self, end: usize, symbol: u8) -> usize {
        let end = end.min(self.size());
        let full = end / SYMBOLS_PER_BLOCK;
        let counted: usize = (0..full).map(|block| self.block_count(block, symbol)).sum();
        counted + self.scan_count(full * SYMBOLS_PER_BLOCK, end, symbol)
    }

    pub fn count(&self, symbol: u8) -> usize {
        self.rank(self.size(), symbol)
    }

    /// Position of the `k`-th (1-based) occurrence of `symbol`.
    pub fn select(&self, symbol: u8, k: usize) -> Option<usize> {
        if k == 0 {
            return None;
        }
        match self.find_forward(symbol, 0, k as u64, SearchType::Ge) {
            Find::Found { idx, .. } => Some(idx),
            Find::NotFound { .. } => None,
        }
    }

    /// Finds the `need`-th occurrence inside `[from, to)`, given `seen` so far.
    fn scan_select(&self, from: usize, to: usize, symbol: u8, need: usize, mut seen: usize) -> Result<usize, usize> {
        let data = self.data();
        let mut idx = from;
        if self.bits == 1 {
            while idx < to {
                let take = (to - idx).min(64) as u32;
                let mut word = get_bits(data, idx, take);
                if symbol == 0 {
                    word = !word & low_mask(take);
                }
                let ones = word.count_ones() as usize;
                if seen + ones < need {
                    seen += ones;
                    idx += take as usize;
                    continue;
                }
                for _ in 0..need - seen - 1 {
                    word &= word - 1;
                }
                return Ok(idx + word.trailing_zeros() as usize);
            }
            return Err(seen);
        }
        while idx < to {
            if self.symbol(idx) == symbol {
                seen += 1;
                if seen == need {
                    return Ok(idx);
                }
            }
            idx += 1;
        }
        Err(seen)
    }

    /// Scans from `start` for the first position where the running count of
    /// `symbol` satisfies `search` against `target`.
    pub fn find_forward(&self, symbol: u8, start: usize, target: u64, search: SearchType) -> Find {
        let size = self.size();
        if !search.is_upward() {
            let mut acc = 0u64;
            for idx in start..size {
                let hit = u64::from(self.symbol(idx) == symbol);
                if search.holds(acc + hit, target) {
                    return Find::Found { idx, prefix: acc };
                }
                acc += hit;
            }
            return Find::NotFound { total: acc };
        }

        let need = match search {
            SearchType::Gt => target.saturating_add(1),
            _ => target,
        } as usize;
        if need == 0 && start < size {
            return Find::Found { idx: start, prefix: 0 };
        }

        let mut seen = 0usize;
        let mut idx = start;
        while idx < size {
            let block = idx / SYMBOLS_PER_BLOCK;
            let block_end = ((block + 1) * SYMBOLS_PER_BLOCK).min(size);
            let here = if idx == block * SYMBOLS_PER_BLOCK {
                self.block_count(block, symbol)
            } else {
                self.scan_count(idx, block_end, symbol)
            };
            if seen + here >= need {
                return match self.scan_select(idx, block_end, symbol, need, seen) {
                    Ok(found) => Find::Found {
                        idx: found,
                        prefix: need as u64 - 1,
                    },
                    Err(total) => Find::NotFound { total: total as u64 },
                };
            }
            seen += here;
            idx = block_end;
        }
        Find::NotFound { total: seen as u64 }
    }

    /// Position of the first symbol at or after the byte midpoint.
    pub fn split_point(&self) -> usize {
        self.size() / 2
    }
}

/// Mutable access to a symbol region.
#[derive(Debug)]
pub struct PackedSymbolsMut<'a, 'b> {
    alloc: &'a mut PackedAllocator<'b>,
    region: usize,
    bits: u8,
}

impl<'a, 'b> PackedSymbolsMut<'a, 'b> {
    pub fn new(alloc: &'a mut PackedAllocator<'b>, region: usize, bits: u8) -> Self {
        PackedSymbolsMut { alloc, region, bits }
    }

    pub fn as_ref(&self) -> PackedSymbols<'_> {
        PackedSymbols::new(self.alloc.bytes(self.region), self.bits)
    }

    fn rebuild(&mut self, size: usize, data: &[u8]) -> Result<(), CapacityExceeded> {
        self.alloc.resize(self.region, required_bytes(self.bits, size))?;
        if size == 0 {
            return Ok(());
        }
        let bits = self.bits;
        let width = usize::from(bits);
        let start = data_start(bits, size);
        let data_len = bytes_for_bits(size * width);
        let bytes = self.alloc.bytes_mut(self.region);
        write_u32(bytes, 0, size as u32);
        write_u32(bytes, 4, u32::from(bits));
        bytes[start..start + data_len].copy_from_slice(&data[..data_len]);
        bytes[start + data_len..].fill(0);

        let (index, data) = bytes.split_at_mut(start);
        for block in 0..blocks(size) {
            let first = block * SYMBOLS_PER_BLOCK;
            let last = (first + SYMBOLS_PER_BLOCK).min(size);
            let base = HEADER_SIZE + block * alphabet(bits) * 2;
            for symbol in 0..alphabet(bits) {
                write_u16(index, base + symbol * 2, 0);
            }
            if bits == 1 {
                let ones = count_ones(data, first, last - first);
                write_u16(index, base, (last - first - ones) as u16);
                write_u16(index, base + 2, ones as u16);
                continue;
            }
            for idx in first..last {
                let symbol = get_bits(data, idx * width, u32::from(bits)) as usize;
                let at = base + symbol * 2;
                let current = read_u16(index, at);
                write_u16(index, at, current + 1);
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, idx: usize, symbol: u8) -> Result<(), CapacityExceeded> {
        let view = self.as_ref();
        let size = view.size();
        assert!(idx <= size, "symbol {idx} out of bounds for {size}");
        let width = usize::from(self.bits);
        let mut data = vec![0u8; bytes_for_bits((size + 1) * width)];
        copy_bits(view.data(), 0, &mut data, 0, idx * width);
        set_bits(&mut data, idx * width, u32::from(self.bits), u64::from(symbol));
        copy_bits(view.data(), idx * width, &mut data, (idx + 1) * width, (size - idx) * width);
        self.rebuild(size + 1, &data)
    }

    pub fn update(&mut self, idx: usize, symbol: u8) -> Result<(), CapacityExceeded> {
        let view = self.as_ref();
        let size = view.size();
        let width = usize::from(self.bits);
        let mut data = vec![0u8; bytes_for_bits(size * width)];
        copy_bits(view.data(), 0, &mut data, 0, size * width);
        set_bits(&mut data, idx * width, u32::from(self.bits), u64::from(symbol));
        self.rebuild(size, &data)
    }

    pub fn remove(&mut self, from: usize, to: usize) -> Result<(), CapacityExceeded> {
        let view = self.as_ref();
        let size = view.size();
        let width = usize::from(self.bits);
        let mut data = vec![0u8; bytes_for_bits((size - (to - from)) * width)];
        copy_bits(view.data(), 0, &mut data, 0, from * width);
        copy_bits(view.data(), to * width, &mut data, from * width, (size - to) * width);
        self.rebuild(size - (to - from), &data)
    }

    /// Inserts symbols `[from, to)` of `src` before position `at`.
    pub fn splice(&mut self, at: usize, src: &PackedSymbols<'_>, from: usize, to: usize) -> Result<(), CapacityExceeded> {
        let view = self.as_ref();
        let size = view.size();
        let width = usize::from(self.bits);
        let moved = to - from;
        let mut data = vec![0u8; bytes_for_bits((size + moved) * width)];
        copy_bits(view.data(), 0, &mut data, 0, at * width);
        copy_bits(src.data(), from * width, &mut data, at * width, moved * width);
        copy_bits(view.data(), at * width, &mut data, (at + moved) * width, (size - at) * width);
        self.rebuild(size + moved, &data)
    }

    pub fn clear(&mut self) {
        self.alloc.free(self.region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::vec::Vec;

    use proptest::prelude::*;

    fn build(bits: u8, symbols: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 16 + required_bytes(bits, symbols.len()) + 64];
        {
            let mut alloc = PackedAllocator::init(&mut buf, 1).expect("test buffer too small");
            let mut seq = PackedSymbolsMut::new(&mut alloc, 0, bits);
            for (i, s) in symbols.iter().enumerate() {
                seq.insert(i, *s).expect("sized for the input");
            }
        }
        buf
    }

    fn view(buf: &[u8], bits: u8) -> PackedSymbols<'_> {
        PackedSymbols::new(crate::packed::PackedAllocatorRef::new(buf).bytes(0), bits)
    }

    #[test]
    fn test_alternating_bits() {
        let symbols: Vec<u8> = (0..20).map(|i| 1 - (i % 2) as u8).collect();
        let buf = build(1, &symbols);
        let seq = view(&buf, 1);
        assert_eq!(seq.size(), 20);
        assert_eq!(seq.rank(20, 1), 10);
        assert_eq!(seq.rank(20, 0), 10);
        assert_eq!(seq.select(1, 10), Some(18));
        assert_eq!(seq.select(0, 1), Some(1));
        assert_eq!(seq.select(1, 11), None);
    }

    #[test]
    fn test_update_and_remove() {
        let mut buf = vec![0u8; 512];
        let mut alloc = PackedAllocator::init(&mut buf, 1).unwrap();
        let mut seq = PackedSymbolsMut::new(&mut alloc, 0, 3);
        for (i, s) in [7u8, 1, 2, 7, 0].iter().enumerate() {
            seq.insert(i, *s).unwrap();
        }
        seq.update(1, 7).unwrap();
        assert_eq!(seq.as_ref().count(7), 3);
        seq.remove(0, 2).unwrap();
        let view = seq.as_ref();
        assert_eq!((0..view.size()).map(|i| view.symbol(i)).collect::<Vec<_>>(), std::vec![2, 7, 0]);
        assert_eq!(view.count(7), 1);
    }

    proptest! {
        #[test]
        fn test_rank_select_duality(bits in 1u8..=4, raw in proptest::collection::vec(any::<u8>(), 0..1500)) {
            let symbols: Vec<u8> = raw.iter().map(|s| s & ((1u8 << bits) - 1)).collect();
            let buf = build(bits, &symbols);
            let seq = view(&buf, bits);
            for symbol in 0..(1u8 << bits) {
                let total = symbols.iter().filter(|s| **s == symbol).count();
                prop_assert_eq!(seq.count(symbol), total);
                for k in [1, total / 2 + 1, total] {
                    if k == 0 || k > total {
                        continue;
                    }
                    let pos = seq.select(symbol, k);
                    prop_assert!(pos.is_some());
                    let pos = pos.unwrap();
                    prop_assert_eq!(seq.symbol(pos), symbol);
                    prop_assert_eq!(seq.rank(pos, symbol), k - 1);
                    prop_assert_eq!(seq.rank(pos + 1, symbol), k);
                }
                prop_assert_eq!(seq.select(symbol, total + 1), None);
            }
        }
    }
}

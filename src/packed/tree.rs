//! A packed array of fixed-arity tuples with per-block aggregates.
//!
//! Region layout:
//!
//! ```text
//! 0..4    element count (u32)
//! 4..8    data length in bits (u32)
//! 8..     one index entry per VALUES_PER_BLOCK elements:
//!           bit offset of the block's first element (u32)
//!           aggregate of each column over the block (u64 each)
//! ...     element-major encoded data
//! ```
//!
//! An empty tree occupies no bytes. Every mutation encodes the new data into a
//! scratch buffer, resizes the region (which may fail without side effects) and
//! then rewrites the header, data and index.

use alloc::vec;

use crate::codec::Codec;
use crate::codec::ValueCodec;
use crate::common::bytes_for_bits;
use crate::common::copy_bits;
use crate::common::read_u32;
use crate::common::read_u64;
use crate::common::write_u32;
use crate::common::write_u64;
use crate::config::AggregateKind;
use crate::error::CapacityExceeded;
use crate::packed::Find;
use crate::packed::PackedAllocator;
use crate::packed::SearchType;

pub const VALUES_PER_BLOCK: usize = 32;

const HEADER_SIZE: usize = 8;

/// Shape of the tuples stored in one packed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedTreeSpec {
    pub columns: usize,
    pub codec: ValueCodec,
    pub aggregate: AggregateKind,
    /// Column 0 holds element counts and is always summed.
    pub leading_size: bool,
}

impl PackedTreeSpec {
    pub fn kind(&self, column: usize) -> AggregateKind {
        if self.leading_size && column == 0 {
            AggregateKind::Sum
        } else {
            self.aggregate
        }
    }

    fn index_entry_size(&self) -> usize {
        4 + 8 * self.columns
    }

    fn blocks(size: usize) -> usize {
        size.div_ceil(VALUES_PER_BLOCK)
    }

    /// Region bytes needed for `size` elements occupying `data_bits` bits.
    pub fn required_bytes(&self, size: usize, data_bits: usize) -> usize {
        if size == 0 {
            0
        } else {
            HEADER_SIZE + Self::blocks(size) * self.index_entry_size() + bytes_for_bits(data_bits)
        }
    }

    pub fn encoded_bits(&self, values: &[u64]) -> usize {
        values.iter().map(|v| self.codec.length(*v)).sum()
    }
}

/// Read-only view of a packed tree region.
#[derive(Debug, Clone, Copy)]
pub struct PackedTree<'a> {
    bytes: &'a [u8],
    spec: PackedTreeSpec,
}

impl<'a> PackedTree<'a> {
    pub fn new(bytes: &'a [u8], spec: PackedTreeSpec) -> Self {
        PackedTree { bytes, spec }
    }

    pub fn spec(&self) -> &PackedTreeSpec {
        &self.spec
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

    pub fn data_bits(&self) -> usize {
        if self.bytes.len() < HEADER_SIZE {
            0
        } else {
            read_u32(self.bytes, 4) as usize
        }
    }

    fn data_start(&self) -> usize {
        HEADER_SIZE + PackedTreeSpec::blocks(self.size()) * self.spec.index_entry_size()
    }

    fn data(&self) -> &'a [u8] {
        if self.is_empty() {
            &[]
        } else {
            &self.bytes[self.data_start()..]
        }
    }

    fn index_at(&self, block: usize) -> usize {
        HEADER_SIZE + block * self.spec.index_entry_size()
    }

    fn block_offset(&self, block: usize) -> usize {
        read_u32(self.bytes, self.index_at(block)) as usize
    }

    /// Aggregate of `column` over index block `block`.
    pub fn block_aggregate(&self, block: usize, column: usize) -> u64 {
        read_u64(self.bytes, self.index_at(block) + 4 + 8 * column)
    }

    fn skip_element(&self, data: &[u8], pos: usize) -> usize {
        match self.spec.codec.fixed_width() {
            Some(width) => pos + width * self.spec.columns,
            None => (0..self.spec.columns).fold(pos, |at, _| at + self.spec.codec.decode(data, at).1),
        }
    }

    /// Bit offset of element `idx` within the data area; `size()` maps to the end.
    pub fn bit_offset(&self, idx: usize) -> usize {
        let size = self.size();
        assert!(idx <= size, "element {idx} out of bounds for {size}");
        if idx == size {
            return self.data_bits();
        }
        if let Some(width) = self.spec.codec.fixed_width() {
            return idx * width * self.spec.columns;
        }
        let data = self.data();
        let block = idx / VALUES_PER_BLOCK;
        (block * VALUES_PER_BLOCK..idx).fold(self.block_offset(block), |pos, _| self.skip_element(data, pos))
    }

    pub fn value(&self, idx: usize, column: usize) -> u64 {
        let data = self.data();
        let mut pos = self.bit_offset(idx);
        for _ in 0..column {
            pos += self.spec.codec.decode(data, pos).1;
        }
        self.spec.codec.decode(data, pos).0
    }

    /// Decodes element `idx` into `out`, which must have `columns` slots.
    pub fn read(&self, idx: usize, out: &mut [u64]) {
        let data = self.data();
        let mut pos = self.bit_offset(idx);
        for slot in out.iter_mut().take(self.spec.columns) {
            let (value, used) = self.spec.codec.decode(data, pos);
            *slot = value;
            pos += used;
        }
    }

    /// Decodes `column` of every element in index block `block`.
    fn block_column(&self, block: usize, column: usize, out: &mut [u64; VALUES_PER_BLOCK]) -> usize {
        let data = self.data();
        let first = block * VALUES_PER_BLOCK;
        let count = (self.size() - first).min(VALUES_PER_BLOCK);
        let mut pos = self.block_offset(block);
        for slot in out.iter_mut().take(count) {
            for c in 0..self.spec.columns {
                let (value, used) = self.spec.codec.decode(data, pos);
                if c == column {
                    *slot = value;
                }
                pos += used;
            }
        }
        count
    }

    /// Aggregate of `column` over `[from, to)`.
    pub fn sum(&self, column: usize, from: usize, to: usize) -> u64 {
        let kind = self.spec.kind(column);
        let mut acc = 0u64;
        let mut idx = from;
        let mut values = [0u64; VALUES_PER_BLOCK];
        while idx < to {
            let block = idx / VALUES_PER_BLOCK;
            let block_start = block * VALUES_PER_BLOCK;
            let block_end = (block_start + VALUES_PER_BLOCK).min(self.size());
            if idx == block_start && block_end <= to {
                acc = kind.combine(acc, self.block_aggregate(block, column));
            } else {
                self.block_column(block, column, &mut values);
                let stop = block_end.min(to);
                acc = values[idx - block_start..stop - block_start]
                    .iter()
                    .fold(acc, |acc, v| kind.combine(acc, *v));
            }
            idx = block_end.min(to);
        }
        acc
    }

    /// Aggregate of `column` over the whole tree.
    pub fn total(&self, column: usize) -> u64 {
        let kind = self.spec.kind(column);
        (0..PackedTreeSpec::blocks(self.size())).fold(0, |acc, block| kind.combine(acc, self.block_aggregate(block, column)))
    }

    fn probe(kind: AggregateKind, acc: u64, value: u64) -> u64 {
        match kind {
            AggregateKind::Sum => acc.wrapping_add(value),
            AggregateKind::Max => value,
        }
    }

    /// Scans from `start` towards the end for the first element whose running
    /// sum (for summed columns) or own value (for max columns) satisfies
    /// `search` against `target`.
    pub fn find_forward(&self, column: usize, start: usize, target: u64, search: SearchType) -> Find {
        let size = self.size();
        let kind = self.spec.kind(column);
        let mut acc = 0u64;
        let mut idx = start;
        let mut values = [0u64; VALUES_PER_BLOCK];
        while idx < size {
            let block = idx / VALUES_PER_BLOCK;
            let block_start = block * VALUES_PER_BLOCK;
            let block_end = (block_start + VALUES_PER_BLOCK).min(size);
            if idx == block_start && search.is_upward() {
                let aggregate = self.block_aggregate(block, column);
                if !search.holds(Self::probe(kind, acc, aggregate), target) {
                    acc = kind.combine(acc, aggregate);
                    idx = block_end;
                    continue;
                }
            }
            self.block_column(block, column, &mut values);
            for i in idx..block_end {
                let value = values[i - block_start];
                if search.holds(Self::probe(kind, acc, value), target) {
                    return Find::Found { idx: i, prefix: acc };
                }
                acc = kind.combine(acc, value);
            }
            idx = block_end;
        }
        Find::NotFound { total: acc }
    }

    /// Like [`find_forward`](Self::find_forward) but scans from `end - 1` down to 0.
    pub fn find_backward(&self, column: usize, end: usize, target: u64, search: SearchType) -> Find {
        let size = self.size();
        let kind = self.spec.kind(column);
        let mut acc = 0u64;
        let mut idx = end.min(size);
        let mut values = [0u64; VALUES_PER_BLOCK];
        while idx > 0 {
            let block = (idx - 1) / VALUES_PER_BLOCK;
            let block_start = block * VALUES_PER_BLOCK;
            let block_end = (block_start + VALUES_PER_BLOCK).min(size);
            if idx == block_end && search.is_upward() {
                let aggregate = self.block_aggregate(block, column);
                if !search.holds(Self::probe(kind, acc, aggregate), target) {
                    acc = kind.combine(acc, aggregate);
                    idx = block_start;
                    continue;
                }
            }
            self.block_column(block, column, &mut values);
            for i in (block_start..idx).rev() {
                let value = values[i - block_start];
                if search.holds(Self::probe(kind, acc, value), target) {
                    return Find::Found { idx: i, prefix: acc };
                }
                acc = kind.combine(acc, value);
            }
            idx = block_start;
        }
        Find::NotFound { total: acc }
    }

    /// First element at or after the byte midpoint of the data.
    pub fn split_point(&self) -> usize {
        let size = self.size();
        if self.spec.codec.fixed_width().is_some() {
            return size / 2;
        }
        let half = self.data_bits() / 2;
        let data = self.data();
        let mut pos = 0;
        for idx in 0..size {
            if pos >= half {
                return idx;
            }
            pos = self.skip_element(data, pos);
        }
        size
    }
}

/// Mutable access to a packed tree stored in region `region` of an allocator.
#[derive(Debug)]
pub struct PackedTreeMut<'a, 'b> {
    alloc: &'a mut PackedAllocator<'b>,
    region: usize,
    spec: PackedTreeSpec,
}

impl<'a, 'b> PackedTreeMut<'a, 'b> {
    pub fn new(alloc: &'a mut PackedAllocator<'b>, region: usize, spec: PackedTreeSpec) -> Self {
        PackedTreeMut { alloc, region, spec }
    }

    pub fn as_ref(&self) -> PackedTree<'_> {
        PackedTree::new(self.alloc.bytes(self.region), self.spec)
    }

    fn rebuild(&mut self, size: usize, data: &[u8], data_bits: usize) -> Result<(), CapacityExceeded> {
        let required = self.spec.required_bytes(size, data_bits);
        self.alloc.resize(self.region, required)?;
        if size == 0 {
            return Ok(());
        }
        let spec = self.spec;
        let bytes = self.alloc.bytes_mut(self.region);
        write_u32(bytes, 0, size as u32);
        write_u32(bytes, 4, data_bits as u32);
        let data_start = HEADER_SIZE + PackedTreeSpec::blocks(size) * spec.index_entry_size();
        let data_len = bytes_for_bits(data_bits);
        bytes[data_start..data_start + data_len].copy_from_slice(&data[..data_len]);
        bytes[data_start + data_len..].fill(0);
        reindex(bytes, &spec, size, data_start);
        Ok(())
    }

    /// Inserts a tuple before element `idx`.
    pub fn insert(&mut self, idx: usize, values: &[u64]) -> Result<(), CapacityExceeded> {
        debug_assert_eq!(values.len(), self.spec.columns);
        let tree = self.as_ref();
        let size = tree.size();
        let at = tree.bit_offset(idx);
        let old_bits = tree.data_bits();
        let new_bits = old_bits + self.spec.encoded_bits(values);

        let mut data = vec![0u8; bytes_for_bits(new_bits)];
        copy_bits(tree.data(), 0, &mut data, 0, at);
        let mut pos = at;
        for value in values {
            pos += self.spec.codec.encode(&mut data, pos, *value);
        }
        copy_bits(tree.data(), at, &mut data, pos, old_bits - at);
        self.rebuild(size + 1, &data, new_bits)
    }

    /// Replaces element `idx`; may grow the region.
    pub fn update(&mut self, idx: usize, values: &[u64]) -> Result<(), CapacityExceeded> {
        debug_assert_eq!(values.len(), self.spec.columns);
        let tree = self.as_ref();
        let size = tree.size();
        let from = tree.bit_offset(idx);
        let to = tree.bit_offset(idx + 1);
        let old_bits = tree.data_bits();
        let new_bits = old_bits - (to - from) + self.spec.encoded_bits(values);

        let mut data = vec![0u8; bytes_for_bits(new_bits)];
        copy_bits(tree.data(), 0, &mut data, 0, from);
        let mut pos = from;
        for value in values {
            pos += self.spec.codec.encode(&mut data, pos, *value);
        }
        copy_bits(tree.data(), to, &mut data, pos, old_bits - to);
        self.rebuild(size, &data, new_bits)
    }

    /// Removes elements `[from, to)`.
    pub fn remove(&mut self, from: usize, to: usize) -> Result<(), CapacityExceeded> {
        let tree = self.as_ref();
        let size = tree.size();
        let start = tree.bit_offset(from);
        let end = tree.bit_offset(to);
        let old_bits = tree.data_bits();
        let new_bits = old_bits - (end - start);

        let mut data = vec![0u8; bytes_for_bits(new_bits)];
        copy_bits(tree.data(), 0, &mut data, 0, start);
        copy_bits(tree.data(), end, &mut data, start, old_bits - end);
        self.rebuild(size - (to - from), &data, new_bits)
    }

    /// Inserts elements `[from, to)` of `src` before element `at`.
    pub fn splice(&mut self, at: usize, src: &PackedTree<'_>, from: usize, to: usize) -> Result<(), CapacityExceeded> {
        let tree = self.as_ref();
        let size = tree.size();
        let pos = tree.bit_offset(at);
        let old_bits = tree.data_bits();
        let src_start = src.bit_offset(from);
        let src_len = src.bit_offset(to) - src_start;
        let new_bits = old_bits + src_len;

        let mut data = vec![0u8; bytes_for_bits(new_bits)];
        copy_bits(tree.data(), 0, &mut data, 0, pos);
        copy_bits(src.data(), src_start, &mut data, pos, src_len);
        copy_bits(tree.data(), pos, &mut data, pos + src_len, old_bits - pos);
        self.rebuild(size + (to - from), &data, new_bits)
    }

    pub fn clear(&mut self) {
        self.alloc.free(self.region);
    }
}

fn reindex(bytes: &mut [u8], spec: &PackedTreeSpec, size: usize, data_start: usize) {
    let (index, data) = bytes.split_at_mut(data_start);
    let mut pos = 0usize;
    for block in 0..PackedTreeSpec::blocks(size) {
        let at = HEADER_SIZE + block * spec.index_entry_size();
        write_u32(index, at, pos as u32);
        for column in 0..spec.columns {
            write_u64(index, at + 4 + 8 * column, 0);
        }
        let first = block * VALUES_PER_BLOCK;
        for _ in first..(first + VALUES_PER_BLOCK).min(size) {
            for column in 0..spec.columns {
                let (value, used) = spec.codec.decode(data, pos);
                pos += used;
                let slot = at + 4 + 8 * column;
                let current = read_u64(index, slot);
                write_u64(index, slot, spec.kind(column).combine(current, value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::vec::Vec;

    use proptest::prelude::*;

    use crate::packed::PackedAllocatorRef;

    const VARINT_SUM: PackedTreeSpec = PackedTreeSpec {
        columns: 2,
        codec: ValueCodec::Varint,
        aggregate: AggregateKind::Sum,
        leading_size: false,
    };

    fn with_tree<R>(spec: PackedTreeSpec, bytes: usize, f: impl FnOnce(&mut PackedTreeMut<'_, '_>) -> R) -> R {
        let mut buf = vec![0u8; bytes];
        let mut alloc = PackedAllocator::init(&mut buf, 1).expect("test buffer too small");
        let mut tree = PackedTreeMut::new(&mut alloc, 0, spec);
        f(&mut tree)
    }

    #[test]
    fn test_insert_read_remove() {
        with_tree(VARINT_SUM, 1024, |tree| -> Result<(), CapacityExceeded> {
            tree.insert(0, &[5, 50])?;
            tree.insert(0, &[1, 10])?;
            tree.insert(2, &[900, 9000])?;
            let view = tree.as_ref();
            assert_eq!(view.size(), 3);
            assert_eq!(view.value(0, 0), 1);
            assert_eq!(view.value(1, 1), 50);
            assert_eq!(view.value(2, 1), 9000);
            assert_eq!(view.total(0), 906);
            assert_eq!(view.sum(1, 1, 3), 9050);

            tree.remove(0, 2)?;
            let view = tree.as_ref();
            assert_eq!(view.size(), 1);
            assert_eq!(view.value(0, 0), 900);

            tree.remove(0, 1)?;
            assert_eq!(tree.as_ref().size(), 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_empty_tree_has_no_bytes() {
        let mut buf = vec![0u8; 128];
        let mut alloc = PackedAllocator::init(&mut buf, 1).unwrap();
        let used = alloc.as_ref().used();
        {
            let mut tree = PackedTreeMut::new(&mut alloc, 0, VARINT_SUM);
            tree.insert(0, &[1, 2]).unwrap();
            tree.remove(0, 1).unwrap();
        }
        assert_eq!(PackedAllocatorRef::new(&buf).used(), used);
    }

    #[test]
    fn test_capacity_exceeded_leaves_tree_untouched() {
        let spec = PackedTreeSpec {
            columns: 1,
            codec: ValueCodec::Fixed(64),
            aggregate: AggregateKind::Sum,
            leading_size: false,
        };
        with_tree(spec, 64, |tree| {
            let mut inserted = 0;
            while tree.insert(inserted, &[inserted as u64]).is_ok() {
                inserted += 1;
            }
            let view = tree.as_ref();
            assert_eq!(view.size(), inserted);
            assert_eq!(view.total(0), (0..inserted as u64).sum::<u64>());
        });
    }

    #[test]
    fn test_find_max_column() {
        let spec = PackedTreeSpec {
            columns: 1,
            codec: ValueCodec::EliasGamma,
            aggregate: AggregateKind::Max,
            leading_size: false,
        };
        with_tree(spec, 4096, |tree| {
            for i in 0..100u64 {
                tree.insert(i as usize, &[i * 3]).unwrap();
            }
            let view = tree.as_ref();
            assert_eq!(view.total(0), 297);
            assert_eq!(view.find_forward(0, 0, 150, SearchType::Ge), Find::Found { idx: 50, prefix: 147 });
            assert_eq!(view.find_forward(0, 0, 297, SearchType::Gt), Find::NotFound { total: 297 });
            assert_eq!(view.find_forward(0, 60, 10, SearchType::Ge), Find::Found { idx: 60, prefix: 0 });
        });
    }

    #[test]
    fn test_find_backward_sum() {
        let spec = PackedTreeSpec {
            columns: 1,
            codec: ValueCodec::Fixed(8),
            aggregate: AggregateKind::Sum,
            leading_size: true,
        };
        with_tree(spec, 4096, |tree| {
            for i in 0..70 {
                tree.insert(i, &[1]).unwrap();
            }
            let view = tree.as_ref();
            // walking back from 70, the 5th element (index 65) brings the sum to 5
            assert_eq!(view.find_backward(0, 70, 5, SearchType::Ge), Find::Found { idx: 65, prefix: 4 });
            assert_eq!(view.find_backward(0, 10, 11, SearchType::Ge), Find::NotFound { total: 10 });
        });
    }

    #[test]
    fn test_splice_between_trees() {
        let mut left_buf = vec![0u8; 1024];
        let mut right_buf = vec![0u8; 1024];
        let mut left_alloc = PackedAllocator::init(&mut left_buf, 1).unwrap();
        let mut right_alloc = PackedAllocator::init(&mut right_buf, 1).unwrap();
        let mut left = PackedTreeMut::new(&mut left_alloc, 0, VARINT_SUM);
        let mut right = PackedTreeMut::new(&mut right_alloc, 0, VARINT_SUM);
        for i in 0..10u64 {
            left.insert(i as usize, &[i, i * 1000]).unwrap();
        }
        let point = left.as_ref().split_point();
        assert!(point > 0 && point < 10);

        right.splice(0, &left.as_ref(), point, 10).unwrap();
        left.remove(point, 10).unwrap();

        let left_values: Vec<u64> = (0..left.as_ref().size()).map(|i| left.as_ref().value(i, 0)).collect();
        let right_values: Vec<u64> = (0..right.as_ref().size()).map(|i| right.as_ref().value(i, 0)).collect();
        assert_eq!(left_values, (0..point as u64).collect::<Vec<_>>());
        assert_eq!(right_values, (point as u64..10).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn test_aggregates_match_contents(values in proptest::collection::vec(0u64..100_000, 0..200), probe in 0u64..2_000_000) {
            let spec = PackedTreeSpec { columns: 1, codec: ValueCodec::Varint, aggregate: AggregateKind::Sum, leading_size: false };
            with_tree(spec, 8192, |tree| -> Result<(), TestCaseError> {
                for (i, v) in values.iter().enumerate() {
                    tree.insert(i, &[*v]).unwrap();
                }
                let view = tree.as_ref();
                prop_assert_eq!(view.total(0), values.iter().sum::<u64>());
                for cut in [0, values.len() / 3, values.len()] {
                    prop_assert_eq!(view.sum(0, cut, values.len()), values[cut..].iter().sum::<u64>());
                }
                let expected = values.iter().scan(0u64, |acc, v| { *acc += v; Some(*acc) }).position(|s| s > probe);
                match view.find_forward(0, 0, probe, SearchType::Gt) {
                    Find::Found { idx, prefix } => {
                        prop_assert_eq!(Some(idx), expected);
                        prop_assert_eq!(prefix, values[..idx].iter().sum::<u64>());
                    }
                    Find::NotFound { total } => {
                        prop_assert_eq!(expected, None);
                        prop_assert_eq!(total, values.iter().sum::<u64>());
                    }
                }
                Ok(())
            })?;
        }
    }
}

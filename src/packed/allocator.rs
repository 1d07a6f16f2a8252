//! Region sub-allocator inside one fixed byte buffer.
//!
//! Layout:
//!
//! ```text
//! 0..4    buffer length (u32)
//! 4..6    region count (u16)
//! 6..8    reserved
//! 8..     region table, 12 bytes per region: offset u32, size u32, tag u8, pad
//! ...     region data, aligned to REGION_ALIGN, laid out in index order
//! ```
//!
//! Regions are always contiguous and in index order, so resizing region `i`
//! shifts the data of every region after it.

use crate::common::read_u16;
use crate::common::read_u32;
use crate::common::write_u16;
use crate::common::write_u32;
use crate::error::CapacityExceeded;

pub const REGION_ALIGN: usize = 8;

const HEADER_SIZE: usize = 8;
const TABLE_ENTRY_SIZE: usize = 12;

fn align_up(bytes: usize) -> usize {
    bytes.div_ceil(REGION_ALIGN) * REGION_ALIGN
}

/// Descriptor of one region as currently laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub index: usize,
    pub offset: usize,
    pub size: usize,
    pub tag: u8,
}

/// Read-only view over an initialised allocator buffer.
#[derive(Debug, Clone, Copy)]
pub struct PackedAllocatorRef<'a> {
    buf: &'a [u8],
}

impl<'a> PackedAllocatorRef<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        PackedAllocatorRef { buf }
    }

    /// Bytes needed for the header and table of `regions` empty regions.
    pub fn overhead(regions: usize) -> usize {
        align_up(HEADER_SIZE + regions * TABLE_ENTRY_SIZE)
    }

    pub fn region_count(&self) -> usize {
        usize::from(read_u16(self.buf, 4))
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes in use, including header and table.
    pub fn used(&self) -> usize {
        match self.region_count() {
            0 => Self::overhead(0),
            n => {
                let last = self.region(n - 1);
                last.offset + last.size
            }
        }
    }

    pub fn free_bytes(&self) -> usize {
        self.capacity() - self.used()
    }

    pub fn region(&self, index: usize) -> Region {
        let at = HEADER_SIZE + index * TABLE_ENTRY_SIZE;
        Region {
            index,
            offset: read_u32(self.buf, at) as usize,
            size: read_u32(self.buf, at + 4) as usize,
            tag: self.buf[at + 8],
        }
    }

    pub fn bytes(&self, index: usize) -> &'a [u8] {
        let region = self.region(index);
        &self.buf[region.offset..region.offset + region.size]
    }

    /// Checks that the header and table describe a well-formed layout.
    pub fn validate(&self, expected_regions: usize) -> Result<(), &'static str> {
        if self.buf.len() < HEADER_SIZE {
            return Err("allocator area shorter than its header");
        }
        if read_u32(self.buf, 0) as usize != self.buf.len() {
            return Err("allocator length does not match block");
        }
        if self.region_count() != expected_regions {
            return Err("unexpected region count");
        }
        let mut expected_offset = Self::overhead(expected_regions);
        if expected_offset > self.buf.len() {
            return Err("region table exceeds block");
        }
        for index in 0..expected_regions {
            let region = self.region(index);
            if region.offset != expected_offset || region.size % REGION_ALIGN != 0 {
                return Err("regions are not contiguous");
            }
            expected_offset += region.size;
            if expected_offset > self.buf.len() {
                return Err("region exceeds block");
            }
        }
        Ok(())
    }
}

/// Mutable allocator over a byte buffer.
#[derive(Debug)]
pub struct PackedAllocator<'a> {
    buf: &'a mut [u8],
}

impl<'a> PackedAllocator<'a> {
    /// Wraps a buffer that already holds an allocator layout.
    pub fn new(buf: &'a mut [u8]) -> Self {
        PackedAllocator { buf }
    }

    /// Writes a fresh layout with `regions` empty regions into `buf`.
    ///
    /// # Errors
    ///
    /// Fails if the header and table alone do not fit.
    pub fn init(buf: &'a mut [u8], regions: usize) -> Result<Self, CapacityExceeded> {
        let data_start = PackedAllocatorRef::overhead(regions);
        if data_start > buf.len() || buf.len() > u32::MAX as usize || regions > u16::MAX as usize {
            return Err(CapacityExceeded);
        }
        buf.fill(0);
        write_u32(buf, 0, buf.len() as u32);
        write_u16(buf, 4, regions as u16);
        for index in 0..regions {
            write_u32(buf, HEADER_SIZE + index * TABLE_ENTRY_SIZE, data_start as u32);
        }
        Ok(PackedAllocator { buf })
    }

    pub fn as_ref(&self) -> PackedAllocatorRef<'_> {
        PackedAllocatorRef { buf: self.buf }
    }

    pub fn region(&self, index: usize) -> Region {
        self.as_ref().region(index)
    }

    pub fn bytes(&self, index: usize) -> &[u8] {
        let region = self.region(index);
        &self.buf[region.offset..region.offset + region.size]
    }

    pub fn bytes_mut(&mut self, index: usize) -> &mut [u8] {
        let region = self.region(index);
        &mut self.buf[region.offset..region.offset + region.size]
    }

    pub fn set_tag(&mut self, index: usize, tag: u8) {
        self.buf[HEADER_SIZE + index * TABLE_ENTRY_SIZE + 8] = tag;
    }

    /// Sizes an empty region and tags it.
    pub fn allocate(&mut self, index: usize, bytes: usize, tag: u8) -> Result<Region, CapacityExceeded> {
        let region = self.resize(index, bytes)?;
        self.set_tag(index, tag);
        Ok(Region { tag, ..region })
    }

    /// Grows or shrinks region `index` to hold at least `bytes` bytes.
    ///
    /// Contents up to the smaller of the old and new sizes are preserved and
    /// newly exposed bytes are zeroed. On failure nothing is modified.
    pub fn resize(&mut self, index: usize, bytes: usize) -> Result<Region, CapacityExceeded> {
        let region = self.region(index);
        let new_size = align_up(bytes);
        if new_size == region.size {
            return Ok(region);
        }
        let used = self.as_ref().used();
        if new_size > region.size && used + (new_size - region.size) > self.buf.len() {
            return Err(CapacityExceeded);
        }
        if new_size > u32::MAX as usize {
            return Err(CapacityExceeded);
        }

        let tail = region.offset + region.size..used;
        let new_tail_start = region.offset + new_size;
        self.buf.copy_within(tail, new_tail_start);
        if new_size > region.size {
            self.buf[region.offset + region.size..new_tail_start].fill(0);
        } else {
            let new_used = used - (region.size - new_size);
            self.buf[new_used..used].fill(0);
        }

        for later in index + 1..self.as_ref().region_count() {
            let at = HEADER_SIZE + later * TABLE_ENTRY_SIZE;
            let offset = read_u32(self.buf, at) as usize;
            let moved = offset + new_size - region.size;
            write_u32(self.buf, at, moved as u32);
        }
        write_u32(self.buf, HEADER_SIZE + index * TABLE_ENTRY_SIZE + 4, new_size as u32);

        Ok(Region {
            size: new_size,
            ..region
        })
    }

    /// Releases all bytes of region `index`. The region slot stays.
    pub fn free(&mut self, index: usize) {
        let region = self.region(index);
        let used = self.as_ref().used();
        self.buf.copy_within(region.offset + region.size..used, region.offset);
        self.buf[used - region.size..used].fill(0);
        for later in index + 1..self.as_ref().region_count() {
            let at = HEADER_SIZE + later * TABLE_ENTRY_SIZE;
            let offset = read_u32(self.buf, at) as usize;
            write_u32(self.buf, at, (offset - region.size) as u32);
        }
        write_u32(self.buf, HEADER_SIZE + index * TABLE_ENTRY_SIZE + 4, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::vec;

    #[test]
    fn test_fresh_layout() -> Result<(), CapacityExceeded> {
        let mut buf = vec![0xAAu8; 128];
        let alloc = PackedAllocator::init(&mut buf, 3)?;
        let view = alloc.as_ref();
        assert_eq!(view.region_count(), 3);
        assert_eq!(view.used(), PackedAllocatorRef::overhead(3));
        assert_eq!(view.validate(3), Ok(()));
        for index in 0..3 {
            assert_eq!(view.region(index).size, 0);
        }
        Ok(())
    }

    #[test]
    fn test_resize_shifts_later_regions() -> Result<(), CapacityExceeded> {
        let mut buf = vec![0u8; 256];
        let mut alloc = PackedAllocator::init(&mut buf, 3)?;
        alloc.allocate(0, 10, 1)?;
        alloc.allocate(2, 8, 3)?;
        alloc.bytes_mut(2).copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        alloc.resize(1, 20)?;
        assert_eq!(alloc.region(0).size, 16);
        assert_eq!(alloc.region(1).size, 24);
        assert_eq!(alloc.bytes(2), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(alloc.region(2).tag, 3);
        assert_eq!(alloc.as_ref().validate(3), Ok(()));

        alloc.free(1);
        assert_eq!(alloc.bytes(2), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(alloc.region(2).offset, alloc.region(0).offset + 16);
        Ok(())
    }

    #[test]
    fn test_failed_resize_is_atomic() -> Result<(), CapacityExceeded> {
        let mut buf = vec![0u8; 64];
        let mut alloc = PackedAllocator::init(&mut buf, 2)?;
        alloc.allocate(1, 8, 0)?;
        alloc.bytes_mut(1).fill(9);
        let before = alloc.as_ref().used();

        assert_eq!(alloc.resize(0, 64), Err(CapacityExceeded));
        assert_eq!(alloc.as_ref().used(), before);
        assert_eq!(alloc.bytes(1), &[9; 8]);
        assert_eq!(alloc.region(0).size, 0);
        Ok(())
    }

    #[test]
    fn test_table_must_fit() {
        let mut buf = vec![0u8; 16];
        assert!(PackedAllocator::init(&mut buf, 4).is_err());
    }
}

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::Cell;
use core::fmt;
use core::ops::Deref;
use core::ops::DerefMut;

use allocator_api2::alloc::Allocator;
use allocator_api2::alloc::Global;
use allocator_api2::vec::Vec as AllocVec;
use thiserror::Error;

/// Opaque identifier of a block within one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u64);

impl BlockId {
    /// Stands in for the block of an allocation that did not happen.
    pub const UNASSIGNED: BlockId = BlockId(u64::MAX);
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An owned copy of one block's bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    bytes: Vec<u8>,
}

impl Block {
    pub fn zeroed(size: usize) -> Self {
        Block { bytes: vec![0; size] }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Block { bytes }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block").field("len", &self.bytes.len()).finish()
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no such block")]
    UnknownBlock,
    #[error("block has {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("could not allocate {size} bytes")]
    AllocationFailed { size: usize },
    #[error("{0}")]
    Backend(String),
}

/// Fixed-size block storage.
///
/// Blocks are read as owned copies and written back whole; the tree never
/// holds references into provider memory across calls.
pub trait BlockProvider {
    fn block_size(&self) -> usize;

    /// Allocates a zeroed block.
    fn allocate(&mut self) -> Result<BlockId, ProviderError>;

    fn read(&self, id: BlockId) -> Result<Block, ProviderError>;

    fn update(&mut self, id: BlockId, block: &Block) -> Result<(), ProviderError>;

    fn free(&mut self, id: BlockId) -> Result<(), ProviderError>;
}

/// Counters kept by [`MemoryBlockProvider`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    pub reads: usize,
    pub updates: usize,
    pub allocations: usize,
    pub frees: usize,
}

/// Keeps blocks in memory, one allocation of `block_size` bytes per block,
/// obtained from `A`.
pub struct MemoryBlockProvider<A: Allocator + Clone = Global> {
    alloc: A,
    block_size: usize,
    blocks: BTreeMap<BlockId, AllocVec<u8, A>>,
    next_id: u64,
    reads: Cell<usize>,
    stats: ProviderStats,
}

impl MemoryBlockProvider<Global> {
    pub fn new(block_size: usize) -> Self {
        Self::new_in(block_size, Global)
    }
}

impl<A: Allocator + Clone> MemoryBlockProvider<A> {
    pub fn new_in(block_size: usize, alloc: A) -> Self {
        MemoryBlockProvider {
            alloc,
            block_size,
            blocks: BTreeMap::new(),
            next_id: 0,
            reads: Cell::new(0),
            stats: ProviderStats::default(),
        }
    }

    /// Number of blocks currently allocated.
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn stats(&self) -> ProviderStats {
        ProviderStats {
            reads: self.reads.get(),
            ..self.stats
        }
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }
}

impl<A: Allocator + Clone> BlockProvider for MemoryBlockProvider<A> {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn allocate(&mut self) -> Result<BlockId, ProviderError> {
        let mut bytes = AllocVec::new_in(self.alloc.clone());
        bytes
            .try_reserve_exact(self.block_size)
            .map_err(|_| ProviderError::AllocationFailed { size: self.block_size })?;
        bytes.resize(self.block_size, 0);

        let id = BlockId(self.next_id);
        self.next_id += 1;
        self.blocks.insert(id, bytes);
        self.stats.allocations += 1;
        Ok(id)
    }

    fn read(&self, id: BlockId) -> Result<Block, ProviderError> {
        let bytes = self.blocks.get(&id).ok_or(ProviderError::UnknownBlock)?;
        self.reads.set(self.reads.get() + 1);
        Ok(Block::from_bytes(bytes.as_slice().to_vec()))
    }

    fn update(&mut self, id: BlockId, block: &Block) -> Result<(), ProviderError> {
        if block.len() != self.block_size {
            return Err(ProviderError::SizeMismatch {
                expected: self.block_size,
                actual: block.len(),
            });
        }
        let bytes = self.blocks.get_mut(&id).ok_or(ProviderError::UnknownBlock)?;
        bytes.copy_from_slice(block);
        self.stats.updates += 1;
        Ok(())
    }

    fn free(&mut self, id: BlockId) -> Result<(), ProviderError> {
        self.blocks.remove(&id).ok_or(ProviderError::UnknownBlock)?;
        self.stats.frees += 1;
        Ok(())
    }
}

impl<A: Allocator + Clone> fmt::Debug for MemoryBlockProvider<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlockProvider")
            .field("block_size", &self.block_size)
            .field("live_blocks", &self.blocks.len())
            .field("stats", &self.stats())
            .finish()
    }
}

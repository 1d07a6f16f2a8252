//! Block-backed tree nodes.
//!
//! A node block starts with a small header followed by a packed allocator
//! whose regions are, in order: one region per stream, the child id list and
//! the root metadata record.
//!
//! ```text
//! 0..2    magic
//! 2       flags (LEAF, ROOT)
//! 3       level, 0 for leaves
//! 4       stream count
//! 5..8    reserved
//! 8..     packed allocator
//! ```

use crate::common::read_u16;
use crate::common::read_u32;
use crate::common::read_u64;
use crate::common::write_u16;
use crate::common::write_u32;
use crate::common::write_u64;
use crate::config::TreeLayout;
use crate::error::CapacityExceeded;
use crate::error::Error;
use crate::error::Result;
use crate::packed::PackedAllocator;
use crate::packed::PackedAllocatorRef;
use crate::provider::Block;
use crate::provider::BlockId;
use crate::tree::BranchNodeEntry;

mod branch;
mod dispatch;
mod leaf;

pub use branch::{BranchNode, BranchNodeMut};
pub use dispatch::{dispatch, MutNodeRef, NodeRef, NodeVisitor};
pub use leaf::{LeafNode, LeafNodeMut, LeafStream};

use generic_array::ArrayLength;

pub const NODE_HEADER_SIZE: usize = 8;
pub const ROOT_METADATA_SIZE: usize = 32;

const NODE_MAGIC: u16 = 0x4250;
const FLAG_LEAF: u8 = 0b01;
const FLAG_ROOT: u8 = 0b10;

const ROOT_MAGIC: u32 = 0x5452_4250;
const FORMAT_VERSION: u16 = 1;

const TAG_STREAM: u8 = 1;
const TAG_CHILDREN: u8 = 2;
const TAG_META: u8 = 3;

/// Record kept in the root block identifying the tree's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootMetadata {
    pub version: u16,
    pub streams: u16,
    pub block_size: u32,
    pub fingerprint: u64,
}

impl RootMetadata {
    pub fn for_layout(layout: &TreeLayout) -> Self {
        RootMetadata {
            version: FORMAT_VERSION,
            streams: layout.streams().len() as u16,
            block_size: layout.block_size() as u32,
            fingerprint: layout.fingerprint(),
        }
    }

    fn encode(&self, out: &mut [u8]) {
        write_u32(out, 0, ROOT_MAGIC);
        write_u16(out, 4, self.version);
        write_u16(out, 6, self.streams);
        write_u32(out, 8, self.block_size);
        write_u64(out, 16, self.fingerprint);
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ROOT_METADATA_SIZE || read_u32(bytes, 0) != ROOT_MAGIC {
            return None;
        }
        Some(RootMetadata {
            version: read_u16(bytes, 4),
            streams: read_u16(bytes, 6),
            block_size: read_u32(bytes, 8),
            fingerprint: read_u64(bytes, 16),
        })
    }
}

/// One node, held as an owned copy of its block.
#[derive(Debug, Clone)]
pub struct Node {
    id: BlockId,
    block: Block,
}

impl Node {
    fn empty(id: BlockId, layout: &TreeLayout, level: u8) -> Result<Self, CapacityExceeded> {
        let mut block = Block::zeroed(layout.block_size());
        write_u16(&mut block, 0, NODE_MAGIC);
        block[2] = if level == 0 { FLAG_LEAF } else { 0 };
        block[3] = level;
        block[4] = layout.streams().len() as u8;
        let mut alloc = PackedAllocator::init(&mut block[NODE_HEADER_SIZE..], layout.region_count())?;
        for stream in 0..layout.streams().len() {
            alloc.set_tag(stream, TAG_STREAM);
        }
        alloc.set_tag(layout.children_region(), TAG_CHILDREN);
        alloc.set_tag(layout.meta_region(), TAG_META);
        Ok(Node { id, block })
    }

    pub fn empty_leaf(id: BlockId, layout: &TreeLayout) -> Result<Self, CapacityExceeded> {
        Self::empty(id, layout, 0)
    }

    pub fn empty_branch(id: BlockId, layout: &TreeLayout, level: u8) -> Result<Self, CapacityExceeded> {
        debug_assert!(level > 0);
        Self::empty(id, layout, level)
    }

    /// Wraps a block read from the provider, checking its header and layout.
    pub fn from_block(id: BlockId, block: Block, layout: &TreeLayout) -> Result<Self> {
        if block.len() != layout.block_size() {
            return Err(Error::invariant(id, "read", "block size differs from layout"));
        }
        if read_u16(&block, 0) != NODE_MAGIC {
            return Err(Error::invariant(id, "read", "missing node magic"));
        }
        if usize::from(block[4]) != layout.streams().len() {
            return Err(Error::invariant(id, "read", "stream count differs from layout"));
        }
        PackedAllocatorRef::new(&block[NODE_HEADER_SIZE..])
            .validate(layout.region_count())
            .map_err(|detail| Error::invariant(id, "read", detail))?;
        let node = Node { id, block };
        if node.is_leaf() != (node.level() == 0) {
            return Err(Error::invariant(id, "read", "leaf flag disagrees with level"));
        }
        Ok(node)
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    /// A copy of this node that will be written to block `id`.
    pub fn with_id(&self, id: BlockId) -> Self {
        Node {
            id,
            block: self.block.clone(),
        }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn level(&self) -> u8 {
        self.block[3]
    }

    pub fn is_leaf(&self) -> bool {
        self.block[2] & FLAG_LEAF != 0
    }

    pub fn is_root(&self) -> bool {
        self.block[2] & FLAG_ROOT != 0
    }

    pub fn allocator(&self) -> PackedAllocatorRef<'_> {
        PackedAllocatorRef::new(&self.block[NODE_HEADER_SIZE..])
    }

    pub fn allocator_mut(&mut self) -> PackedAllocator<'_> {
        PackedAllocator::new(&mut self.block[NODE_HEADER_SIZE..])
    }

    /// Bytes of the block in use.
    pub fn used(&self) -> usize {
        NODE_HEADER_SIZE + self.allocator().used()
    }

    pub fn root_metadata(&self, layout: &TreeLayout) -> Option<RootMetadata> {
        RootMetadata::decode(self.allocator().bytes(layout.meta_region()))
    }

    /// Flags the node as root (writing the metadata record) or clears the flag
    /// (releasing the record's bytes).
    pub fn set_root(&mut self, layout: &TreeLayout, root: bool) -> Result<(), CapacityExceeded> {
        let region = layout.meta_region();
        if root {
            let mut alloc = self.allocator_mut();
            alloc.resize(region, ROOT_METADATA_SIZE)?;
            RootMetadata::for_layout(layout).encode(alloc.bytes_mut(region));
            self.block[2] |= FLAG_ROOT;
        } else {
            self.allocator_mut().free(region);
            self.block[2] &= !FLAG_ROOT;
        }
        Ok(())
    }

    pub fn as_node_ref<'a>(&'a self, layout: &'a TreeLayout) -> NodeRef<'a> {
        if self.is_leaf() {
            NodeRef::Leaf(LeafNode::new(self, layout))
        } else {
            NodeRef::Branch(BranchNode::new(self, layout))
        }
    }

    pub fn as_node_mut<'a>(&'a mut self, layout: &'a TreeLayout) -> MutNodeRef<'a> {
        if self.is_leaf() {
            MutNodeRef::Leaf(LeafNodeMut::new(self, layout))
        } else {
            MutNodeRef::Branch(BranchNodeMut::new(self, layout))
        }
    }

    /// # Panics
    ///
    /// Panics if this is not a leaf.
    pub fn leaf<'a>(&'a self, layout: &'a TreeLayout) -> LeafNode<'a> {
        self.as_node_ref(layout).into_leaf()
    }

    /// # Panics
    ///
    /// Panics if this is not a branch.
    pub fn branch<'a>(&'a self, layout: &'a TreeLayout) -> BranchNode<'a> {
        self.as_node_ref(layout).into_branch()
    }

    pub fn leaf_mut<'a>(&'a mut self, layout: &'a TreeLayout) -> LeafNodeMut<'a> {
        self.as_node_mut(layout).into_leaf()
    }

    pub fn branch_mut<'a>(&'a mut self, layout: &'a TreeLayout) -> BranchNodeMut<'a> {
        self.as_node_mut(layout).into_branch()
    }

    pub fn summary<N: ArrayLength>(&self, layout: &TreeLayout) -> BranchNodeEntry<N> {
        self.as_node_ref(layout).summary()
    }

    /// True when the node holds no elements (leaf) or no children (branch).
    pub fn is_empty(&self, layout: &TreeLayout) -> bool {
        self.as_node_ref(layout).is_empty()
    }

    /// Moves everything from `points` onwards into the empty node `right`.
    ///
    /// For leaves `points` holds one split index per stream; for branches it
    /// holds the first child index to move.
    pub fn move_tail(&mut self, right: &mut Node, layout: &TreeLayout, points: &[usize]) -> Result<(), CapacityExceeded> {
        match self.as_node_mut(layout) {
            MutNodeRef::Leaf(mut left) => {
                let mut target = right.leaf_mut(layout);
                for (stream, point) in points.iter().enumerate() {
                    let size = left.as_ref().size(stream);
                    target.splice(stream, 0, &left.as_ref(), *point, size)?;
                    left.remove(stream, *point, size)?;
                }
            }
            MutNodeRef::Branch(mut left) => {
                let mut target = right.branch_mut(layout);
                let size = left.as_ref().size();
                target.splice(0, &left.as_ref(), points[0], size)?;
                left.remove_children(points[0], size)?;
            }
        }
        Ok(())
    }

    /// Appends all of `right`'s content after this node's.
    pub fn append(&mut self, right: &Node, layout: &TreeLayout) -> Result<(), CapacityExceeded> {
        match (self.as_node_mut(layout), right.as_node_ref(layout)) {
            (MutNodeRef::Leaf(mut left), NodeRef::Leaf(right)) => {
                for stream in 0..layout.streams().len() {
                    let at = left.as_ref().size(stream);
                    left.splice(stream, at, &right, 0, right.size(stream))?;
                }
            }
            (MutNodeRef::Branch(mut left), NodeRef::Branch(right)) => {
                let at = left.as_ref().size();
                left.splice(at, &right, 0, right.size())?;
            }
            _ => panic!("Mismatched node types"),
        }
        Ok(())
    }
}

use generic_array::ArrayLength;

use crate::config::TreeLayout;
use crate::error::CapacityExceeded;
use crate::packed::Find;
use crate::packed::PackedTree;
use crate::packed::PackedTreeMut;
use crate::packed::SearchType;
use crate::provider::BlockId;
use crate::tree::BranchNodeEntry;

use super::Node;

/// Read-only view of a branch node.
///
/// Child `i`'s summary entry is split across the stream regions: region `s`
/// holds, per child, the size column and channel columns of stream `s`.
#[derive(Debug, Clone, Copy)]
pub struct BranchNode<'a> {
    node: &'a Node,
    layout: &'a TreeLayout,
}

impl<'a> BranchNode<'a> {
    pub fn new(node: &'a Node, layout: &'a TreeLayout) -> Self {
        BranchNode { node, layout }
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    fn children(&self) -> PackedTree<'a> {
        let region = self.layout.children_region();
        PackedTree::new(self.node.allocator().bytes(region), self.layout.children_spec())
    }

    fn stream(&self, stream: usize) -> PackedTree<'a> {
        PackedTree::new(self.node.allocator().bytes(stream), self.layout.branch_spec(stream))
    }

    /// Number of children.
    pub fn size(&self) -> usize {
        self.children().size()
    }

    pub fn child_id(&self, idx: usize) -> BlockId {
        BlockId(self.children().value(idx, 0))
    }

    pub fn entry<N: ArrayLength>(&self, idx: usize) -> BranchNodeEntry<N> {
        let mut entry = TreeLayout::zero::<N>();
        for stream in 0..self.layout.streams().len() {
            let row = self.layout.row(stream);
            self.stream(stream).read(idx, &mut entry[row]);
        }
        entry
    }

    /// Combined entries of children `[from, to)`.
    pub fn sum_entries<N: ArrayLength>(&self, from: usize, to: usize) -> BranchNodeEntry<N> {
        let mut entry = TreeLayout::zero::<N>();
        for stream in 0..self.layout.streams().len() {
            let tree = self.stream(stream);
            for (local, column) in self.layout.row(stream).enumerate() {
                entry[column] = tree.sum(local, from, to);
            }
        }
        entry
    }

    pub fn summary<N: ArrayLength>(&self) -> BranchNodeEntry<N> {
        self.sum_entries(0, self.size())
    }

    /// Value of summary column `column` for child `idx`.
    pub fn column(&self, idx: usize, column: usize) -> u64 {
        let (stream, local) = self.layout.locate_column(column);
        self.stream(stream).value(idx, local)
    }

    pub fn column_sum(&self, column: usize, from: usize, to: usize) -> u64 {
        let (stream, local) = self.layout.locate_column(column);
        self.stream(stream).sum(local, from, to)
    }

    pub fn find_forward(&self, column: usize, start: usize, target: u64, search: SearchType) -> Find {
        let (stream, local) = self.layout.locate_column(column);
        self.stream(stream).find_forward(local, start, target, search)
    }

    pub fn find_backward(&self, column: usize, end: usize, target: u64, search: SearchType) -> Find {
        let (stream, local) = self.layout.locate_column(column);
        self.stream(stream).find_backward(local, end, target, search)
    }

    pub fn split_point(&self) -> usize {
        (self.size() / 2).clamp(1, self.size().saturating_sub(1).max(1))
    }
}

/// Mutable view of a branch node.
///
/// Child ids and per-stream rows live in separate regions, so a failed
/// [`insert_child`](Self::insert_child) or [`splice`](Self::splice) may leave
/// the node half-updated. Callers attempt these on a copy of the node.
#[derive(Debug)]
pub struct BranchNodeMut<'a> {
    node: &'a mut Node,
    layout: &'a TreeLayout,
}

impl<'a> BranchNodeMut<'a> {
    pub fn new(node: &'a mut Node, layout: &'a TreeLayout) -> Self {
        BranchNodeMut { node, layout }
    }

    pub fn as_ref(&self) -> BranchNode<'_> {
        BranchNode::new(self.node, self.layout)
    }

    /// Inserts child `id` with summary `entry` before child `idx`.
    ///
    /// Fails when the branching factor is reached or the bytes run out.
    pub fn insert_child<N: ArrayLength>(&mut self, idx: usize, id: BlockId, entry: &BranchNodeEntry<N>) -> Result<(), CapacityExceeded> {
        if self.as_ref().size() >= self.layout.branching_factor() {
            return Err(CapacityExceeded);
        }
        let layout = self.layout;
        let mut alloc = self.node.allocator_mut();
        PackedTreeMut::new(&mut alloc, layout.children_region(), layout.children_spec()).insert(idx, &[id.0])?;
        for stream in 0..layout.streams().len() {
            PackedTreeMut::new(&mut alloc, stream, layout.branch_spec(stream)).insert(idx, &entry[layout.row(stream)])?;
        }
        Ok(())
    }

    /// Overwrites child `idx`'s summary. Rows are fixed width, so this never grows the node.
    pub fn set_entry<N: ArrayLength>(&mut self, idx: usize, entry: &BranchNodeEntry<N>) -> Result<(), CapacityExceeded> {
        let layout = self.layout;
        let mut alloc = self.node.allocator_mut();
        for stream in 0..layout.streams().len() {
            PackedTreeMut::new(&mut alloc, stream, layout.branch_spec(stream)).update(idx, &entry[layout.row(stream)])?;
        }
        Ok(())
    }

    /// Removes children `[from, to)`.
    pub fn remove_children(&mut self, from: usize, to: usize) -> Result<(), CapacityExceeded> {
        let layout = self.layout;
        let mut alloc = self.node.allocator_mut();
        PackedTreeMut::new(&mut alloc, layout.children_region(), layout.children_spec()).remove(from, to)?;
        for stream in 0..layout.streams().len() {
            PackedTreeMut::new(&mut alloc, stream, layout.branch_spec(stream)).remove(from, to)?;
        }
        Ok(())
    }

    /// Inserts children `[from, to)` of `src`, with their entries, before child `at`.
    pub fn splice(&mut self, at: usize, src: &BranchNode<'_>, from: usize, to: usize) -> Result<(), CapacityExceeded> {
        if from == to {
            return Ok(());
        }
        if self.as_ref().size() + (to - from) > self.layout.branching_factor() {
            return Err(CapacityExceeded);
        }
        let layout = self.layout;
        let mut alloc = self.node.allocator_mut();
        PackedTreeMut::new(&mut alloc, layout.children_region(), layout.children_spec()).splice(at, &src.children(), from, to)?;
        for stream in 0..layout.streams().len() {
            PackedTreeMut::new(&mut alloc, stream, layout.branch_spec(stream)).splice(at, &src.stream(stream), from, to)?;
        }
        Ok(())
    }
}

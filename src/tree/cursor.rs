use alloc::vec::Vec;

use generic_array::ArrayLength;

use crate::provider::BlockId;

use super::BranchNodeEntry;
use super::PathStep;

/// Where a [`Cursor`] stands relative to its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// One step before the first element.
    BeforeBegin,
    /// On an element.
    Entry,
    /// One step past the last element.
    End,
}

/// A position in one stream of a tree.
///
/// A cursor records the root-to-leaf path it was found on, so it is only
/// valid until the tree is next modified by anything other than the cursor
/// itself. Movement goes through the owning tree, e.g.
/// [`RawTree::skip_forward_in`](super::RawTree::skip_forward_in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor<N: ArrayLength> {
    pub(crate) stream: usize,
    pub(crate) size_column: usize,
    pub(crate) path: Vec<PathStep>,
    pub(crate) leaf: BlockId,
    pub(crate) idx: usize,
    pub(crate) leaf_size: usize,
    /// Combined summary of everything left of the leaf.
    pub(crate) prefix: BranchNodeEntry<N>,
    pub(crate) state: CursorState,
}

impl<N: ArrayLength> Cursor<N> {
    pub(crate) fn new(
        stream: usize,
        size_column: usize,
        path: Vec<PathStep>,
        leaf: BlockId,
        idx: usize,
        leaf_size: usize,
        prefix: BranchNodeEntry<N>,
    ) -> Self {
        let mut cursor = Cursor {
            stream,
            size_column,
            path,
            leaf,
            idx,
            leaf_size,
            prefix,
            state: CursorState::Entry,
        };
        cursor.settle();
        cursor
    }

    /// Recomputes the state from the local index.
    pub(crate) fn settle(&mut self) {
        self.state = if self.idx < self.leaf_size {
            CursorState::Entry
        } else {
            CursorState::End
        };
    }

    pub fn stream(&self) -> usize {
        self.stream
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_end(&self) -> bool {
        self.state == CursorState::End
    }

    pub fn is_before_begin(&self) -> bool {
        self.state == CursorState::BeforeBegin
    }

    /// Index of the element under the cursor within the stream.
    ///
    /// At [`CursorState::End`] this is the stream size; at
    /// [`CursorState::BeforeBegin`] it is 0.
    pub fn position(&self) -> u64 {
        match self.state {
            CursorState::BeforeBegin => 0,
            _ => self.prefix[self.size_column] + self.idx as u64,
        }
    }

    /// The leaf block holding the element.
    pub fn leaf(&self) -> BlockId {
        self.leaf
    }

    /// Index of the element within its leaf.
    pub fn local_index(&self) -> usize {
        self.idx
    }

    /// The branches descended through, root first.
    pub fn path(&self) -> &[PathStep] {
        &self.path
    }

    /// Combined summary of all leaves before the cursor's leaf.
    pub fn prefix(&self) -> &BranchNodeEntry<N> {
        &self.prefix
    }
}

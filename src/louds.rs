//! Level-order unary degree sequence.
//!
//! The tree is written breadth first: a `10` super-root, then for every node
//! `degree` ones followed by a zero. Each node is identified by the position
//! of the one that introduced it, so the root sits at position 0. Navigation
//! is rank and select over the bit sequence.

use generic_array::ArrayLength;
use typenum::U8;

use crate::error::Result;
use crate::provider::BlockProvider;
use crate::provider::MemoryBlockProvider;
use crate::sequence::SymbolSequence;

/// A node of a [`Louds`] tree: the bit position of its introducing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoudsNode(pub u64);

/// An ordinal tree stored as a LOUDS bit sequence.
///
/// # Example
///
/// ```
/// use packed_btree::{Louds, LoudsNode};
///
/// // root -> (a -> c), b
/// let louds = Louds::from_degrees(256, [2, 1, 0, 0])?;
/// let root = louds.root();
/// let a = louds.first_child(root)?.unwrap();
/// assert_eq!(louds.children_count(root)?, 2);
/// assert_eq!(louds.parent(a)?, Some(root));
/// assert_eq!(louds.node_index(louds.last_child(a)?.unwrap())?, 3);
/// # Ok::<(), packed_btree::Error>(())
/// ```
#[derive(Debug)]
pub struct Louds<P: BlockProvider = MemoryBlockProvider, N: ArrayLength = U8> {
    bits: SymbolSequence<P, N>,
}

impl Louds<MemoryBlockProvider, U8> {
    /// An empty tree in a fresh in-memory provider.
    pub fn with_block_size(block_size: usize) -> Result<Self> {
        Louds::create(MemoryBlockProvider::new(block_size))
    }

    /// Builds a tree from node degrees listed in breadth-first order.
    pub fn from_degrees<I: IntoIterator<Item = usize>>(block_size: usize, degrees: I) -> Result<Self> {
        let mut louds = Louds::with_block_size(block_size)?;
        for degree in degrees {
            louds.push_node(degree)?;
        }
        Ok(louds)
    }
}

impl<P: BlockProvider, N: ArrayLength> Louds<P, N> {
    /// An empty tree in `provider`: only the super-root is written.
    pub fn create(provider: P) -> Result<Self> {
        let mut bits = SymbolSequence::create(provider, 1)?;
        bits.push(1)?;
        bits.push(0)?;
        Ok(Louds { bits })
    }

    pub fn bits(&self) -> &SymbolSequence<P, N> {
        &self.bits
    }

    /// Appends the next node in breadth-first order.
    pub fn push_node(&mut self, degree: usize) -> Result<()> {
        for _ in 0..degree {
            self.bits.push(1)?;
        }
        self.bits.push(0)
    }

    /// Number of nodes, counting only those whose degree has been written.
    pub fn len(&self) -> Result<u64> {
        Ok(self.bits.count(0)?.saturating_sub(1))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn root(&self) -> LoudsNode {
        LoudsNode(0)
    }

    fn bit(&self, position: u64) -> Result<bool> {
        Ok(self.bits.get(position)? == Some(1))
    }

    fn node_if_set(&self, position: u64) -> Result<Option<LoudsNode>> {
        Ok(self.bit(position)?.then_some(LoudsNode(position)))
    }

    /// Breadth-first index of `node`, the root being 0.
    pub fn node_index(&self, node: LoudsNode) -> Result<u64> {
        Ok(self.bits.rank(node.0 + 1, 1)? - 1)
    }

    /// The node with breadth-first index `index`.
    pub fn node_at(&self, index: u64) -> Result<Option<LoudsNode>> {
        Ok(self.bits.select(1, index + 1)?.map(LoudsNode))
    }

    pub fn first_child(&self, node: LoudsNode) -> Result<Option<LoudsNode>> {
        let ones = self.bits.rank(node.0 + 1, 1)?;
        match self.bits.select(0, ones)? {
            Some(zero) => self.node_if_set(zero + 1),
            None => Ok(None),
        }
    }

    pub fn last_child(&self, node: LoudsNode) -> Result<Option<LoudsNode>> {
        let ones = self.bits.rank(node.0 + 1, 1)?;
        match self.bits.select(0, ones + 1)? {
            Some(zero) => self.node_if_set(zero - 1),
            None => Ok(None),
        }
    }

    pub fn next_sibling(&self, node: LoudsNode) -> Result<Option<LoudsNode>> {
        self.node_if_set(node.0 + 1)
    }

    pub fn prev_sibling(&self, node: LoudsNode) -> Result<Option<LoudsNode>> {
        match node.0 {
            0 => Ok(None),
            position => self.node_if_set(position - 1),
        }
    }

    pub fn parent(&self, node: LoudsNode) -> Result<Option<LoudsNode>> {
        let zeros = self.bits.rank(node.0, 0)?;
        Ok(self.bits.select(1, zeros)?.map(LoudsNode))
    }

    pub fn is_leaf(&self, node: LoudsNode) -> Result<bool> {
        Ok(self.first_child(node)?.is_none())
    }

    pub fn children_count(&self, node: LoudsNode) -> Result<u64> {
        match (self.first_child(node)?, self.last_child(node)?) {
            (Some(first), Some(last)) => Ok(last.0 - first.0 + 1),
            _ => Ok(0),
        }
    }

    /// Children of `node`, left to right.
    pub fn children(&self, node: LoudsNode) -> Result<impl Iterator<Item = LoudsNode>> {
        let first = self.first_child(node)?;
        let count = self.children_count(node)?;
        Ok(first.into_iter().flat_map(move |first| (0..count).map(move |i| LoudsNode(first.0 + i))))
    }
}

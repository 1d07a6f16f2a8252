//! Ergonomic wrapper for the block-backed tree.
//!
//! This module provides [`Tree<P, N>`], a wrapper around [`RawTree`] that
//! owns its block provider, so callers never pass the provider by hand.

#[cfg(feature = "std")]
use alloc::boxed::Box;
#[cfg(feature = "std")]
use alloc::string::String;
#[cfg(feature = "std")]
use std::error::Error as StdError;

use generic_array::ArrayLength;
use typenum::U8;

use crate::config::TreeConfig;
use crate::config::TreeLayout;
use crate::error::Result;
use crate::packed::SearchType;
use crate::packed::Value;
use crate::provider::BlockId;
use crate::provider::BlockProvider;
use crate::provider::MemoryBlockProvider;

use super::BranchNodeEntry;
use super::Cursor;
use super::Iter;
use super::RawTree;
use super::TreeStats;

/// A block-backed tree that owns its provider.
///
/// This is the recommended type for most use cases.
///
/// # Example
///
/// ```
/// use packed_btree::{StreamDescriptor, Tree, TreeConfig, Value};
///
/// let config = TreeConfig::new(512).with_stream(StreamDescriptor::symbols(2));
/// let mut tree: Tree = Tree::new(&config)?;
/// for symbol in [3, 1, 3, 0] {
///     tree.push(0, &Value::Symbol(symbol))?;
/// }
///
/// assert_eq!(tree.get(0, 2)?, Some(Value::Symbol(3)));
/// assert_eq!(tree.rank(0, 4, 3)?, 2);
/// # Ok::<(), packed_btree::Error>(())
/// ```
#[derive(Debug)]
pub struct Tree<P: BlockProvider = MemoryBlockProvider, N: ArrayLength = U8> {
    provider: P,
    raw: RawTree<N>,
}

impl<N: ArrayLength> Tree<MemoryBlockProvider, N> {
    /// Creates an empty tree in a fresh in-memory provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &TreeConfig) -> Result<Self> {
        Self::create(MemoryBlockProvider::new(config.block_size), config)
    }
}

impl<P: BlockProvider, N: ArrayLength> Tree<P, N> {
    /// Creates an empty tree in `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the root block
    /// cannot be allocated.
    pub fn create(mut provider: P, config: &TreeConfig) -> Result<Self> {
        let raw = RawTree::create_in(&mut provider, config)?;
        Ok(Tree { provider, raw })
    }

    /// Opens the tree rooted at `root` in `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not the root of a tree with this configuration.
    pub fn open(provider: P, root: BlockId, config: &TreeConfig) -> Result<Self> {
        let raw = RawTree::open_in(&provider, root, config)?;
        Ok(Tree { provider, raw })
    }

    /// Gives back the provider and the raw tree.
    pub fn into_parts(self) -> (P, RawTree<N>) {
        (self.provider, self.raw)
    }

    /// Frees every block of the tree and returns the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if a block cannot be read or freed.
    pub fn destroy(mut self) -> Result<P> {
        self.raw.destroy_in(&mut self.provider)?;
        Ok(self.provider)
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn raw(&self) -> &RawTree<N> {
        &self.raw
    }

    pub fn root(&self) -> BlockId {
        self.raw.root()
    }

    pub fn layout(&self) -> &TreeLayout {
        self.raw.layout()
    }

    /// Returns the number of elements in `stream`.
    pub fn size(&self, stream: usize) -> Result<u64> {
        self.raw.size_in(&self.provider, stream)
    }

    /// Returns `true` if `stream` holds no elements.
    pub fn is_empty(&self, stream: usize) -> Result<bool> {
        Ok(self.size(stream)? == 0)
    }

    pub fn depth(&self) -> Result<usize> {
        self.raw.depth_in(&self.provider)
    }

    pub fn summary(&self) -> Result<BranchNodeEntry<N>> {
        self.raw.summary_in(&self.provider)
    }

    pub fn seek(&self, stream: usize, position: u64) -> Result<Cursor<N>> {
        self.raw.seek_in(&self.provider, stream, position)
    }

    pub fn begin(&self, stream: usize) -> Result<Cursor<N>> {
        self.raw.begin_in(&self.provider, stream)
    }

    pub fn end(&self, stream: usize) -> Result<Cursor<N>> {
        self.raw.end_in(&self.provider, stream)
    }

    /// See [`RawTree::find_in`].
    pub fn find(&self, stream: usize, channel: usize, key: u64, search: SearchType) -> Result<Cursor<N>> {
        self.raw.find_in(&self.provider, stream, channel, key, search)
    }

    /// See [`RawTree::rank_in`].
    pub fn rank(&self, stream: usize, position: u64, channel: usize) -> Result<u64> {
        self.raw.rank_in(&self.provider, stream, position, channel)
    }

    /// See [`RawTree::select_in`].
    pub fn select(&self, stream: usize, channel: usize, k: u64) -> Result<Option<u64>> {
        self.raw.select_in(&self.provider, stream, channel, k)
    }

    pub fn value(&self, cursor: &Cursor<N>) -> Result<Option<Value>> {
        self.raw.value_in(&self.provider, cursor)
    }

    /// Returns the element at `position` of `stream`.
    pub fn get(&self, stream: usize, position: u64) -> Result<Option<Value>> {
        let cursor = self.seek(stream, position)?;
        self.value(&cursor)
    }

    pub fn skip_forward(&self, cursor: &mut Cursor<N>, n: u64) -> Result<u64> {
        self.raw.skip_forward_in(&self.provider, cursor, n)
    }

    pub fn skip_backward(&self, cursor: &mut Cursor<N>, n: u64) -> Result<u64> {
        self.raw.skip_backward_in(&self.provider, cursor, n)
    }

    pub fn next(&self, cursor: &mut Cursor<N>) -> Result<bool> {
        self.raw.next_in(&self.provider, cursor)
    }

    pub fn prev(&self, cursor: &mut Cursor<N>) -> Result<bool> {
        self.raw.prev_in(&self.provider, cursor)
    }

    /// See [`RawTree::insert_in`].
    pub fn insert(&mut self, cursor: &mut Cursor<N>, value: &Value) -> Result<()> {
        self.raw.insert_in(&mut self.provider, cursor, value)
    }

    /// Inserts `value` so that it ends up at `position` (clamped to the end).
    pub fn insert_at(&mut self, stream: usize, position: u64, value: &Value) -> Result<()> {
        let mut cursor = self.seek(stream, position)?;
        self.insert(&mut cursor, value)
    }

    /// Appends `value` to `stream`.
    pub fn push(&mut self, stream: usize, value: &Value) -> Result<()> {
        let mut cursor = self.end(stream)?;
        self.insert(&mut cursor, value)
    }

    /// See [`RawTree::update_in`].
    pub fn update(&mut self, cursor: &mut Cursor<N>, value: &Value) -> Result<Option<Value>> {
        self.raw.update_in(&mut self.provider, cursor, value)
    }

    /// See [`RawTree::remove_in`].
    pub fn remove(&mut self, cursor: &mut Cursor<N>) -> Result<Option<Value>> {
        self.raw.remove_in(&mut self.provider, cursor)
    }

    /// Removes and returns the element at `position` of `stream`.
    pub fn remove_at(&mut self, stream: usize, position: u64) -> Result<Option<Value>> {
        let mut cursor = self.seek(stream, position)?;
        self.remove(&mut cursor)
    }

    pub fn iter(&self, stream: usize) -> Result<Iter<'_, P, N>> {
        self.raw.iter_in(&self.provider, stream)
    }

    pub fn iter_from(&self, cursor: Cursor<N>) -> Result<Iter<'_, P, N>> {
        self.raw.iter_from_in(&self.provider, cursor)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.raw.clear_in(&mut self.provider)
    }

    pub fn check(&self) -> Result<()> {
        self.raw.check_in(&self.provider)
    }

    pub fn stats(&self) -> Result<TreeStats> {
        self.raw.stats_in(&self.provider)
    }
}

#[cfg(feature = "std")]
impl<P: BlockProvider, N: ArrayLength> Tree<P, N> {
    pub fn to_dot(&self) -> Result<String, Box<dyn StdError>> {
        self.raw.to_dot_in(&self.provider)
    }
}

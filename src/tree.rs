use alloc::vec;
use alloc::vec::Vec;
use core::marker::PhantomData;

#[cfg(feature = "std")]
use alloc::boxed::Box;
#[cfg(feature = "std")]
use alloc::format;
#[cfg(feature = "std")]
use alloc::string::String;
#[cfg(feature = "std")]
use std::error::Error as StdError;
#[cfg(feature = "std")]
use std::io::Write;

use generic_array::ArrayLength;
use generic_array::GenericArray;
use tracing::debug;
use tracing::trace;
use typenum::U8;

use crate::config::TreeConfig;
use crate::config::TreeLayout;
use crate::error::Error;
use crate::error::Result;
use crate::node::dispatch;
use crate::node::BranchNode;
use crate::node::LeafNode;
use crate::node::Node;
use crate::node::NodeRef;
use crate::node::NodeVisitor;
use crate::node::RootMetadata;
use crate::packed::Value;
use crate::provider::BlockId;
use crate::provider::BlockProvider;

mod cursor;
mod iters;
mod update;
mod walk;
mod wrapper;

#[cfg(test)]
mod tests;

pub use cursor::{Cursor, CursorState};
pub use iters::Iter;
pub use wrapper::Tree;

/// Summary of a subtree: per stream, the element count followed by one
/// aggregated value per channel.
pub type BranchNodeEntry<N> = GenericArray<u64, N>;

/// One step of a root-to-leaf path: the branch `id` and the child index taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    pub id: BlockId,
    pub idx: usize,
}

/// Shape and fill of a tree, as reported by [`RawTree::stats_in`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub depth: usize,
    pub leaves: usize,
    pub branches: usize,
    /// Bytes in use across all blocks.
    pub used_bytes: usize,
    /// Bytes provided by all blocks.
    pub capacity_bytes: usize,
    /// Elements per stream.
    pub elements: Vec<u64>,
    /// Nodes per level, leaves first.
    pub levels: Vec<usize>,
}

impl TreeStats {
    pub fn blocks(&self) -> usize {
        self.leaves + self.branches
    }
}

/// A tree stored in blocks of an external [`BlockProvider`].
///
/// This is the low-level "allocated" type: it holds only the root block id and
/// the derived layout, and every operation takes the provider explicitly. For
/// most use cases, prefer the [`Tree`] wrapper which owns its provider.
///
/// # Type Parameters
///
/// - `N`: width of summary entries. Must cover one size column plus one column
///   per channel for every stream (defaults to `U8`).
///
/// # Examples
///
/// ```
/// use packed_btree::{AggregateKind, MemoryBlockProvider, RawTree, StreamDescriptor, TreeConfig, Tuple, Value, ValueWidth};
///
/// let config = TreeConfig::new(256)
///     .with_stream(StreamDescriptor::indexed(1, ValueWidth::Fixed(16), AggregateKind::Sum));
/// let mut provider = MemoryBlockProvider::new(256);
/// let mut tree = RawTree::<typenum::U8>::create_in(&mut provider, &config)?;
///
/// let mut cursor = tree.end_in(&provider, 0)?;
/// tree.insert_in(&mut provider, &mut cursor, &Value::Tuple(Tuple::new(&[42])))?;
///
/// assert_eq!(tree.size_in(&provider, 0)?, 1);
/// # Ok::<(), packed_btree::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RawTree<N: ArrayLength = U8> {
    root: BlockId,
    layout: TreeLayout,
    _entry: PhantomData<N>,
}

impl<N: ArrayLength> RawTree<N> {
    /// Creates an empty tree: a single root leaf.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the configuration is invalid for `N`, its block
    /// size differs from the provider's, or the root block cannot be allocated.
    pub fn create_in<P: BlockProvider>(provider: &mut P, config: &TreeConfig) -> Result<Self> {
        let layout = config.validate::<N>()?;
        if provider.block_size() != layout.block_size() {
            return Err(Error::Config(alloc::format!(
                "provider blocks are {} bytes, configuration wants {}",
                provider.block_size(),
                layout.block_size()
            )));
        }
        let root = provider
            .allocate()
            .map_err(Error::provider("allocate", BlockId::UNASSIGNED))?;
        let tree = RawTree {
            root,
            layout,
            _entry: PhantomData,
        };
        let node = tree.fresh_root(root, 0)?;
        tree.write_node(provider, &node)?;
        debug!(root = %root, streams = tree.layout.streams().len(), "created tree");
        Ok(tree)
    }

    /// Re-opens a tree previously created with the same configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if `root` is not a root block or its
    /// metadata was written for a different configuration.
    pub fn open_in<P: BlockProvider>(provider: &P, root: BlockId, config: &TreeConfig) -> Result<Self> {
        let layout = config.validate::<N>()?;
        let tree = RawTree {
            root,
            layout,
            _entry: PhantomData,
        };
        let node = tree.read_node(provider, root)?;
        if !node.is_root() {
            return Err(Error::invariant(root, "open", "block is not a root"));
        }
        match node.root_metadata(&tree.layout) {
            Some(meta) if meta == RootMetadata::for_layout(&tree.layout) => {}
            Some(_) => return Err(Error::invariant(root, "open", "root metadata does not match configuration")),
            None => return Err(Error::invariant(root, "open", "root metadata missing")),
        }
        debug!(root = %root, level = node.level(), "opened tree");
        Ok(tree)
    }

    /// The root block id. It never changes over the life of the tree.
    pub fn root(&self) -> BlockId {
        self.root
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    fn fresh_root(&self, id: BlockId, level: u8) -> Result<Node> {
        let too_small = |_| Error::Config(alloc::string::String::from("block too small for an empty root"));
        let mut node = if level == 0 {
            Node::empty_leaf(id, &self.layout).map_err(too_small)?
        } else {
            Node::empty_branch(id, &self.layout, level).map_err(too_small)?
        };
        node.set_root(&self.layout, true).map_err(too_small)?;
        Ok(node)
    }

    pub(crate) fn check_stream(&self, stream: usize) -> Result<()> {
        if stream < self.layout.streams().len() {
            Ok(())
        } else {
            Err(Error::Config(alloc::format!("no stream {stream}")))
        }
    }

    pub(crate) fn read_node<P: BlockProvider>(&self, provider: &P, id: BlockId) -> Result<Node> {
        let block = provider.read(id).map_err(Error::provider("read", id))?;
        Node::from_block(id, block, &self.layout)
    }

    pub(crate) fn write_node<P: BlockProvider>(&self, provider: &mut P, node: &Node) -> Result<()> {
        trace!(block = %node.id(), used = node.used(), "write");
        provider
            .update(node.id(), node.block())
            .map_err(Error::provider("update", node.id()))
    }

    pub(crate) fn allocate_node_in<P: BlockProvider>(&self, provider: &mut P) -> Result<BlockId> {
        provider
            .allocate()
            .map_err(Error::provider("allocate", BlockId::UNASSIGNED))
    }

    pub(crate) fn free_node_in<P: BlockProvider>(&self, provider: &mut P, id: BlockId) -> Result<()> {
        debug!(block = %id, "free");
        provider.free(id).map_err(Error::provider("free", id))
    }

    /// Summary of the whole tree.
    pub fn summary_in<P: BlockProvider>(&self, provider: &P) -> Result<BranchNodeEntry<N>> {
        let root = self.read_node(provider, self.root)?;
        Ok(root.summary(&self.layout))
    }

    /// Number of elements in `stream`.
    pub fn size_in<P: BlockProvider>(&self, provider: &P, stream: usize) -> Result<u64> {
        self.check_stream(stream)?;
        Ok(self.summary_in(provider)?[self.layout.size_column(stream)])
    }

    /// Levels from root to leaves, counting both.
    pub fn depth_in<P: BlockProvider>(&self, provider: &P) -> Result<usize> {
        Ok(usize::from(self.read_node(provider, self.root)?.level()) + 1)
    }

    /// The element under `cursor`, or `None` at either sentinel.
    pub fn value_in<P: BlockProvider>(&self, provider: &P, cursor: &Cursor<N>) -> Result<Option<Value>> {
        if cursor.state() != CursorState::Entry {
            return Ok(None);
        }
        let node = self.read_node(provider, cursor.leaf())?;
        let leaf = node.leaf(&self.layout);
        if cursor.local_index() >= leaf.size(cursor.stream()) {
            return Err(Error::invariant(cursor.leaf(), "value", "cursor past the end of its leaf"));
        }
        Ok(Some(leaf.value(cursor.stream(), cursor.local_index())))
    }

    /// Walks every node and verifies the structural invariants: levels,
    /// root flags and metadata, no empty non-root nodes, and that every branch
    /// entry equals its child's summary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] naming the first offending block.
    pub fn check_in<P: BlockProvider>(&self, provider: &P) -> Result<()> {
        let root = self.read_node(provider, self.root)?;
        if !root.is_root() || root.root_metadata(&self.layout) != Some(RootMetadata::for_layout(&self.layout)) {
            return Err(Error::invariant(self.root, "check", "root flag or metadata missing"));
        }
        let level = root.level();
        self.check_subtree_in(provider, root, level)?;
        Ok(())
    }

    fn check_subtree_in<P: BlockProvider>(&self, provider: &P, node: Node, level: u8) -> Result<BranchNodeEntry<N>> {
        let id = node.id();
        if node.level() != level {
            return Err(Error::invariant(id, "check", alloc::format!("expected level {level}, found {}", node.level())));
        }
        if node.used() > self.layout.block_size() {
            return Err(Error::invariant(id, "check", "used bytes exceed block"));
        }
        if id != self.root && node.is_root() {
            return Err(Error::invariant(id, "check", "non-root block flagged as root"));
        }
        match node.as_node_ref(&self.layout) {
            NodeRef::Leaf(leaf) => {
                if id != self.root && leaf.is_empty() {
                    return Err(Error::invariant(id, "check", "empty non-root leaf"));
                }
                Ok(leaf.summary())
            }
            NodeRef::Branch(branch) => {
                if branch.size() == 0 {
                    return Err(Error::invariant(id, "check", "branch without children"));
                }
                for idx in 0..branch.size() {
                    let child = self.read_node(provider, branch.child_id(idx))?;
                    let summary = self.check_subtree_in(provider, child, level - 1)?;
                    if summary != branch.entry::<N>(idx) {
                        return Err(Error::invariant(id, "check", alloc::format!("stale summary for child {idx}")));
                    }
                }
                Ok(branch.summary())
            }
        }
    }

    /// Counts nodes and bytes.
    pub fn stats_in<P: BlockProvider>(&self, provider: &P) -> Result<TreeStats> {
        let mut visitor = StatsVisitor::<N> {
            stats: TreeStats::default(),
            children: Vec::new(),
            _entry: PhantomData,
        };
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let node = self.read_node(provider, id)?;
            dispatch(&node, &self.layout, &mut visitor);
            pending.append(&mut visitor.children);
        }
        let summary = self.summary_in(provider)?;
        visitor.stats.depth = self.depth_in(provider)?;
        visitor.stats.elements = (0..self.layout.streams().len())
            .map(|stream| summary[self.layout.size_column(stream)])
            .collect();
        Ok(visitor.stats)
    }

    /// Removes every element, freeing all blocks but the root.
    pub fn clear_in<P: BlockProvider>(&mut self, provider: &mut P) -> Result<()> {
        self.free_children_in(provider, self.root)?;
        let node = self.fresh_root(self.root, 0)?;
        self.write_node(provider, &node)?;
        debug!(root = %self.root, "cleared tree");
        Ok(())
    }

    /// Frees every block of the tree, the root included.
    pub fn destroy_in<P: BlockProvider>(self, provider: &mut P) -> Result<()> {
        self.free_children_in(provider, self.root)?;
        self.free_node_in(provider, self.root)
    }

    fn free_children_in<P: BlockProvider>(&self, provider: &mut P, id: BlockId) -> Result<()> {
        let node = self.read_node(provider, id)?;
        if let NodeRef::Branch(branch) = node.as_node_ref(&self.layout) {
            for idx in 0..branch.size() {
                let child = branch.child_id(idx);
                self.free_children_in(provider, child)?;
                self.free_node_in(provider, child)?;
            }
        }
        Ok(())
    }
}

struct StatsVisitor<N> {
    stats: TreeStats,
    children: Vec<BlockId>,
    _entry: PhantomData<N>,
}

impl<N> StatsVisitor<N> {
    fn count(&mut self, node: &Node) {
        let level = usize::from(node.level());
        if self.stats.levels.len() <= level {
            self.stats.levels.resize(level + 1, 0);
        }
        self.stats.levels[level] += 1;
        self.stats.used_bytes += node.used();
        self.stats.capacity_bytes += node.block().len();
    }
}

impl<N: ArrayLength> NodeVisitor for StatsVisitor<N> {
    type Output = ();

    fn visit_leaf(&mut self, leaf: &LeafNode<'_>) {
        self.count(leaf.node());
        self.stats.leaves += 1;
    }

    fn visit_branch(&mut self, branch: &BranchNode<'_>) {
        self.count(branch.node());
        self.stats.branches += 1;
        self.children.extend((0..branch.size()).map(|idx| branch.child_id(idx)));
    }
}

#[cfg(feature = "std")]
struct DotVisitor<'a, N> {
    data: &'a mut Vec<u8>,
    children: Vec<BlockId>,
    error: Option<std::io::Error>,
    _entry: PhantomData<N>,
}

#[cfg(feature = "std")]
impl<N: ArrayLength> DotVisitor<'_, N> {
    fn emit(&mut self, line: String) {
        if self.error.is_none() {
            if let Err(e) = self.data.write_all(line.as_bytes()) {
                self.error = Some(e);
            }
        }
    }
}

#[cfg(feature = "std")]
impl<N: ArrayLength> NodeVisitor for DotVisitor<'_, N> {
    type Output = ();

    fn visit_leaf(&mut self, leaf: &LeafNode<'_>) {
        let node = leaf.node();
        let summary: BranchNodeEntry<N> = leaf.summary();
        self.emit(format!(
            "\"b{}\" [shape=\"record\"; label=\"leaf {}|{:?}|{} bytes\"];\n",
            node.id().0,
            node.id(),
            summary.as_slice(),
            node.used()
        ));
    }

    fn visit_branch(&mut self, branch: &BranchNode<'_>) {
        let node = branch.node();
        let summary: BranchNodeEntry<N> = branch.summary();
        self.emit(format!(
            "\"b{}\" [shape=\"record\"; label=\"level {} {}|{:?}|{} bytes\"];\n",
            node.id().0,
            node.level(),
            node.id(),
            summary.as_slice(),
            node.used()
        ));
        for idx in 0..branch.size() {
            let child = branch.child_id(idx);
            self.emit(format!("\"b{}\" -> \"b{}\";\n", node.id().0, child.0));
            self.children.push(child);
        }
    }
}

#[cfg(feature = "std")]
impl<N: ArrayLength> RawTree<N> {
    /// Renders the tree in Graphviz dot format.
    pub fn to_dot_in<P: BlockProvider>(&self, provider: &P) -> Result<String, Box<dyn StdError>> {
        let mut data = Vec::default();

        data.write_all(b"digraph G {\n")?;
        data.write_all(b"rankdir=\"TB\";\n")?;
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let node = self.read_node(provider, id)?;
            let mut visitor = DotVisitor::<N> {
                data: &mut data,
                children: Vec::new(),
                error: None,
                _entry: PhantomData,
            };
            dispatch(&node, &self.layout, &mut visitor);
            if let Some(e) = visitor.error {
                return Err(e.into());
            }
            pending.extend(visitor.children.into_iter().rev());
        }
        data.write_all(b"}\n")?;

        Ok(String::from_utf8(data)?)
    }
}

use generic_array::ArrayLength;

use crate::config::StreamKind;
use crate::config::TreeLayout;
use crate::error::CapacityExceeded;
use crate::packed::Find;
use crate::packed::PackedSymbols;
use crate::packed::PackedSymbolsMut;
use crate::packed::PackedTree;
use crate::packed::PackedTreeMut;
use crate::packed::SearchType;
use crate::packed::Tuple;
use crate::packed::Value;
use crate::packed::MAX_CHANNELS;
use crate::tree::BranchNodeEntry;

use super::Node;

/// One stream of a leaf, viewed through its packed structure.
#[derive(Debug, Clone, Copy)]
pub enum LeafStream<'a> {
    Tree(PackedTree<'a>),
    Symbols(PackedSymbols<'a>),
}

impl LeafStream<'_> {
    pub fn size(&self) -> usize {
        match self {
            LeafStream::Tree(tree) => tree.size(),
            LeafStream::Symbols(symbols) => symbols.size(),
        }
    }

    pub fn value(&self, idx: usize) -> Value {
        match self {
            LeafStream::Tree(tree) => {
                let mut tuple = Tuple::zeroed(tree.spec().columns);
                tree.read(idx, tuple.as_mut_slice());
                Value::Tuple(tuple)
            }
            LeafStream::Symbols(symbols) => Value::Symbol(symbols.symbol(idx)),
        }
    }

    /// Searches channel `channel` (a tuple column or a symbol) from `start`.
    pub fn find_forward(&self, channel: usize, start: usize, target: u64, search: SearchType) -> Find {
        match self {
            LeafStream::Tree(tree) => tree.find_forward(channel, start, target, search),
            LeafStream::Symbols(symbols) => symbols.find_forward(channel as u8, start, target, search),
        }
    }

    /// Aggregate of `channel` over the first `end` elements.
    pub fn prefix(&self, channel: usize, end: usize) -> u64 {
        match self {
            LeafStream::Tree(tree) => tree.sum(channel, 0, end),
            LeafStream::Symbols(symbols) => symbols.rank(end, channel as u8) as u64,
        }
    }

    pub fn total(&self, channel: usize) -> u64 {
        match self {
            LeafStream::Tree(tree) => tree.total(channel),
            LeafStream::Symbols(symbols) => symbols.count(channel as u8) as u64,
        }
    }

    pub fn split_point(&self) -> usize {
        match self {
            LeafStream::Tree(tree) => tree.split_point(),
            LeafStream::Symbols(symbols) => symbols.split_point(),
        }
    }
}

/// Read-only view of a leaf node.
#[derive(Debug, Clone, Copy)]
pub struct LeafNode<'a> {
    node: &'a Node,
    layout: &'a TreeLayout,
}

impl<'a> LeafNode<'a> {
    pub fn new(node: &'a Node, layout: &'a TreeLayout) -> Self {
        LeafNode { node, layout }
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn stream(&self, stream: usize) -> LeafStream<'a> {
        let bytes = self.node.allocator().bytes(stream);
        let descriptor = self.layout.stream(stream);
        match descriptor.kind {
            StreamKind::IndexedTree => LeafStream::Tree(PackedTree::new(bytes, self.layout.leaf_spec(stream))),
            StreamKind::SymbolSequence => LeafStream::Symbols(PackedSymbols::new(bytes, descriptor.symbol_bits())),
        }
    }

    pub fn size(&self, stream: usize) -> usize {
        self.stream(stream).size()
    }

    pub fn is_empty(&self) -> bool {
        (0..self.layout.streams().len()).all(|stream| self.size(stream) == 0)
    }

    pub fn value(&self, stream: usize, idx: usize) -> Value {
        self.stream(stream).value(idx)
    }

    pub fn summary<N: ArrayLength>(&self) -> BranchNodeEntry<N> {
        let mut entry = TreeLayout::zero::<N>();
        for (stream, descriptor) in self.layout.streams().iter().enumerate() {
            let view = self.stream(stream);
            entry[self.layout.size_column(stream)] = view.size() as u64;
            for channel in 0..descriptor.channels {
                entry[self.layout.channel_column(stream, channel)] = view.total(channel);
            }
        }
        entry
    }
}

/// Flattens a value into the column slice its packed structure stores.
fn columns(value: &Value) -> ([u64; MAX_CHANNELS], usize) {
    let mut out = [0u64; MAX_CHANNELS];
    match value {
        Value::Tuple(tuple) => {
            out[..tuple.len()].copy_from_slice(tuple);
            (out, tuple.len())
        }
        Value::Symbol(symbol) => {
            out[0] = u64::from(*symbol);
            (out, 1)
        }
    }
}

/// Mutable view of a leaf node.
///
/// Every method either applies fully or returns [`CapacityExceeded`] with the
/// stream unchanged.
#[derive(Debug)]
pub struct LeafNodeMut<'a> {
    node: &'a mut Node,
    layout: &'a TreeLayout,
}

impl<'a> LeafNodeMut<'a> {
    pub fn new(node: &'a mut Node, layout: &'a TreeLayout) -> Self {
        LeafNodeMut { node, layout }
    }

    pub fn as_ref(&self) -> LeafNode<'_> {
        LeafNode::new(self.node, self.layout)
    }

    pub fn insert(&mut self, stream: usize, idx: usize, value: &Value) -> Result<(), CapacityExceeded> {
        let (values, len) = columns(value);
        let descriptor = self.layout.stream(stream);
        let mut alloc = self.node.allocator_mut();
        match descriptor.kind {
            StreamKind::IndexedTree => {
                PackedTreeMut::new(&mut alloc, stream, self.layout.leaf_spec(stream)).insert(idx, &values[..len])
            }
            StreamKind::SymbolSequence => {
                PackedSymbolsMut::new(&mut alloc, stream, descriptor.symbol_bits()).insert(idx, values[0] as u8)
            }
        }
    }

    pub fn update(&mut self, stream: usize, idx: usize, value: &Value) -> Result<(), CapacityExceeded> {
        let (values, len) = columns(value);
        let descriptor = self.layout.stream(stream);
        let mut alloc = self.node.allocator_mut();
        match descriptor.kind {
            StreamKind::IndexedTree => {
                PackedTreeMut::new(&mut alloc, stream, self.layout.leaf_spec(stream)).update(idx, &values[..len])
            }
            StreamKind::SymbolSequence => {
                PackedSymbolsMut::new(&mut alloc, stream, descriptor.symbol_bits()).update(idx, values[0] as u8)
            }
        }
    }

    pub fn remove(&mut self, stream: usize, from: usize, to: usize) -> Result<(), CapacityExceeded> {
        let descriptor = self.layout.stream(stream);
        let mut alloc = self.node.allocator_mut();
        match descriptor.kind {
            StreamKind::IndexedTree => {
                PackedTreeMut::new(&mut alloc, stream, self.layout.leaf_spec(stream)).remove(from, to)
            }
            StreamKind::SymbolSequence => {
                PackedSymbolsMut::new(&mut alloc, stream, descriptor.symbol_bits()).remove(from, to)
            }
        }
    }

    /// Inserts elements `[from, to)` of `src`'s stream before `at`.
    pub fn splice(&mut self, stream: usize, at: usize, src: &LeafNode<'_>, from: usize, to: usize) -> Result<(), CapacityExceeded> {
        if from == to {
            return Ok(());
        }
        let descriptor = self.layout.stream(stream);
        let source = src.stream(stream);
        let mut alloc = self.node.allocator_mut();
        match (descriptor.kind, source) {
            (StreamKind::IndexedTree, LeafStream::Tree(tree)) => {
                PackedTreeMut::new(&mut alloc, stream, self.layout.leaf_spec(stream)).splice(at, &tree, from, to)
            }
            (StreamKind::SymbolSequence, LeafStream::Symbols(symbols)) => {
                PackedSymbolsMut::new(&mut alloc, stream, descriptor.symbol_bits()).splice(at, &symbols, from, to)
            }
            _ => panic!("Mismatched stream kinds"),
        }
    }
}

use core::fmt;
use core::ops::Deref;

mod allocator;
mod symbols;
mod tree;

pub use allocator::{PackedAllocator, PackedAllocatorRef, Region};
pub use symbols::{PackedSymbols, PackedSymbolsMut};
pub use tree::{PackedTree, PackedTreeMut, PackedTreeSpec};

/// Maximum number of channels in one leaf tuple.
pub const MAX_CHANNELS: usize = 8;

/// Comparison used by key searches. The predicate is `value <op> target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Lt,
    Le,
    Gt,
    Ge,
}

impl SearchType {
    pub fn holds(self, value: u64, target: u64) -> bool {
        match self {
            SearchType::Lt => value < target,
            SearchType::Le => value <= target,
            SearchType::Gt => value > target,
            SearchType::Ge => value >= target,
        }
    }

    /// `Gt` and `Ge` turn true at some point and stay true over a running sum,
    /// which lets searches skip whole index blocks.
    pub(crate) fn is_upward(self) -> bool {
        matches!(self, SearchType::Gt | SearchType::Ge)
    }
}

/// Outcome of a `find_forward`/`find_backward` scan over one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Find {
    /// `idx` satisfied the predicate; `prefix` is the aggregate of the scanned
    /// elements strictly before it (in scan direction).
    Found { idx: usize, prefix: u64 },
    /// Nothing satisfied the predicate; `total` is the aggregate of everything scanned.
    NotFound { total: u64 },
}

/// A leaf tuple: one value per channel of an indexed stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tuple {
    len: u8,
    values: [u64; MAX_CHANNELS],
}

impl Tuple {
    /// # Panics
    ///
    /// Panics if more than [`MAX_CHANNELS`] values are given.
    pub fn new(values: &[u64]) -> Self {
        assert!(values.len() <= MAX_CHANNELS);
        let mut tuple = Tuple {
            len: values.len() as u8,
            values: [0; MAX_CHANNELS],
        };
        tuple.values[..values.len()].copy_from_slice(values);
        tuple
    }

    pub(crate) fn zeroed(len: usize) -> Self {
        Tuple {
            len: len as u8,
            values: [0; MAX_CHANNELS],
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u64] {
        &mut self.values[..usize::from(self.len)]
    }
}

impl Deref for Tuple {
    type Target = [u64];

    fn deref(&self) -> &[u64] {
        &self.values[..usize::from(self.len)]
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<const C: usize> From<[u64; C]> for Tuple {
    fn from(values: [u64; C]) -> Self {
        Tuple::new(&values)
    }
}

/// One element of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// An entry of an indexed stream.
    Tuple(Tuple),
    /// An entry of a symbol stream.
    Symbol(u8),
}

impl Value {
    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Value::Tuple(tuple) => Some(tuple),
            Value::Symbol(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<u8> {
        match self {
            Value::Symbol(symbol) => Some(*symbol),
            Value::Tuple(_) => None,
        }
    }
}

impl From<Tuple> for Value {
    fn from(tuple: Tuple) -> Self {
        Value::Tuple(tuple)
    }
}

//! A balanced tree engine whose nodes live in fixed-size blocks and whose
//! payload is stored in bit-packed streams.
//!
//! Every node is one block obtained from a [`BlockProvider`]. Inside a block a
//! small sub-allocator hands out variable-size regions; each region holds one
//! packed structure (a stream of leaf entries, the summary columns of a branch,
//! child block ids or the root metadata record). Capacity is measured in bytes
//! rather than entry counts: a node splits when an insert no longer fits and
//! merges when it drops below a fraction of its block.
//!
//! Every branch keeps, per child, a summary entry with the element count and
//! the aggregated columns (sums or maxima) of that child's subtree. All
//! positional and key-based navigation is expressed as a walker descending
//! from the root and consuming those summaries, which makes
//! `seek`, `find`, `rank` and `select` logarithmic.
//!
//! # Quick Start
//!
//! ```
//! use packed_btree::OrderedMap;
//!
//! let mut map = OrderedMap::with_block_size(512)?;
//! map.insert(5, 50)?;
//! map.insert(1, 10)?;
//! map.insert(9, 90)?;
//!
//! assert_eq!(map.get(1)?, Some(10));
//! assert_eq!(map.len()?, 3);
//! # Ok::<(), packed_btree::Error>(())
//! ```
//!
//! # Succinct sequences
//!
//! ```
//! use packed_btree::SymbolSequence;
//!
//! let mut bits = SymbolSequence::with_block_size(1, 256)?;
//! for i in 0..20u8 {
//!     bits.push(1 - i % 2)?;
//! }
//!
//! assert_eq!(bits.rank(20, 1)?, 10);
//! assert_eq!(bits.select(1, 10)?, Some(18));
//! # Ok::<(), packed_btree::Error>(())
//! ```
//!
//! # The Allocated Pattern
//!
//! As with allocator-aware collections, two layers are provided:
//!
//! - [`RawTree`] holds only the root block id and the derived layout. Every
//!   operation takes the [`BlockProvider`] explicitly (`*_in` methods), so
//!   several trees can share one provider.
//! - [`Tree`] owns its provider and forwards to the raw tree.

#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

extern crate alloc;

/// Variable- and fixed-width integer codecs used by packed streams.
pub mod codec;
mod common;
/// Tree layout configuration and validation.
pub mod config;
mod error;
/// A LOUDS ordinal-tree encoding on top of a 1-bit symbol sequence.
pub mod louds;
/// A `u64 -> u64` ordered map built on one indexed stream.
pub mod map;
/// Block-local structures: the region sub-allocator and packed streams.
pub mod packed;
/// Block storage abstraction and an in-memory implementation.
pub mod provider;
/// A rank/select symbol sequence built on one symbol stream.
pub mod sequence;

mod node;
/// The tree engine: raw tree, walkers, cursors and the mutation protocol.
pub mod tree;

pub use codec::ValueCodec;
pub use config::{AggregateKind, StreamDescriptor, StreamKind, TreeConfig, ValueWidth};
pub use error::{CapacityExceeded, Error, Result};
pub use louds::{Louds, LoudsNode};
pub use map::OrderedMap;
pub use packed::{SearchType, Tuple, Value};
pub use provider::{Block, BlockId, BlockProvider, MemoryBlockProvider, ProviderError};
pub use sequence::SymbolSequence;
pub use tree::{BranchNodeEntry, Cursor, CursorState, RawTree, Tree, TreeStats};

use generic_array::ArrayLength;
use typenum::U8;

use crate::codec::ValueCodec;
use crate::config::AggregateKind;
use crate::config::StreamDescriptor;
use crate::config::TreeConfig;
use crate::config::ValueWidth;
use crate::error::Error;
use crate::error::Result;
use crate::packed::SearchType;
use crate::packed::Tuple;
use crate::packed::Value;
use crate::provider::BlockId;
use crate::provider::BlockProvider;
use crate::provider::MemoryBlockProvider;
use crate::tree::Cursor;
use crate::tree::Tree;
use crate::tree::TreeStats;

const STREAM: usize = 0;
const KEY: usize = 0;

/// An ordered `u64 -> u64` map.
///
/// Entries are `(key, value)` tuples of one indexed stream, kept in key order.
/// The stream aggregates with `Max`, so every branch summary holds the
/// largest key below it and a key lookup is a single `find` descent.
///
/// # Example
///
/// ```
/// use packed_btree::OrderedMap;
///
/// let mut map = OrderedMap::with_block_size(512)?;
/// assert_eq!(map.insert(3, 30)?, None);
/// assert_eq!(map.insert(3, 33)?, Some(30));
/// assert_eq!(map.remove(3)?, Some(33));
/// assert!(map.is_empty()?);
/// # Ok::<(), packed_btree::Error>(())
/// ```
#[derive(Debug)]
pub struct OrderedMap<P: BlockProvider = MemoryBlockProvider, N: ArrayLength = U8> {
    tree: Tree<P, N>,
}

impl OrderedMap<MemoryBlockProvider, U8> {
    /// Creates an empty map in a fresh in-memory provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `block_size` cannot hold a valid tree.
    pub fn with_block_size(block_size: usize) -> Result<Self> {
        Self::create(MemoryBlockProvider::new(block_size))
    }
}

impl<P: BlockProvider, N: ArrayLength> OrderedMap<P, N> {
    /// The tree configuration every map uses for a given block size.
    pub fn config(block_size: usize) -> TreeConfig {
        TreeConfig::new(block_size).with_stream(StreamDescriptor::indexed(
            2,
            ValueWidth::Variable(ValueCodec::Varint),
            AggregateKind::Max,
        ))
    }

    /// Creates an empty map in `provider`.
    pub fn create(provider: P) -> Result<Self> {
        let config = Self::config(provider.block_size());
        Ok(OrderedMap {
            tree: Tree::create(provider, &config)?,
        })
    }

    /// Opens the map rooted at `root`.
    pub fn open(provider: P, root: BlockId) -> Result<Self> {
        let config = Self::config(provider.block_size());
        Ok(OrderedMap {
            tree: Tree::open(provider, root, &config)?,
        })
    }

    pub fn tree(&self) -> &Tree<P, N> {
        &self.tree
    }

    pub fn into_tree(self) -> Tree<P, N> {
        self.tree
    }

    pub fn len(&self) -> Result<u64> {
        self.tree.size(STREAM)
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.tree.is_empty(STREAM)
    }

    /// Positions a cursor on the first entry whose key is `>= key`.
    fn lower_bound(&self, key: u64) -> Result<(Cursor<N>, Option<(u64, u64)>)> {
        let cursor = self.tree.find(STREAM, KEY, key, SearchType::Ge)?;
        let entry = self.tree.value(&cursor)?.map(pair).transpose()?;
        Ok((cursor, entry))
    }

    pub fn get(&self, key: u64) -> Result<Option<u64>> {
        match self.lower_bound(key)? {
            (_, Some((k, v))) if k == key => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    pub fn contains_key(&self, key: u64) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Inserts `value` under `key`, returning the previous value if the key
    /// was present.
    pub fn insert(&mut self, key: u64, value: u64) -> Result<Option<u64>> {
        let (mut cursor, entry) = self.lower_bound(key)?;
        let new = Value::Tuple(Tuple::new(&[key, value]));
        match entry {
            Some((k, old)) if k == key => {
                self.tree.update(&mut cursor, &new)?;
                Ok(Some(old))
            }
            _ => {
                self.tree.insert(&mut cursor, &new)?;
                Ok(None)
            }
        }
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: u64) -> Result<Option<u64>> {
        let (mut cursor, entry) = self.lower_bound(key)?;
        match entry {
            Some((k, v)) if k == key => {
                self.tree.remove(&mut cursor)?;
                Ok(Some(v))
            }
            _ => Ok(None),
        }
    }

    pub fn first_key_value(&self) -> Result<Option<(u64, u64)>> {
        self.tree.get(STREAM, 0)?.map(pair).transpose()
    }

    pub fn last_key_value(&self) -> Result<Option<(u64, u64)>> {
        match self.len()? {
            0 => Ok(None),
            len => self.tree.get(STREAM, len - 1)?.map(pair).transpose(),
        }
    }

    /// Iterates all entries in key order.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<(u64, u64)>> + '_> {
        Ok(self.tree.iter(STREAM)?.map(|value| value.and_then(pair)))
    }

    /// Iterates the entries whose key is `>= key`, in key order.
    pub fn range_from(&self, key: u64) -> Result<impl Iterator<Item = Result<(u64, u64)>> + '_> {
        let cursor = self.tree.find(STREAM, KEY, key, SearchType::Ge)?;
        Ok(self.tree.iter_from(cursor)?.map(|value| value.and_then(pair)))
    }

    pub fn clear(&mut self) -> Result<()> {
        self.tree.clear()
    }

    pub fn check(&self) -> Result<()> {
        self.tree.check()
    }

    pub fn stats(&self) -> Result<TreeStats> {
        self.tree.stats()
    }
}

fn pair(value: Value) -> Result<(u64, u64)> {
    match value {
        Value::Tuple(tuple) if tuple.len() == 2 => Ok((tuple[0], tuple[1])),
        _ => Err(Error::StreamKind {
            stream: STREAM,
            expected: "key-value tuples",
        }),
    }
}

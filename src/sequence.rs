use generic_array::ArrayLength;
use typenum::U8;

use crate::config::StreamDescriptor;
use crate::config::TreeConfig;
use crate::error::Error;
use crate::error::Result;
use crate::packed::Value;
use crate::provider::BlockId;
use crate::provider::BlockProvider;
use crate::provider::MemoryBlockProvider;
use crate::tree::Tree;
use crate::tree::TreeStats;

const STREAM: usize = 0;

/// A dynamic sequence of small symbols with rank and select.
///
/// Symbols take `bits` bits each. Every branch summary counts each symbol
/// below it, so `rank` and `select` descend the tree once.
#[derive(Debug)]
pub struct SymbolSequence<P: BlockProvider = MemoryBlockProvider, N: ArrayLength = U8> {
    tree: Tree<P, N>,
    bits: u8,
}

impl SymbolSequence<MemoryBlockProvider, U8> {
    /// Creates an empty sequence of `bits`-bit symbols in a fresh in-memory provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the alphabet does not fit the summary
    /// width or `block_size` is too small.
    pub fn with_block_size(bits: u8, block_size: usize) -> Result<Self> {
        Self::create(MemoryBlockProvider::new(block_size), bits)
    }
}

impl<P: BlockProvider, N: ArrayLength> SymbolSequence<P, N> {
    pub fn config(bits: u8, block_size: usize) -> TreeConfig {
        TreeConfig::new(block_size).with_stream(StreamDescriptor::symbols(bits))
    }

    pub fn create(provider: P, bits: u8) -> Result<Self> {
        let config = Self::config(bits, provider.block_size());
        Ok(SymbolSequence {
            tree: Tree::create(provider, &config)?,
            bits,
        })
    }

    pub fn open(provider: P, root: BlockId, bits: u8) -> Result<Self> {
        let config = Self::config(bits, provider.block_size());
        Ok(SymbolSequence {
            tree: Tree::open(provider, root, &config)?,
            bits,
        })
    }

    pub fn bits(&self) -> u8 {
        self.bits
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

    pub fn get(&self, position: u64) -> Result<Option<u8>> {
        self.tree.get(STREAM, position)?.map(symbol).transpose()
    }

    pub fn push(&mut self, symbol: u8) -> Result<()> {
        self.tree.push(STREAM, &Value::Symbol(symbol))
    }

    /// Inserts `symbol` before `position`; positions past the end append.
    pub fn insert(&mut self, position: u64, symbol: u8) -> Result<()> {
        self.tree.insert_at(STREAM, position, &Value::Symbol(symbol))
    }

    /// Replaces the symbol at `position`, returning the old one.
    pub fn set(&mut self, position: u64, symbol: u8) -> Result<Option<u8>> {
        let mut cursor = self.tree.seek(STREAM, position)?;
        self.tree.update(&mut cursor, &Value::Symbol(symbol))?.map(self::symbol).transpose()
    }

    pub fn remove(&mut self, position: u64) -> Result<Option<u8>> {
        self.tree.remove_at(STREAM, position)?.map(symbol).transpose()
    }

    /// Counts occurrences of `symbol` in `[0, end)`.
    pub fn rank(&self, end: u64, symbol: u8) -> Result<u64> {
        self.tree.rank(STREAM, end, usize::from(symbol))
    }

    /// Position of the `k`-th (1-based) occurrence of `symbol`.
    pub fn select(&self, symbol: u8, k: u64) -> Result<Option<u64>> {
        self.tree.select(STREAM, usize::from(symbol), k)
    }

    /// Total occurrences of `symbol`.
    pub fn count(&self, symbol: u8) -> Result<u64> {
        self.rank(u64::MAX, symbol)
    }

    pub fn iter(&self) -> Result<impl Iterator<Item = Result<u8>> + '_> {
        Ok(self.tree.iter(STREAM)?.map(|value| value.and_then(symbol)))
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

fn symbol(value: Value) -> Result<u8> {
    value.as_symbol().ok_or(Error::StreamKind {
        stream: STREAM,
        expected: "symbols",
    })
}

#[cfg(test)]
mod tests {
    extern crate alloc;
    use alloc::boxed::Box;
    use alloc::vec::Vec;

    use std::error::Error as StdError;

    use itertools::assert_equal;
    use itertools::Itertools;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_alternating_bits() -> Result<(), Box<dyn StdError>> {
        let mut bits = SymbolSequence::with_block_size(1, 256)?;
        for i in 0..20u8 {
            bits.push(1 - i % 2)?;
        }

        assert_eq!(bits.len()?, 20);
        assert_eq!(bits.rank(20, 1)?, 10);
        assert_eq!(bits.rank(5, 1)?, 3);
        assert_eq!(bits.rank(0, 1)?, 0);
        assert_eq!(bits.select(1, 1)?, Some(0));
        assert_eq!(bits.select(1, 10)?, Some(18));
        assert_eq!(bits.select(0, 10)?, Some(19));
        assert_eq!(bits.select(1, 11)?, None);
        assert_eq!(bits.select(1, 0)?, None);
        assert_eq!(bits.count(0)?, 10);
        Ok(())
    }

    #[test]
    fn test_edit_in_the_middle() -> Result<(), Box<dyn StdError>> {
        let mut seq = SymbolSequence::with_block_size(2, 512)?;
        for symbol in [0, 1, 2, 3] {
            seq.push(symbol)?;
        }
        seq.insert(2, 3)?;
        assert_eq!(seq.set(0, 2)?, Some(0));
        assert_eq!(seq.remove(1)?, Some(1));
        assert_eq!(seq.remove(9)?, None);

        assert_equal(seq.iter()?.collect::<Result<Vec<_>>>()?, [2, 3, 2, 3]);
        assert_eq!(seq.rank(4, 3)?, 2);
        assert_eq!(seq.get(3)?, Some(3));
        assert_eq!(seq.get(4)?, None);
        seq.check()?;
        Ok(())
    }

    #[test]
    fn test_rejects_large_symbols() -> Result<(), Box<dyn StdError>> {
        let mut seq = SymbolSequence::with_block_size(1, 256)?;
        assert!(matches!(seq.push(2), Err(Error::ValueOutOfRange { .. })));
        assert!(matches!(seq.select(2, 1), Err(Error::Config(_))));
        assert!(seq.is_empty()?);
        Ok(())
    }

    proptest! {
        #[test]
        fn test_rank_select_duality(symbols in prop::collection::vec(0..4u8, 1..2000)) {
            let mut seq = SymbolSequence::with_block_size(2, 512)?;
            for symbol in &symbols {
                seq.push(*symbol)?;
            }
            seq.check()?;

            for symbol in 0..4u8 {
                let positions = symbols.iter().positions(|s| *s == symbol).collect::<Vec<_>>();
                prop_assert_eq!(seq.count(symbol)?, positions.len() as u64);
                for (k, position) in positions.iter().enumerate().step_by(37) {
                    let k = k as u64 + 1;
                    prop_assert_eq!(seq.select(symbol, k)?, Some(*position as u64));
                    prop_assert_eq!(seq.rank(*position as u64, symbol)?, k - 1);
                }
            }
        }
    }
}

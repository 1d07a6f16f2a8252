extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;

use std::error::Error as StdError;

use proptest::prelude::*;

use itertools::assert_equal;
use itertools::Itertools;

use allocated::CountingAllocator;

use super::*;
use crate::codec::ValueCodec;
use crate::config::AggregateKind;
use crate::config::StreamDescriptor;
use crate::config::ValueWidth;
use crate::packed::SearchType;
use crate::packed::Tuple;
use crate::provider::MemoryBlockProvider;

use typenum::U16;

fn indexed_config(block_size: usize) -> TreeConfig {
    TreeConfig::new(block_size).with_stream(StreamDescriptor::indexed(1, ValueWidth::Fixed(16), AggregateKind::Sum))
}

fn tuple(v: u64) -> Value {
    Value::Tuple(Tuple::new(&[v]))
}

fn first(value: Value) -> u64 {
    match value {
        Value::Tuple(tuple) => tuple[0],
        Value::Symbol(symbol) => u64::from(symbol),
    }
}

fn contents<P: BlockProvider>(tree: &Tree<P>, stream: usize) -> Result<Vec<u64>, Box<dyn StdError>> {
    Ok(tree.iter(stream)?.map_ok(first).collect::<Result<Vec<_>>>()?)
}

#[test]
fn test_empty() -> Result<(), Box<dyn StdError>> {
    let tree: Tree = Tree::new(&indexed_config(256))?;

    assert_eq!(tree.size(0)?, 0);
    assert!(tree.is_empty(0)?);
    assert_eq!(tree.depth()?, 1);
    assert!(tree.begin(0)?.is_end());
    assert_eq!(tree.get(0, 0)?, None);
    assert_equal(contents(&tree, 0)?, Vec::<u64>::new());
    tree.check()?;

    let stats = tree.stats()?;
    assert_eq!(stats.blocks(), 1);
    assert_eq!(stats.elements, vec![0]);
    assert!(matches!(tree.size(1), Err(Error::Config(_))));
    Ok(())
}

#[test]
fn test_one() -> Result<(), Box<dyn StdError>> {
    let mut tree: Tree = Tree::new(&indexed_config(256))?;
    let mut cursor = tree.end(0)?;
    tree.insert(&mut cursor, &tuple(7))?;

    assert_eq!(cursor.state(), CursorState::Entry);
    assert_eq!(cursor.position(), 0);
    assert_eq!(tree.value(&cursor)?, Some(tuple(7)));
    assert_eq!(tree.size(0)?, 1);
    assert_eq!(tree.summary()?[1], 7);
    tree.check()?;
    Ok(())
}

#[test]
fn test_push_splits_leaves_and_branches() -> Result<(), Box<dyn StdError>> {
    let mut tree: Tree = Tree::new(&indexed_config(256))?;
    for i in 0..600 {
        tree.push(0, &tuple(i * 3))?;
    }

    assert_eq!(tree.size(0)?, 600);
    assert!(tree.depth()? >= 3);
    tree.check()?;
    assert_equal(contents(&tree, 0)?, (0..600).map(|i| i * 3));
    for i in [0u64, 1, 89, 90, 91, 311, 599] {
        assert_eq!(tree.get(0, i)?, Some(tuple(i * 3)));
    }
    assert_eq!(tree.get(0, 600)?, None);
    assert_eq!(tree.summary()?[1], (0..600).map(|i| i * 3).sum::<u64>());

    let stats = tree.stats()?;
    assert!(stats.leaves > 1);
    assert!(stats.branches > 1);
    assert_eq!(stats.blocks(), tree.provider().live_blocks());
    assert!(stats.used_bytes <= stats.capacity_bytes);
    Ok(())
}

#[test]
fn test_four_keys_split_into_two_leaves() -> Result<(), Box<dyn StdError>> {
    // Keys in channel 0, ordered by a max aggregate; seven wide payload
    // channels make a root leaf overflow on the fourth entry.
    let config = |block_size| {
        TreeConfig::new(block_size).with_stream(StreamDescriptor::indexed(8, ValueWidth::Fixed(64), AggregateKind::Max))
    };
    let record = |key: u64| Value::Tuple(Tuple::new(&[key, u64::MAX, 0, 0, 0, 0, 0, 0]));
    let insert = |tree: &mut Tree<MemoryBlockProvider, U16>, key: u64| -> Result<()> {
        let mut cursor = tree.find(0, 0, key, SearchType::Ge)?;
        tree.insert(&mut cursor, &record(key))
    };

    let mut found = None;
    for block_size in (256..1024).step_by(8) {
        let Ok(mut tree) = Tree::<MemoryBlockProvider, U16>::new(&config(block_size)) else {
            continue;
        };
        for key in [5, 1, 9] {
            insert(&mut tree, key)?;
        }
        if tree.depth()? != 1 {
            continue;
        }
        insert(&mut tree, 3)?;
        if tree.depth()? == 2 {
            found = Some(tree);
            break;
        }
    }

    let tree = found.ok_or("no block size splits at the fourth key")?;
    tree.check()?;
    assert_eq!(tree.size(0)?, 4);
    assert_equal(contents_wide(&tree)?, [1, 3, 5, 9]);
    let stats = tree.stats()?;
    assert_eq!(stats.branches, 1);
    assert_eq!(stats.leaves, 2);
    assert_eq!(stats.levels, vec![2, 1]);
    Ok(())
}

fn contents_wide(tree: &Tree<MemoryBlockProvider, U16>) -> Result<Vec<u64>, Box<dyn StdError>> {
    Ok(tree.iter(0)?.map_ok(first).collect::<Result<Vec<_>>>()?)
}

#[test]
fn test_insert_front_and_middle() -> Result<(), Box<dyn StdError>> {
    let mut tree: Tree = Tree::new(&indexed_config(256))?;
    let mut model = Vec::new();
    for i in 0..300u64 {
        let position = match i % 3 {
            0 => 0,
            1 => model.len() as u64 / 2,
            _ => model.len() as u64,
        };
        tree.insert_at(0, position, &tuple(i))?;
        model.insert(position as usize, i);
    }

    tree.check()?;
    assert_equal(contents(&tree, 0)?, model.iter().copied());
    Ok(())
}

#[test]
fn test_skip() -> Result<(), Box<dyn StdError>> {
    let mut tree: Tree = Tree::new(&indexed_config(256))?;
    for i in 0..300 {
        tree.push(0, &tuple(i))?;
    }

    let mut cursor = tree.seek(0, 10)?;
    assert_eq!(tree.skip_forward(&mut cursor, 100)?, 100);
    assert_eq!(cursor.position(), 110);
    assert_eq!(tree.value(&cursor)?, Some(tuple(110)));

    assert_eq!(tree.skip_forward(&mut cursor, 1000)?, 190);
    assert!(cursor.is_end());
    assert_eq!(cursor.position(), 300);

    assert_eq!(tree.skip_backward(&mut cursor, 5)?, 5);
    assert_eq!(tree.value(&cursor)?, Some(tuple(295)));

    assert_eq!(tree.skip_backward(&mut cursor, 200)?, 200);
    assert_eq!(tree.value(&cursor)?, Some(tuple(95)));

    assert_eq!(tree.skip_backward(&mut cursor, 1000)?, 96);
    assert!(cursor.is_before_begin());
    assert_eq!(tree.value(&cursor)?, None);
    assert!(!tree.prev(&mut cursor)?);

    assert!(tree.next(&mut cursor)?);
    assert_eq!(cursor.position(), 0);
    assert_eq!(tree.value(&cursor)?, Some(tuple(0)));
    Ok(())
}

#[test]
fn test_skip_saturates() -> Result<(), Box<dyn StdError>> {
    let mut tree: Tree = Tree::new(&indexed_config(256))?;
    for i in 0..300 {
        tree.push(0, &tuple(i))?;
    }
    assert!(tree.depth()? > 1);

    let mut cursor = tree.seek(0, 1)?;
    assert_eq!(tree.skip_forward(&mut cursor, u64::MAX)?, 299);
    assert!(cursor.is_end());
    assert_eq!(cursor.position(), 300);
    assert_eq!(tree.skip_forward(&mut cursor, u64::MAX)?, 0);

    assert_eq!(tree.skip_backward(&mut cursor, u64::MAX)?, 301);
    assert!(cursor.is_before_begin());

    assert_eq!(tree.skip_forward(&mut cursor, u64::MAX)?, 301);
    assert!(cursor.is_end());
    Ok(())
}

#[test]
fn test_walk_every_position_backwards() -> Result<(), Box<dyn StdError>> {
    let mut tree: Tree = Tree::new(&indexed_config(256))?;
    for i in 0..250 {
        tree.push(0, &tuple(i))?;
    }

    let mut cursor = tree.end(0)?;
    let mut seen = Vec::new();
    while tree.prev(&mut cursor)? {
        seen.push(first(tree.value(&cursor)?.ok_or("missing value")?));
    }
    assert_equal(seen, (0..250).rev());
    Ok(())
}

#[test]
fn test_find_on_summed_channel() -> Result<(), Box<dyn StdError>> {
    let mut tree: Tree = Tree::new(&indexed_config(256))?;
    for _ in 0..400 {
        tree.push(0, &tuple(2))?;
    }

    // Running sum after element i is 2 * (i + 1).
    assert_eq!(tree.find(0, 0, 7, SearchType::Gt)?.position(), 3);
    assert_eq!(tree.find(0, 0, 8, SearchType::Ge)?.position(), 3);
    assert_eq!(tree.find(0, 0, 501, SearchType::Gt)?.position(), 250);
    assert_eq!(tree.find(0, 0, 600, SearchType::Ge)?.position(), 299);
    assert!(tree.find(0, 0, 800, SearchType::Gt)?.is_end());
    assert!(matches!(tree.find(0, 1, 0, SearchType::Gt), Err(Error::Config(_))));

    assert_eq!(tree.rank(0, 100, 0)?, 200);
    assert_eq!(tree.select(0, 0, 7)?, Some(3));
    Ok(())
}

#[test]
fn test_find_on_max_channel() -> Result<(), Box<dyn StdError>> {
    let config = TreeConfig::new(256).with_stream(StreamDescriptor::indexed(
        2,
        ValueWidth::Variable(ValueCodec::Varint),
        AggregateKind::Max,
    ));
    let mut tree: Tree = Tree::new(&config)?;
    for key in 0..300u64 {
        tree.push(0, &Value::Tuple(Tuple::new(&[key * 10, key])))?;
    }
    tree.check()?;

    let cursor = tree.find(0, 0, 1234, SearchType::Ge)?;
    assert_eq!(cursor.position(), 124);
    assert_eq!(tree.value(&cursor)?, Some(Value::Tuple(Tuple::new(&[1240, 124]))));

    assert_eq!(tree.find(0, 0, 1240, SearchType::Ge)?.position(), 124);
    assert_eq!(tree.find(0, 0, 1240, SearchType::Gt)?.position(), 125);
    assert!(tree.find(0, 0, 2991, SearchType::Ge)?.is_end());
    assert_eq!(tree.summary()?[1], 2990);
    assert_eq!(tree.rank(0, 50, 0)?, 490);
    assert!(matches!(tree.select(0, 0, 1), Err(Error::Config(_))));
    Ok(())
}

#[test]
fn test_find_below_on_summed_channel() -> Result<(), Box<dyn StdError>> {
    let mut tree: Tree = Tree::new(&indexed_config(256))?;
    assert!(tree.find(0, 0, 100, SearchType::Lt)?.is_end());
    for _ in 0..400 {
        tree.push(0, &tuple(2))?;
    }
    assert!(tree.depth()? > 1);

    // Only the first running sum, 2, can be below the key.
    let cursor = tree.find(0, 0, 100, SearchType::Lt)?;
    assert_eq!(cursor.position(), 0);
    assert_eq!(tree.value(&cursor)?, Some(tuple(2)));
    assert_eq!(tree.find(0, 0, 2, SearchType::Le)?.position(), 0);
    assert!(tree.find(0, 0, 2, SearchType::Lt)?.is_end());
    assert!(tree.find(0, 0, 1, SearchType::Le)?.is_end());
    assert_eq!(tree.find(0, 0, 2, SearchType::Gt)?.position(), 1);
    assert_eq!(tree.find(0, 0, 2, SearchType::Ge)?.position(), 0);
    Ok(())
}

#[test]
fn test_find_every_search_on_max_channel() -> Result<(), Box<dyn StdError>> {
    let config = TreeConfig::new(256).with_stream(StreamDescriptor::indexed(
        2,
        ValueWidth::Variable(ValueCodec::Varint),
        AggregateKind::Max,
    ));
    let key_at = |tree: &Tree, search| -> Result<Option<u64>, Box<dyn StdError>> {
        let cursor = tree.find(0, 0, 50, search)?;
        Ok(tree.value(&cursor)?.map(first))
    };

    let mut ascending: Tree = Tree::new(&config)?;
    assert!(ascending.find(0, 0, 50, SearchType::Le)?.is_end());
    for key in 0..300u64 {
        ascending.push(0, &Value::Tuple(Tuple::new(&[key * 10, key])))?;
    }
    assert!(ascending.depth()? > 1);
    assert_eq!(ascending.find(0, 0, 50, SearchType::Lt)?.position(), 0);
    assert_eq!(ascending.find(0, 0, 50, SearchType::Le)?.position(), 0);
    assert_eq!(ascending.find(0, 0, 50, SearchType::Gt)?.position(), 6);
    assert_eq!(ascending.find(0, 0, 50, SearchType::Ge)?.position(), 5);
    assert!(ascending.find(0, 0, 0, SearchType::Lt)?.is_end());
    assert_eq!(ascending.find(0, 0, 0, SearchType::Le)?.position(), 0);

    let mut descending: Tree = Tree::new(&config)?;
    for i in 0..300u64 {
        descending.push(0, &Value::Tuple(Tuple::new(&[(299 - i) * 10, i])))?;
    }
    descending.check()?;
    assert_eq!(descending.find(0, 0, 50, SearchType::Lt)?.position(), 295);
    assert_eq!(key_at(&descending, SearchType::Lt)?, Some(40));
    assert_eq!(descending.find(0, 0, 50, SearchType::Le)?.position(), 294);
    assert_eq!(key_at(&descending, SearchType::Le)?, Some(50));
    assert_eq!(descending.find(0, 0, 50, SearchType::Gt)?.position(), 0);
    assert_eq!(key_at(&descending, SearchType::Ge)?, Some(2990));
    assert!(descending.find(0, 0, 0, SearchType::Lt)?.is_end());
    Ok(())
}

#[test]
fn test_rank_select_symbols() -> Result<(), Box<dyn StdError>> {
    let config = TreeConfig::new(256).with_stream(StreamDescriptor::symbols(1));
    let mut tree: Tree = Tree::new(&config)?;
    for i in 0..3000u64 {
        tree.push(0, &Value::Symbol(u8::from(i % 3 == 0)))?;
    }
    tree.check()?;
    assert!(tree.depth()? > 1);

    for position in [0u64, 1, 2, 3, 4, 1000, 1001, 2999, 3000] {
        assert_eq!(tree.rank(0, position, 1)?, position.div_ceil(3));
        assert_eq!(tree.rank(0, position, 0)?, position - position.div_ceil(3));
    }
    assert_eq!(tree.select(0, 1, 0)?, None);
    assert_eq!(tree.select(0, 1, 1)?, Some(0));
    assert_eq!(tree.select(0, 1, 2)?, Some(3));
    assert_eq!(tree.select(0, 1, 1000)?, Some(2997));
    assert_eq!(tree.select(0, 1, 1001)?, None);
    assert_eq!(tree.select(0, 0, 2)?, Some(2));
    assert_eq!(tree.select(0, 0, 2000)?, Some(2999));
    assert!(matches!(tree.push(0, &Value::Symbol(2)), Err(Error::ValueOutOfRange { .. })));
    Ok(())
}

#[test]
fn test_remove_all_collapses() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    {
        let provider = MemoryBlockProvider::new_in(256, &alloc);
        let mut tree: Tree<_> = Tree::create(provider, &indexed_config(256))?;
        for i in 0..500 {
            tree.push(0, &tuple(i))?;
        }
        assert!(tree.depth()? >= 3);

        let mut expected = 0;
        while !tree.is_empty(0)? {
            assert_eq!(tree.remove_at(0, 0)?, Some(tuple(expected)));
            expected += 1;
            if expected % 50 == 0 {
                tree.check()?;
            }
        }
        assert_eq!(expected, 500);
        assert_eq!(tree.depth()?, 1);
        assert_eq!(tree.provider().live_blocks(), 1);
        assert_eq!(alloc.net_allocations(), 1);
        assert_eq!(tree.remove_at(0, 0)?, None);
        tree.check()?;
    }
    assert_eq!(alloc.net_allocations(), 0);
    assert_eq!(alloc.net_bytes_allocated(), 0);
    Ok(())
}

#[test]
fn test_remove_from_the_back_and_middle() -> Result<(), Box<dyn StdError>> {
    let mut tree: Tree = Tree::new(&indexed_config(256))?;
    let mut model: Vec<u64> = (0..400).collect();
    for i in &model {
        tree.push(0, &tuple(*i))?;
    }

    for round in 0..300 {
        let position = if round % 2 == 0 { model.len() - 1 } else { model.len() / 2 };
        let mut cursor = tree.seek(0, position as u64)?;
        let removed = tree.remove(&mut cursor)?;
        assert_eq!(removed, Some(tuple(model.remove(position))));
        assert_eq!(cursor.position(), position as u64);
    }
    tree.check()?;
    assert_equal(contents(&tree, 0)?, model.iter().copied());
    assert_eq!(tree.stats()?.blocks(), tree.provider().live_blocks());
    Ok(())
}

#[test]
fn test_update_in_place_and_by_reinsertion() -> Result<(), Box<dyn StdError>> {
    let config = TreeConfig::new(256).with_stream(StreamDescriptor::indexed(
        1,
        ValueWidth::Variable(ValueCodec::Varint),
        AggregateKind::Sum,
    ));
    let mut tree: Tree = Tree::new(&config)?;
    for i in 0..200 {
        tree.push(0, &tuple(i % 100))?;
    }

    let mut cursor = tree.seek(0, 5)?;
    assert_eq!(tree.update(&mut cursor, &tuple(6))?, Some(tuple(5)));
    assert_eq!(tree.get(0, 5)?, Some(tuple(6)));

    // Widening every value forces leaves past their byte budget.
    for position in 0..200u64 {
        let mut cursor = tree.seek(0, position)?;
        tree.update(&mut cursor, &tuple(u64::MAX - position))?;
        assert_eq!(tree.value(&cursor)?, Some(tuple(u64::MAX - position)));
    }
    tree.check()?;
    assert_eq!(tree.size(0)?, 200);
    assert_equal(contents(&tree, 0)?, (0..200).map(|p| u64::MAX - p));

    let mut end = tree.end(0)?;
    assert_eq!(tree.update(&mut end, &tuple(1))?, None);
    Ok(())
}

#[test]
fn test_streams_are_independent() -> Result<(), Box<dyn StdError>> {
    let config = TreeConfig::new(512)
        .with_stream(StreamDescriptor::indexed(
            2,
            ValueWidth::Variable(ValueCodec::EliasGamma),
            AggregateKind::Sum,
        ))
        .with_stream(StreamDescriptor::symbols(2));
    let mut tree: Tree = Tree::new(&config)?;
    for i in 0..700u64 {
        tree.push(1, &Value::Symbol((i % 4) as u8))?;
        if i % 2 == 0 {
            tree.push(0, &Value::Tuple(Tuple::new(&[i, 1])))?;
        }
    }
    tree.check()?;

    assert_eq!(tree.size(0)?, 350);
    assert_eq!(tree.size(1)?, 700);
    assert_eq!(tree.rank(1, 700, 3)?, 175);
    assert_eq!(tree.rank(0, 350, 1)?, 350);
    assert_eq!(tree.get(0, 100)?, Some(Value::Tuple(Tuple::new(&[200, 1]))));
    assert_eq!(tree.get(1, 699)?, Some(Value::Symbol(3)));
    assert!(matches!(tree.push(0, &Value::Symbol(1)), Err(Error::StreamKind { stream: 0, .. })));

    // Emptying one stream leaves the other intact.
    while !tree.is_empty(0)? {
        tree.remove_at(0, 0)?;
    }
    tree.check()?;
    assert_eq!(tree.size(1)?, 700);
    assert_equal(contents(&tree, 1)?, (0..700).map(|i| i % 4));
    Ok(())
}

#[test]
fn test_reopen() -> Result<(), Box<dyn StdError>> {
    let config = indexed_config(256);
    let mut tree: Tree = Tree::new(&config)?;
    for i in 0..100 {
        tree.push(0, &tuple(i))?;
    }
    let root = tree.root();
    let (provider, _) = tree.into_parts();

    let other = TreeConfig::new(256).with_stream(StreamDescriptor::symbols(1));
    assert!(matches!(
        RawTree::<U8>::open_in(&provider, root, &other),
        Err(Error::Invariant { .. })
    ));

    let tree: Tree = Tree::open(provider, root, &config)?;
    assert_eq!(tree.root(), root);
    assert_eq!(tree.size(0)?, 100);
    assert_eq!(tree.get(0, 42)?, Some(tuple(42)));
    Ok(())
}

#[test]
fn test_clear_and_destroy() -> Result<(), Box<dyn StdError>> {
    let alloc = CountingAllocator::default();
    let provider = MemoryBlockProvider::new_in(256, &alloc);
    let mut tree: Tree<_> = Tree::create(provider, &indexed_config(256))?;
    for i in 0..300 {
        tree.push(0, &tuple(i))?;
    }
    tree.clear()?;
    assert_eq!(tree.size(0)?, 0);
    assert_eq!(tree.provider().live_blocks(), 1);
    tree.check()?;

    tree.push(0, &tuple(1))?;
    let provider = tree.destroy()?;
    assert_eq!(provider.live_blocks(), 0);
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_create_rejects_mismatched_provider() -> Result<(), Box<dyn StdError>> {
    let mut provider = MemoryBlockProvider::new(512);
    assert!(matches!(
        RawTree::<U8>::create_in(&mut provider, &indexed_config(256)),
        Err(Error::Config(_))
    ));
    assert_eq!(provider.live_blocks(), 0);
    Ok(())
}

#[test]
fn test_to_dot() -> Result<(), Box<dyn StdError>> {
    let mut tree: Tree = Tree::new(&indexed_config(256))?;
    for i in 0..200 {
        tree.push(0, &tuple(i))?;
    }
    let dot = tree.to_dot()?;
    assert!(dot.starts_with("digraph G {"));
    assert!(dot.contains("->"));
    assert_eq!(dot.matches("shape=\"record\"").count(), tree.stats()?.blocks());
    Ok(())
}

proptest! {
    #[test]
    fn test_random_edits(ops in prop::collection::vec((any::<bool>(), 0..1000usize, 0..65536u64), 1..400)) {
        let mut tree: Tree = Tree::new(&indexed_config(256))?;
        let mut model: Vec<u64> = Vec::new();

        for (insert, at, value) in &ops {
            if *insert || model.is_empty() {
                let position = at % (model.len() + 1);
                tree.insert_at(0, position as u64, &tuple(*value))?;
                model.insert(position, *value);
            } else {
                let position = at % model.len();
                let removed = tree.remove_at(0, position as u64)?;
                prop_assert_eq!(removed, Some(tuple(model.remove(position))));
            }
        }

        tree.check()?;
        prop_assert_eq!(tree.size(0)?, model.len() as u64);
        let stored: Vec<u64> = tree.iter(0)?.map_ok(first).collect::<Result<_>>()?;
        prop_assert_eq!(&stored, &model);
        prop_assert_eq!(tree.summary()?[1], model.iter().sum::<u64>());
        prop_assert_eq!(tree.stats()?.blocks(), tree.provider().live_blocks());
    }
}

proptest! {
    #[test]
    fn test_seek_and_rank(bits in prop::collection::vec(0..4u8, 1..3000), probes in prop::collection::vec(0..3100u64, 1..20)) {
        let config = TreeConfig::new(512).with_stream(StreamDescriptor::symbols(2));
        let mut tree: Tree = Tree::new(&config)?;
        for symbol in &bits {
            tree.push(0, &Value::Symbol(*symbol))?;
        }

        for probe in probes {
            let cursor = tree.seek(0, probe)?;
            prop_assert_eq!(cursor.position(), probe.min(bits.len() as u64));
            let expected = bits.get(probe as usize).map(|s| Value::Symbol(*s));
            prop_assert_eq!(tree.value(&cursor)?, expected);

            for symbol in 0..4u8 {
                let end = (probe as usize).min(bits.len());
                let count = bits[..end].iter().filter(|s| **s == symbol).count() as u64;
                prop_assert_eq!(tree.rank(0, probe, usize::from(symbol))?, count);
                if count > 0 {
                    let position = tree.select(0, usize::from(symbol), count)?;
                    let last = bits[..end].iter().rposition(|s| *s == symbol).map(|p| p as u64);
                    prop_assert_eq!(position, last);
                }
            }
        }
    }
}

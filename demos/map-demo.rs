//! Demonstrates the ordered map and the engine underneath it.

use packed_btree::{OrderedMap, SearchType};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Ordered Map Demo ===\n");

    let mut map = OrderedMap::with_block_size(512)?;
    map.insert(3, 30)?;
    map.insert(1, 10)?;
    map.insert(4, 40)?;
    map.insert(1, 11)?; // replaces
    map.insert(5, 50)?;
    map.insert(9, 90)?;
    map.insert(2, 20)?;

    println!("Inserted {} items", map.len()?);
    if let Some(value) = map.get(1)? {
        println!("Key 1: {}", value);
    }

    println!("\nAll entries:");
    for entry in map.iter()? {
        let (k, v) = entry?;
        println!("  {} -> {}", k, v);
    }

    println!("\nFrom 4 on:");
    for entry in map.range_from(4)? {
        let (k, v) = entry?;
        println!("  {} -> {}", k, v);
    }

    map.remove(3)?;
    println!("\nAfter removing 3: {} items", map.len()?);

    println!("\n=== Growing ===\n");
    for k in 100..5000 {
        map.insert(k, k * k)?;
    }
    let stats = map.stats()?;
    println!("{} items, depth {}", map.len()?, stats.depth);
    println!("{} leaves, {} branches, per level {:?}", stats.leaves, stats.branches, stats.levels);
    println!("{} of {} bytes used", stats.used_bytes, stats.capacity_bytes);

    // The map is one stream whose key channel is aggregated by maximum.
    let tree = map.tree();
    let cursor = tree.find(0, 0, 2500, SearchType::Gt)?;
    println!("\nFirst key > 2500 is at position {}: {:?}", cursor.position(), tree.value(&cursor)?);

    map.check()?;
    Ok(())
}

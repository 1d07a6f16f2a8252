//! Tracks block allocations while a map grows and shrinks.
//!
//! Every block of a `MemoryBlockProvider` is allocated through the provider's
//! allocator, so a `CountingAllocator` sees exactly the blocks the tree holds.
//! Prints `run,phase,len,live_blocks,allocations,bytes` as CSV.

use rand::seq::SliceRandom;
use rand::Rng;

use allocated::CountingAllocator;
use allocator_api2::alloc::Global;

use packed_btree::{MemoryBlockProvider, OrderedMap};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("run,phase,len,live_blocks,allocations,bytes");
    for run in 0..10 {
        let alloc = CountingAllocator::default();
        {
            let provider = MemoryBlockProvider::new_in(512, &alloc);
            let mut map: OrderedMap<_> = OrderedMap::create(provider)?;
            let mut rng = rand::thread_rng();

            let mut keys = Vec::new();
            for _ in 0..2000 {
                let k: u64 = rng.gen_range(0..1_000_000);
                if map.insert(k, rng.gen())?.is_none() {
                    keys.push(k);
                }
                report(run, "insert", &map, &alloc)?;
            }

            keys.shuffle(&mut rng);
            for k in keys {
                map.remove(k)?;
                report(run, "remove", &map, &alloc)?;
            }

            map.check()?;
            assert_eq!(map.tree().provider().live_blocks(), 1);
            map.into_tree().destroy()?;
        }
        assert_eq!(alloc.net_allocations(), 0);
    }
    Ok(())
}

fn report(
    run: usize,
    phase: &str,
    map: &OrderedMap<MemoryBlockProvider<&CountingAllocator<Global>>>,
    alloc: &CountingAllocator<Global>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "{},{},{},{},{},{}",
        run,
        phase,
        map.len()?,
        map.tree().provider().live_blocks(),
        alloc.n_allocations(),
        alloc.n_bytes_allocated()
    );
    Ok(())
}

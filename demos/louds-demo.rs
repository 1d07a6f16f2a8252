//! Builds a small LOUDS tree and walks it.

use packed_btree::{Louds, LoudsNode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    //           0
    //        /  |  \
    //       1   2   3
    //      / \      |
    //     4   5     6
    let louds = Louds::from_degrees(256, [3, 2, 0, 1, 0, 0, 0])?;

    let bits = louds.bits().iter()?.map(|b| b.map(|b| b.to_string())).collect::<Result<Vec<_>, _>>()?;
    println!("Bits: {}", bits.join(""));
    println!("Nodes: {}\n", louds.len()?);

    print_subtree(&louds, louds.root(), 0)?;

    let six = louds.node_at(6)?.ok_or("node 6 missing")?;
    let mut path = vec![louds.node_index(six)?];
    let mut node = six;
    while let Some(parent) = louds.parent(node)? {
        path.push(louds.node_index(parent)?);
        node = parent;
    }
    println!("\nPath from 6 to the root: {:?}", path);
    Ok(())
}

fn print_subtree(louds: &Louds, node: LoudsNode, depth: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "{:indent$}node {} (bit {}, {} children)",
        "",
        louds.node_index(node)?,
        node.0,
        louds.children_count(node)?,
        indent = depth * 2
    );
    for child in louds.children(node)? {
        print_subtree(louds, child, depth + 1)?;
    }
    Ok(())
}

//! Insertion, update and removal.
//!
//! Every change is first applied to a copy of the node. Only when the copy
//! fits its block is it written back; otherwise the node is split (growing
//! the root first if needed) and the change retried on the half that now
//! holds the target position. Splits conserve a node's summary, so parents
//! only ever need the element's own delta once the change lands.

use alloc::vec::Vec;

use generic_array::ArrayLength;
use tracing::debug;
use tracing::trace;

use crate::config::TreeLayout;
use crate::error::CapacityExceeded;
use crate::error::Error;
use crate::error::Result;
use crate::node::Node;
use crate::packed::Value;
use crate::provider::BlockId;
use crate::provider::BlockProvider;

use super::BranchNodeEntry;
use super::Cursor;
use super::CursorState;
use super::PathStep;
use super::RawTree;

/// Upper bound on splits for one insertion.
const MAX_SPLITS: usize = 64;

impl<N: ArrayLength> RawTree<N> {
    /// Inserts `value` into the cursor's stream before the element under the
    /// cursor (at the end, it appends).
    ///
    /// On success the cursor is on the new element.
    ///
    /// # Errors
    ///
    /// - [`Error::StreamKind`] or [`Error::ValueOutOfRange`] if `value` does
    ///   not suit the stream.
    /// - [`Error::EntryTooLarge`] if `value` does not fit even an empty leaf.
    pub fn insert_in<P: BlockProvider>(&mut self, provider: &mut P, cursor: &mut Cursor<N>, value: &Value) -> Result<()> {
        let stream = cursor.stream;
        let entry = self.layout.entry_of::<N>(stream, value)?;
        self.check_fits(stream, value)?;
        if cursor.state == CursorState::BeforeBegin {
            *cursor = self.begin_in(provider, stream)?;
        }

        let mut leaf = self.read_node(provider, cursor.leaf)?;
        for _ in 0..MAX_SPLITS {
            let mut attempt = leaf.clone();
            match attempt.leaf_mut(&self.layout).insert(stream, cursor.idx, value) {
                Ok(()) => {
                    self.write_node(provider, &attempt)?;
                    self.propagate_in(provider, &cursor.path, &attempt, &entry, &TreeLayout::zero::<N>())?;
                    cursor.leaf_size += 1;
                    cursor.state = CursorState::Entry;
                    return Ok(());
                }
                Err(CapacityExceeded) => {
                    leaf = self.split_leaf_in(provider, cursor, leaf)?;
                }
            }
        }
        Err(Error::invariant(cursor.leaf, "insert", "leaf still full after repeated splits"))
    }

    /// Rejects values that would not fit an empty non-root leaf.
    fn check_fits(&self, stream: usize, value: &Value) -> Result<()> {
        let mut probe = Node::empty_leaf(BlockId::UNASSIGNED, &self.layout)
            .map_err(|_| Error::Config(alloc::string::String::from("block too small for an empty leaf")))?;
        probe
            .leaf_mut(&self.layout)
            .insert(stream, 0, value)
            .map_err(|_| Error::EntryTooLarge { stream })
    }

    /// Splits the cursor's leaf and moves the cursor to the half that should
    /// take the insertion. Returns that half.
    fn split_leaf_in<P: BlockProvider>(&mut self, provider: &mut P, cursor: &mut Cursor<N>, leaf: Node) -> Result<Node> {
        let mut leaf = leaf;
        if cursor.path.is_empty() {
            cursor.leaf = self.grow_root_in(provider, &mut cursor.path)?;
            leaf = self.read_node(provider, cursor.leaf)?;
        }

        let stream = cursor.stream;
        let view = leaf.leaf(&self.layout);
        let size = view.size(stream);
        let split = if size >= 2 {
            view.stream(stream).split_point().clamp(1, size - 1)
        } else {
            cursor.idx
        };
        let go_right = cursor.idx >= split && split != 0;
        let points: Vec<usize> = (0..self.layout.streams().len())
            .map(|s| {
                let size = view.size(s);
                if s == stream {
                    split
                } else if size >= 2 {
                    view.stream(s).split_point().clamp(1, size - 1)
                } else if go_right {
                    size
                } else {
                    0
                }
            })
            .collect();

        debug!(leaf = %cursor.leaf, split, go_right, "split leaf");
        let depth = cursor.path.len();
        let (right, _) = self.split_node_in(provider, &mut cursor.path, depth, leaf, &points, go_right)?;
        if go_right {
            cursor.leaf = right;
            cursor.idx -= split;
        }
        cursor.prefix = self.prefix_of_path_in(provider, &cursor.path)?;
        let leaf = self.read_node(provider, cursor.leaf)?;
        cursor.leaf_size = leaf.leaf(&self.layout).size(stream);
        Ok(leaf)
    }

    /// Moves the tail of `node`, at depth `depth` below `path`, into a new
    /// right sibling and links the sibling into the parent.
    ///
    /// `follow_right` says whether `path` should lead to the new sibling
    /// afterwards. Returns the sibling and the number of levels the root grew.
    fn split_node_in<P: BlockProvider>(
        &mut self,
        provider: &mut P,
        path: &mut Vec<PathStep>,
        depth: usize,
        node: Node,
        points: &[usize],
        follow_right: bool,
    ) -> Result<(BlockId, usize)> {
        let right_id = self.allocate_node_in(provider)?;
        let level = node.level();
        let mut right = if level == 0 {
            Node::empty_leaf(right_id, &self.layout)
        } else {
            Node::empty_branch(right_id, &self.layout, level)
        }
        .map_err(|_| Error::invariant(right_id, "split", "block too small for an empty node"))?;

        let mut left = node;
        left.move_tail(&mut right, &self.layout, points)
            .map_err(|_| Error::invariant(left.id(), "split", "tail does not fit an empty node"))?;
        self.write_node(provider, &left)?;
        self.write_node(provider, &right)?;

        let grown = self.insert_right_in(
            provider,
            path,
            depth - 1,
            &left.summary(&self.layout),
            right_id,
            &right.summary(&self.layout),
            follow_right,
        )?;
        Ok((right_id, grown))
    }

    /// Refreshes the entry of the child at `path[depth]` to `left` and
    /// inserts `right_id` after it, splitting ancestors as needed.
    #[allow(clippy::too_many_arguments)]
    fn insert_right_in<P: BlockProvider>(
        &mut self,
        provider: &mut P,
        path: &mut Vec<PathStep>,
        depth: usize,
        left: &BranchNodeEntry<N>,
        right_id: BlockId,
        right: &BranchNodeEntry<N>,
        follow_right: bool,
    ) -> Result<usize> {
        let mut depth = depth;
        let mut grown = 0;
        for _ in 0..MAX_SPLITS {
            let step = path[depth];
            let parent = self.read_node(provider, step.id)?;
            let mut attempt = parent.clone();
            let result = {
                let mut branch = attempt.branch_mut(&self.layout);
                branch
                    .set_entry(step.idx, left)
                    .and_then(|()| branch.insert_child(step.idx + 1, right_id, right))
            };
            match result {
                Ok(()) => {
                    self.write_node(provider, &attempt)?;
                    path[depth].idx = step.idx + usize::from(follow_right);
                    return Ok(grown);
                }
                Err(CapacityExceeded) if depth == 0 => {
                    self.grow_root_in(provider, path)?;
                    depth += 1;
                    grown += 1;
                }
                Err(CapacityExceeded) => {
                    let split = parent.branch(&self.layout).split_point();
                    let follow = step.idx >= split;
                    debug!(branch = %step.id, split, follow, "split branch");
                    let (sibling, g) = self.split_node_in(provider, path, depth, parent, &[split], follow)?;
                    depth += g;
                    grown += g;
                    if follow {
                        path[depth] = PathStep {
                            id: sibling,
                            idx: step.idx - split,
                        };
                    }
                }
            }
        }
        Err(Error::invariant(path[depth].id, "split", "branch still full after repeated splits"))
    }

    /// Moves the root's content into a new child and makes the root a branch
    /// above it. The root block id never changes.
    ///
    /// `path` gains a leading step; the child's id is returned.
    fn grow_root_in<P: BlockProvider>(&mut self, provider: &mut P, path: &mut Vec<PathStep>) -> Result<BlockId> {
        let root = self.read_node(provider, self.root)?;
        let level = root
            .level()
            .checked_add(1)
            .ok_or_else(|| Error::invariant(self.root, "grow", "tree too deep"))?;
        let child_id = self.allocate_node_in(provider)?;
        let mut child = root.with_id(child_id);
        child
            .set_root(&self.layout, false)
            .map_err(|_| Error::invariant(child_id, "grow", "could not clear root flag"))?;
        self.write_node(provider, &child)?;

        let mut new_root = self.fresh_root(self.root, level)?;
        new_root
            .branch_mut(&self.layout)
            .insert_child(0, child_id, &child.summary::<N>(&self.layout))
            .map_err(|_| Error::invariant(self.root, "grow", "root cannot hold one child"))?;
        self.write_node(provider, &new_root)?;

        path.insert(0, PathStep { id: self.root, idx: 0 });
        if let Some(step) = path.get_mut(1) {
            step.id = child_id;
        }
        debug!(root = %self.root, level, "grew root");
        Ok(child_id)
    }

    /// Applies an element delta to every entry along `path`, bottom-up.
    /// `child` is the already written node the path leads to.
    fn propagate_in<P: BlockProvider>(
        &mut self,
        provider: &mut P,
        path: &[PathStep],
        child: &Node,
        add: &BranchNodeEntry<N>,
        sub: &BranchNodeEntry<N>,
    ) -> Result<()> {
        let track = self.layout.has_max_columns();
        let mut summary: BranchNodeEntry<N> = child.summary(&self.layout);
        for step in path.iter().rev() {
            let mut parent = self.read_node(provider, step.id)?;
            let mut entry = parent.branch(&self.layout).entry::<N>(step.idx);
            self.layout.apply_delta(&mut entry, add, sub, &summary);
            parent
                .branch_mut(&self.layout)
                .set_entry(step.idx, &entry)
                .map_err(|_| Error::invariant(step.id, "propagate", "entry rewrite overflowed"))?;
            self.write_node(provider, &parent)?;
            if track {
                summary = parent.summary(&self.layout);
            }
        }
        Ok(())
    }

    /// Removes the element under the cursor and returns it, or `None` at
    /// either sentinel.
    ///
    /// Afterwards the cursor is on the element that followed the removed
    /// one. Empty nodes are freed, underfull nodes merged with a sibling and
    /// a root left with a single child is collapsed into it.
    pub fn remove_in<P: BlockProvider>(&mut self, provider: &mut P, cursor: &mut Cursor<N>) -> Result<Option<Value>> {
        if cursor.state != CursorState::Entry {
            return Ok(None);
        }
        let stream = cursor.stream;
        let position = cursor.position();
        let mut leaf = self.read_node(provider, cursor.leaf)?;
        if cursor.idx >= leaf.leaf(&self.layout).size(stream) {
            return Err(Error::invariant(cursor.leaf, "remove", "cursor past the end of its leaf"));
        }
        let value = leaf.leaf(&self.layout).value(stream, cursor.idx);
        let entry = self.layout.entry_of::<N>(stream, &value)?;
        leaf.leaf_mut(&self.layout)
            .remove(stream, cursor.idx, cursor.idx + 1)
            .map_err(|_| Error::invariant(cursor.leaf, "remove", "shrinking a stream overflowed"))?;
        self.write_node(provider, &leaf)?;
        self.propagate_in(provider, &cursor.path, &leaf, &TreeLayout::zero::<N>(), &entry)?;

        self.rebalance_in(provider, &cursor.path, leaf)?;
        self.collapse_root_in(provider)?;
        *cursor = self.seek_in(provider, stream, position)?;
        Ok(Some(value))
    }

    /// Replaces the element under the cursor, returning the old one, or
    /// `None` at either sentinel.
    ///
    /// A replacement that no longer fits its leaf is carried out as a removal
    /// followed by an insertion at the same position.
    pub fn update_in<P: BlockProvider>(&mut self, provider: &mut P, cursor: &mut Cursor<N>, value: &Value) -> Result<Option<Value>> {
        if cursor.state != CursorState::Entry {
            return Ok(None);
        }
        let stream = cursor.stream;
        let new_entry = self.layout.entry_of::<N>(stream, value)?;
        let leaf = self.read_node(provider, cursor.leaf)?;
        if cursor.idx >= leaf.leaf(&self.layout).size(stream) {
            return Err(Error::invariant(cursor.leaf, "update", "cursor past the end of its leaf"));
        }
        let old = leaf.leaf(&self.layout).value(stream, cursor.idx);
        let old_entry = self.layout.entry_of::<N>(stream, &old)?;

        let mut attempt = leaf.clone();
        match attempt.leaf_mut(&self.layout).update(stream, cursor.idx, value) {
            Ok(()) => {
                self.write_node(provider, &attempt)?;
                self.propagate_in(provider, &cursor.path, &attempt, &new_entry, &old_entry)?;
            }
            Err(CapacityExceeded) => {
                trace!(leaf = %cursor.leaf, idx = cursor.idx, "update overflowed, reinserting");
                self.check_fits(stream, value)?;
                self.remove_in(provider, cursor)?;
                self.insert_in(provider, cursor, value)?;
            }
        }
        Ok(Some(old))
    }

    /// Walks up from `node`, the last node of `path`, detaching empty nodes
    /// and merging underfull ones into a sibling.
    fn rebalance_in<P: BlockProvider>(&mut self, provider: &mut P, path: &[PathStep], node: Node) -> Result<()> {
        let mut path = path.to_vec();
        let mut node = node;
        while let Some(step) = path.pop() {
            let mut parent = self.read_node(provider, step.id)?;
            if node.is_empty(&self.layout) {
                parent
                    .branch_mut(&self.layout)
                    .remove_children(step.idx, step.idx + 1)
                    .map_err(|_| Error::invariant(step.id, "rebalance", "removing a child overflowed"))?;
                self.write_node(provider, &parent)?;
                self.free_node_in(provider, node.id())?;
                debug!(block = %node.id(), parent = %step.id, "detached empty node");
            } else if !self.layout.is_underfull(node.used()) || !self.merge_in(provider, &mut parent, step.idx, &node)? {
                break;
            }
            node = parent;
        }
        Ok(())
    }

    /// Merges child `idx` of `parent` (currently `node`) with its right
    /// sibling, or failing that its left one. Returns whether a merge happened.
    fn merge_in<P: BlockProvider>(&mut self, provider: &mut P, parent: &mut Node, idx: usize, node: &Node) -> Result<bool> {
        let size = parent.branch(&self.layout).size();
        let mut pairs = Vec::with_capacity(2);
        if idx + 1 < size {
            pairs.push(idx);
        }
        if idx > 0 {
            pairs.push(idx - 1);
        }

        for left_idx in pairs {
            let (left, right) = if left_idx == idx {
                let sibling = parent.branch(&self.layout).child_id(idx + 1);
                (node.clone(), self.read_node(provider, sibling)?)
            } else {
                let sibling = parent.branch(&self.layout).child_id(left_idx);
                (self.read_node(provider, sibling)?, node.clone())
            };
            let mut merged = left;
            if merged.append(&right, &self.layout).is_err() {
                continue;
            }

            let mut attempt = parent.clone();
            {
                let mut branch = attempt.branch_mut(&self.layout);
                branch
                    .remove_children(left_idx + 1, left_idx + 2)
                    .and_then(|()| branch.set_entry(left_idx, &merged.summary::<N>(&self.layout)))
                    .map_err(|_| Error::invariant(parent.id(), "merge", "parent rewrite overflowed"))?;
            }
            self.write_node(provider, &merged)?;
            self.write_node(provider, &attempt)?;
            self.free_node_in(provider, right.id())?;
            debug!(left = %merged.id(), right = %right.id(), "merged siblings");
            *parent = attempt;
            return Ok(true);
        }
        Ok(false)
    }

    /// Replaces a root branch with a single child by that child, repeatedly.
    fn collapse_root_in<P: BlockProvider>(&mut self, provider: &mut P) -> Result<()> {
        loop {
            let root = self.read_node(provider, self.root)?;
            if root.is_leaf() {
                return Ok(());
            }
            let branch = root.branch(&self.layout);
            match branch.size() {
                0 => {
                    let fresh = self.fresh_root(self.root, 0)?;
                    self.write_node(provider, &fresh)?;
                    return Ok(());
                }
                1 => {
                    let child_id = branch.child_id(0);
                    let child = self.read_node(provider, child_id)?;
                    let mut promoted = child.with_id(self.root);
                    if promoted.set_root(&self.layout, true).is_err() {
                        // The child is too full to also carry the root record.
                        return Ok(());
                    }
                    self.write_node(provider, &promoted)?;
                    self.free_node_in(provider, child_id)?;
                    debug!(root = %self.root, level = promoted.level(), "collapsed root");
                }
                _ => return Ok(()),
            }
        }
    }
}

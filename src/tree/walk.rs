//! Root-to-leaf descent.
//!
//! Every query is a [`Walker`]: at each branch it picks a child from the
//! summary entries, at the leaf it picks a local index. The descent loop in
//! [`RawTree::descend_in`] is shared by seek, find, rank and select, and the
//! skip operations re-enter it from an ancestor on the cursor's path.

use alloc::vec::Vec;

use generic_array::ArrayLength;
use tracing::trace;

use crate::config::AggregateKind;
use crate::error::Error;
use crate::error::Result;
use crate::node::BranchNode;
use crate::node::LeafStream;
use crate::node::NodeRef;
use crate::packed::Find;
use crate::packed::SearchType;
use crate::provider::BlockId;
use crate::provider::BlockProvider;

use super::BranchNodeEntry;
use super::Cursor;
use super::CursorState;
use super::PathStep;
use super::RawTree;

/// One family of queries, expressed as a choice per node.
pub(crate) trait Walker {
    fn stream(&self) -> usize;

    /// Picks the child to descend into.
    fn branch(&mut self, branch: &BranchNode<'_>) -> usize;

    /// Picks the index within the leaf's stream; the stream size means past
    /// the end.
    fn leaf(&mut self, leaf: &LeafStream<'_>) -> usize;
}

/// Descends to the element at a position.
pub(crate) struct SeekWalker {
    stream: usize,
    size_column: usize,
    remaining: u64,
}

impl SeekWalker {
    pub(crate) fn new(stream: usize, size_column: usize, position: u64) -> Self {
        SeekWalker {
            stream,
            size_column,
            remaining: position,
        }
    }
}

fn to_index(value: u64, size: usize) -> usize {
    usize::try_from(value).map_or(size, |v| v.min(size))
}

impl Walker for SeekWalker {
    fn stream(&self) -> usize {
        self.stream
    }

    fn branch(&mut self, branch: &BranchNode<'_>) -> usize {
        match branch.find_forward(self.size_column, 0, self.remaining, SearchType::Gt) {
            Find::Found { idx, prefix } => {
                self.remaining -= prefix;
                idx
            }
            Find::NotFound { .. } => {
                let last = branch.size().saturating_sub(1);
                self.remaining -= branch.column_sum(self.size_column, 0, last);
                last
            }
        }
    }

    fn leaf(&mut self, leaf: &LeafStream<'_>) -> usize {
        to_index(self.remaining, leaf.size())
    }
}

/// Descends to the first element whose channel satisfies an upward search
/// (`Gt` or `Ge`).
///
/// Summed channels compare the running prefix, max channels the value itself.
pub(crate) struct FindWalker {
    stream: usize,
    channel: usize,
    column: usize,
    kind: AggregateKind,
    target: u64,
    search: SearchType,
    consumed: u64,
}

impl FindWalker {
    fn goal(&self) -> u64 {
        match self.kind {
            AggregateKind::Sum => self.target.saturating_sub(self.consumed),
            AggregateKind::Max => self.target,
        }
    }
}

impl Walker for FindWalker {
    fn stream(&self) -> usize {
        self.stream
    }

    fn branch(&mut self, branch: &BranchNode<'_>) -> usize {
        match branch.find_forward(self.column, 0, self.goal(), self.search) {
            Find::Found { idx, prefix } => {
                self.consumed = self.kind.combine(self.consumed, prefix);
                idx
            }
            // Not in this subtree: fall to the end of the last child.
            Find::NotFound { .. } => branch.size().saturating_sub(1),
        }
    }

    fn leaf(&mut self, leaf: &LeafStream<'_>) -> usize {
        match leaf.find_forward(self.channel, 0, self.goal(), self.search) {
            Find::Found { idx, .. } => idx,
            Find::NotFound { .. } => leaf.size(),
        }
    }
}

/// Seeks a position while aggregating one channel over everything before it.
pub(crate) struct RankWalker {
    seek: SeekWalker,
    channel: usize,
    column: usize,
    kind: AggregateKind,
    rank: u64,
}

impl Walker for RankWalker {
    fn stream(&self) -> usize {
        self.seek.stream
    }

    fn branch(&mut self, branch: &BranchNode<'_>) -> usize {
        let idx = self.seek.branch(branch);
        self.rank = self.kind.combine(self.rank, branch.column_sum(self.column, 0, idx));
        idx
    }

    fn leaf(&mut self, leaf: &LeafStream<'_>) -> usize {
        let idx = self.seek.leaf(leaf);
        self.rank = self.kind.combine(self.rank, leaf.prefix(self.channel, idx));
        idx
    }
}

/// Descends to the `k`-th element (1-based) counted by a summed channel.
pub(crate) struct SelectWalker {
    stream: usize,
    channel: usize,
    column: usize,
    remaining: u64,
    found: bool,
}

impl Walker for SelectWalker {
    fn stream(&self) -> usize {
        self.stream
    }

    fn branch(&mut self, branch: &BranchNode<'_>) -> usize {
        match branch.find_forward(self.column, 0, self.remaining, SearchType::Ge) {
            Find::Found { idx, prefix } => {
                self.remaining -= prefix;
                idx
            }
            Find::NotFound { .. } => {
                self.found = false;
                branch.size().saturating_sub(1)
            }
        }
    }

    fn leaf(&mut self, leaf: &LeafStream<'_>) -> usize {
        match leaf.find_forward(self.channel, 0, self.remaining, SearchType::Ge) {
            Find::Found { idx, .. } if self.found => idx,
            _ => {
                self.found = false;
                leaf.size()
            }
        }
    }
}

impl<N: ArrayLength> RawTree<N> {
    /// Runs `walker` from `start`, which sits below `path` and has `prefix`
    /// to its left.
    pub(crate) fn descend_in<P: BlockProvider, W: Walker>(
        &self,
        provider: &P,
        mut path: Vec<PathStep>,
        start: BlockId,
        mut prefix: BranchNodeEntry<N>,
        walker: &mut W,
    ) -> Result<Cursor<N>> {
        let stream = walker.stream();
        let mut id = start;
        loop {
            let node = self.read_node(provider, id)?;
            match node.as_node_ref(&self.layout) {
                NodeRef::Branch(branch) => {
                    let size = branch.size();
                    if size == 0 {
                        return Err(Error::invariant(id, "descend", "branch without children"));
                    }
                    let idx = walker.branch(&branch).min(size - 1);
                    self.layout.combine(&mut prefix, &branch.sum_entries(0, idx));
                    path.push(PathStep { id, idx });
                    id = branch.child_id(idx);
                }
                NodeRef::Leaf(leaf) => {
                    let view = leaf.stream(stream);
                    let idx = walker.leaf(&view).min(view.size());
                    trace!(leaf = %id, idx, depth = path.len(), "descended");
                    return Ok(Cursor::new(
                        stream,
                        self.layout.size_column(stream),
                        path,
                        id,
                        idx,
                        view.size(),
                        prefix,
                    ));
                }
            }
        }
    }

    pub(crate) fn walk_in<P: BlockProvider, W: Walker>(&self, provider: &P, walker: &mut W) -> Result<Cursor<N>> {
        self.descend_in(provider, Vec::new(), self.root, crate::config::TreeLayout::zero::<N>(), walker)
    }

    /// Combined summary of everything left of the node `path` leads to.
    pub(crate) fn prefix_of_path_in<P: BlockProvider>(&self, provider: &P, path: &[PathStep]) -> Result<BranchNodeEntry<N>> {
        let mut prefix = crate::config::TreeLayout::zero::<N>();
        for step in path {
            let node = self.read_node(provider, step.id)?;
            let entries = node.branch(&self.layout).sum_entries(0, step.idx);
            self.layout.combine(&mut prefix, &entries);
        }
        Ok(prefix)
    }

    fn channel_column(&self, stream: usize, channel: usize) -> Result<usize> {
        self.check_stream(stream)?;
        if channel >= self.layout.stream(stream).channels {
            return Err(Error::Config(alloc::format!("stream {stream} has no channel {channel}")));
        }
        Ok(self.layout.channel_column(stream, channel))
    }

    /// A cursor at `position` of `stream`, or at the end if `position` is
    /// not below the stream size.
    pub fn seek_in<P: BlockProvider>(&self, provider: &P, stream: usize, position: u64) -> Result<Cursor<N>> {
        self.check_stream(stream)?;
        let mut walker = SeekWalker::new(stream, self.layout.size_column(stream), position);
        self.walk_in(provider, &mut walker)
    }

    pub fn begin_in<P: BlockProvider>(&self, provider: &P, stream: usize) -> Result<Cursor<N>> {
        self.seek_in(provider, stream, 0)
    }

    pub fn end_in<P: BlockProvider>(&self, provider: &P, stream: usize) -> Result<Cursor<N>> {
        self.seek_in(provider, stream, u64::MAX)
    }

    /// A cursor at the first element of `stream` satisfying `search` against
    /// `key` on `channel`, or at the end.
    ///
    /// For a summed channel the running sum from the start of the stream is
    /// compared; for a max channel, each element's own value. With keys
    /// ascending along the stream, `SearchType::Ge` finds a key's lower bound.
    pub fn find_in<P: BlockProvider>(
        &self,
        provider: &P,
        stream: usize,
        channel: usize,
        key: u64,
        search: SearchType,
    ) -> Result<Cursor<N>> {
        let column = self.channel_column(stream, channel)?;
        let mut walker = FindWalker {
            stream,
            channel,
            column,
            kind: self.layout.kind(column),
            target: key,
            search,
            consumed: 0,
        };
        if !search.is_upward() {
            return self.find_downward_in(provider, stream, channel, key, search, walker.kind);
        }
        self.walk_in(provider, &mut walker)
    }

    /// `Lt` and `Le` fail from some point on over a running sum and can hold
    /// anywhere under a maximum, so summaries cannot pick the child. Scan the
    /// leaves from the front; on a summed channel only the first element of
    /// the stream can start a match.
    fn find_downward_in<P: BlockProvider>(
        &self,
        provider: &P,
        stream: usize,
        channel: usize,
        key: u64,
        search: SearchType,
        kind: AggregateKind,
    ) -> Result<Cursor<N>> {
        let mut cursor = self.begin_in(provider, stream)?;
        while cursor.state == CursorState::Entry {
            let node = self.read_node(provider, cursor.leaf)?;
            let leaf = node.leaf(&self.layout);
            match leaf.stream(stream).find_forward(channel, cursor.idx, key, search) {
                Find::Found { idx, .. } => {
                    cursor.idx = idx;
                    return Ok(cursor);
                }
                Find::NotFound { .. } if kind == AggregateKind::Sum => break,
                Find::NotFound { .. } => {
                    let rest = (cursor.leaf_size - cursor.idx) as u64;
                    self.skip_forward_in(provider, &mut cursor, rest)?;
                }
            }
        }
        self.end_in(provider, stream)
    }

    /// Aggregate of `channel` over positions `[0, position)` of `stream`.
    ///
    /// For a symbol stream, `channel` is the symbol and the result its count.
    pub fn rank_in<P: BlockProvider>(&self, provider: &P, stream: usize, position: u64, channel: usize) -> Result<u64> {
        let column = self.channel_column(stream, channel)?;
        let mut walker = RankWalker {
            seek: SeekWalker::new(stream, self.layout.size_column(stream), position),
            channel,
            column,
            kind: self.layout.kind(column),
            rank: 0,
        };
        self.walk_in(provider, &mut walker)?;
        Ok(walker.rank)
    }

    /// A cursor at the `k`-th (1-based) element counted by `channel`, or
    /// `None` if there are fewer than `k`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `channel` is aggregated by maximum.
    pub fn select_cursor_in<P: BlockProvider>(
        &self,
        provider: &P,
        stream: usize,
        channel: usize,
        k: u64,
    ) -> Result<Option<Cursor<N>>> {
        let column = self.channel_column(stream, channel)?;
        if self.layout.kind(column) != AggregateKind::Sum {
            return Err(Error::Config(alloc::format!("channel {channel} of stream {stream} is not summed")));
        }
        if k == 0 {
            return Ok(None);
        }
        let mut walker = SelectWalker {
            stream,
            channel,
            column,
            remaining: k,
            found: true,
        };
        let cursor = self.walk_in(provider, &mut walker)?;
        Ok(if walker.found && cursor.state == CursorState::Entry {
            Some(cursor)
        } else {
            None
        })
    }

    /// Position of the `k`-th (1-based) occurrence of `symbol`, or the
    /// `k`-th element counted by a summed channel.
    pub fn select_in<P: BlockProvider>(&self, provider: &P, stream: usize, symbol: usize, k: u64) -> Result<Option<u64>> {
        Ok(self
            .select_cursor_in(provider, stream, symbol, k)?
            .map(|cursor| cursor.position()))
    }

    /// Moves `cursor` `n` elements forward, stopping at the end.
    ///
    /// Returns how far the cursor actually moved. Leaving
    /// [`CursorState::BeforeBegin`] counts as one step.
    pub fn skip_forward_in<P: BlockProvider>(&self, provider: &P, cursor: &mut Cursor<N>, n: u64) -> Result<u64> {
        let mut n = n;
        let mut moved = 0;
        if n == 0 {
            return Ok(0);
        }
        if cursor.state == CursorState::BeforeBegin {
            *cursor = self.begin_in(provider, cursor.stream)?;
            n -= 1;
            moved = 1;
        }
        if n == 0 || cursor.state == CursorState::End {
            return Ok(moved);
        }

        let start = cursor.position();
        // Saturation only happens far past the end, where the climb below clamps.
        let local = (cursor.idx as u64).saturating_add(n);
        if local < cursor.leaf_size as u64 {
            cursor.idx = local as usize;
            return Ok(moved.saturating_add(n));
        }

        let stream = cursor.stream;
        let size_column = cursor.size_column;
        // Elements still to pass once the cursor's leaf is exhausted.
        let mut remaining = local - cursor.leaf_size as u64;
        let mut path = cursor.path.clone();
        while let Some(step) = path.pop() {
            let node = self.read_node(provider, step.id)?;
            let branch = node.branch(&self.layout);
            match branch.find_forward(size_column, step.idx + 1, remaining, SearchType::Gt) {
                Find::Found { idx, prefix } => {
                    remaining -= prefix;
                    let child = branch.child_id(idx);
                    path.push(PathStep { id: step.id, idx });
                    let left = self.prefix_of_path_in(provider, &path)?;
                    let mut walker = SeekWalker::new(stream, size_column, remaining);
                    *cursor = self.descend_in(provider, path, child, left, &mut walker)?;
                    return Ok(moved + cursor.position() - start);
                }
                Find::NotFound { total } => remaining -= total,
            }
        }

        *cursor = self.end_in(provider, stream)?;
        Ok(moved + cursor.position() - start)
    }

    /// Moves `cursor` `n` elements backward, stopping before the first.
    ///
    /// Returns how far the cursor actually moved. Reaching
    /// [`CursorState::BeforeBegin`] from position 0 counts as one step.
    pub fn skip_backward_in<P: BlockProvider>(&self, provider: &P, cursor: &mut Cursor<N>, n: u64) -> Result<u64> {
        if n == 0 || cursor.state == CursorState::BeforeBegin {
            return Ok(0);
        }
        let start = cursor.position();
        if n <= cursor.idx as u64 {
            cursor.idx -= n as usize;
            cursor.settle();
            return Ok(n);
        }

        let stream = cursor.stream;
        let size_column = cursor.size_column;
        // Elements still to pass before the start of the cursor's leaf.
        let mut remaining = n - cursor.idx as u64;
        let mut path = cursor.path.clone();
        while let Some(step) = path.pop() {
            let node = self.read_node(provider, step.id)?;
            let branch = node.branch(&self.layout);
            match branch.find_backward(size_column, step.idx, remaining, SearchType::Ge) {
                Find::Found { idx, prefix } => {
                    let local = branch.column(idx, size_column) - (remaining - prefix);
                    let child = branch.child_id(idx);
                    path.push(PathStep { id: step.id, idx });
                    let left = self.prefix_of_path_in(provider, &path)?;
                    let mut walker = SeekWalker::new(stream, size_column, local);
                    *cursor = self.descend_in(provider, path, child, left, &mut walker)?;
                    return Ok(start - cursor.position());
                }
                Find::NotFound { total } => remaining -= total,
            }
        }

        *cursor = self.begin_in(provider, stream)?;
        cursor.state = CursorState::BeforeBegin;
        Ok(start + 1)
    }

    /// Steps forward once. Returns whether the cursor is on an element.
    pub fn next_in<P: BlockProvider>(&self, provider: &P, cursor: &mut Cursor<N>) -> Result<bool> {
        self.skip_forward_in(provider, cursor, 1)?;
        Ok(cursor.state == CursorState::Entry)
    }

    /// Steps backward once. Returns whether the cursor is on an element.
    pub fn prev_in<P: BlockProvider>(&self, provider: &P, cursor: &mut Cursor<N>) -> Result<bool> {
        self.skip_backward_in(provider, cursor, 1)?;
        Ok(cursor.state == CursorState::Entry)
    }
}

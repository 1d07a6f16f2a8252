use generic_array::ArrayLength;

use crate::error::Error;
use crate::error::Result;
use crate::node::Node;
use crate::packed::Value;
use crate::provider::BlockProvider;

use super::Cursor;
use super::CursorState;
use super::RawTree;

/// An iterator over one stream of a tree, in order, starting at a cursor.
///
/// Each leaf is read once. Any error ends the iteration after being yielded.
///
/// This struct is created by [`RawTree::iter_in`] and [`Tree::iter`](super::Tree::iter).
pub struct Iter<'t, P: BlockProvider, N: ArrayLength> {
    tree: &'t RawTree<N>,
    provider: &'t P,
    cursor: Option<Cursor<N>>,
    leaf: Option<Node>,
    remaining: usize,
}

impl<'t, P: BlockProvider, N: ArrayLength> Iter<'t, P, N> {
    pub(crate) fn new(tree: &'t RawTree<N>, provider: &'t P, cursor: Cursor<N>, remaining: u64) -> Self {
        Iter {
            tree,
            provider,
            cursor: Some(cursor),
            leaf: None,
            remaining: usize::try_from(remaining).unwrap_or(usize::MAX),
        }
    }

    fn step(&mut self, cursor: &mut Cursor<N>) -> Result<Value> {
        let layout = self.tree.layout();
        let leaf = match self.leaf.take() {
            Some(leaf) if leaf.id() == cursor.leaf() => leaf,
            _ => self.tree.read_node(self.provider, cursor.leaf())?,
        };
        let view = leaf.leaf(layout);
        if cursor.local_index() >= view.size(cursor.stream()) {
            return Err(Error::invariant(cursor.leaf(), "iterate", "cursor past the end of its leaf"));
        }
        let value = view.value(cursor.stream(), cursor.local_index());
        self.leaf = Some(leaf);
        self.tree.skip_forward_in(self.provider, cursor, 1)?;
        Ok(value)
    }
}

impl<P: BlockProvider, N: ArrayLength> Iterator for Iter<'_, P, N> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut cursor = self.cursor.take()?;
        if cursor.state() != CursorState::Entry {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(1);
        match self.step(&mut cursor) {
            Ok(value) => {
                self.cursor = Some(cursor);
                Some(Ok(value))
            }
            Err(e) => Some(Err(e)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.cursor {
            Some(_) => (0, Some(self.remaining)),
            None => (0, Some(0)),
        }
    }
}

impl<N: ArrayLength> RawTree<N> {
    /// Iterates `stream` from its first element.
    pub fn iter_in<'t, P: BlockProvider>(&'t self, provider: &'t P, stream: usize) -> Result<Iter<'t, P, N>> {
        let cursor = self.begin_in(provider, stream)?;
        self.iter_from_in(provider, cursor)
    }

    /// Iterates from `cursor` to the end of its stream.
    pub fn iter_from_in<'t, P: BlockProvider>(&'t self, provider: &'t P, cursor: Cursor<N>) -> Result<Iter<'t, P, N>> {
        let size = self.size_in(provider, cursor.stream())?;
        let remaining = if cursor.state() == CursorState::Entry {
            size - cursor.position()
        } else {
            0
        };
        Ok(Iter::new(self, provider, cursor, remaining))
    }
}

use generic_array::ArrayLength;

use crate::config::TreeLayout;
use crate::tree::BranchNodeEntry;

use super::BranchNode;
use super::BranchNodeMut;
use super::LeafNode;
use super::LeafNodeMut;
use super::Node;

pub enum NodeRef<'a> {
    Leaf(LeafNode<'a>),
    Branch(BranchNode<'a>),
}

impl<'a> NodeRef<'a> {
    pub fn into_leaf(self) -> LeafNode<'a> {
        match self {
            Self::Leaf(n) => n,
            Self::Branch(_) => panic!("Not a leaf node"),
        }
    }

    pub fn into_branch(self) -> BranchNode<'a> {
        match self {
            Self::Branch(n) => n,
            Self::Leaf(_) => panic!("Not a branch node"),
        }
    }

    pub fn summary<N: ArrayLength>(&self) -> BranchNodeEntry<N> {
        match self {
            Self::Leaf(n) => n.summary(),
            Self::Branch(n) => n.summary(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaf(n) => n.is_empty(),
            Self::Branch(n) => n.size() == 0,
        }
    }

    pub fn accept<V: NodeVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Self::Leaf(n) => visitor.visit_leaf(n),
            Self::Branch(n) => visitor.visit_branch(n),
        }
    }
}

pub enum MutNodeRef<'a> {
    Leaf(LeafNodeMut<'a>),
    Branch(BranchNodeMut<'a>),
}

impl<'a> MutNodeRef<'a> {
    pub fn into_leaf(self) -> LeafNodeMut<'a> {
        match self {
            Self::Leaf(n) => n,
            Self::Branch(_) => panic!("Not a leaf node"),
        }
    }

    pub fn into_branch(self) -> BranchNodeMut<'a> {
        match self {
            Self::Branch(n) => n,
            Self::Leaf(_) => panic!("Not a branch node"),
        }
    }
}

/// Per-kind behaviour run against a node by [`dispatch`].
pub trait NodeVisitor {
    type Output;

    fn visit_leaf(&mut self, leaf: &LeafNode<'_>) -> Self::Output;

    fn visit_branch(&mut self, branch: &BranchNode<'_>) -> Self::Output;
}

/// Classifies `node` and runs the matching half of `visitor`.
pub fn dispatch<V: NodeVisitor>(node: &Node, layout: &TreeLayout, visitor: &mut V) -> V::Output {
    node.as_node_ref(layout).accept(visitor)
}

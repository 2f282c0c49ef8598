use alloc::vec::Vec;
use core::iter::FusedIterator;

use crate::utils::{NIL, Node};

/// An ascending in-order iterator over the keys of a [`BoundedTree`](crate::BoundedTree).
///
/// Produced by [`BoundedTree::iter`](crate::BoundedTree::iter) and
/// [`BoundedTree::range_below`](crate::BoundedTree::range_below). The walk is
/// iterative, keeping at most one root-to-leaf path on an explicit stack, and
/// yields exactly as many keys as it was created for. Nodes past that point
/// are never visited.
#[derive(Debug)]
pub struct Iter<'a, T> {
    /// Arena the indices below point into
    nodes: &'a [Node<T>],
    /// Pending ancestors whose key has not been yielded yet
    stack: Vec<usize>,
    /// Keys left to yield
    remaining: usize,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(nodes: &'a [Node<T>], root: usize, remaining: usize) -> Self {
        let mut iter = Self {
            nodes,
            stack: Vec::new(),
            remaining,
        };
        if remaining > 0 {
            iter.push_left_spine(root);
        }
        iter
    }

    fn push_left_spine(&mut self, mut node: usize) {
        while node != NIL {
            self.stack.push(node);
            node = self.nodes[node].left;
        }
    }
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes,
            stack: self.stack.clone(),
            remaining: self.remaining,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }

        let nodes = self.nodes;
        let idx = self.stack.pop()?;
        self.remaining -= 1;
        if self.remaining > 0 {
            self.push_left_spine(nodes[idx].right);
        }
        Some(&nodes[idx].key)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

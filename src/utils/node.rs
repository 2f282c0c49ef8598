/// Index reserved for the sentinel.
///
/// It is never handed out by the arena, so every missing child and the parent
/// of the root point here. Reads through it see a black leaf with empty
/// subtrees; writes through it are dropped by the tree's accessors.
pub const NIL: usize = usize::MAX;

/// Red-Black tree node colors used to maintain tree balance properties.
///
/// Red-Black trees maintain balance by ensuring:
/// - Red nodes have black children
/// - All paths from a node to its leaves have equal black node counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// Red node - cannot be adjacent to another red node
    Red,
    /// Black node - contributes to black height
    Black,
}

/// A node in the tree containing its key, tree links and order statistics.
///
/// Links are arena indices, `NIL` standing in for the sentinel.
#[derive(Debug, Clone)]
pub struct Node<T> {
    /// The stored key
    pub key: T,

    /// Color of this node used for Red-Black balancing
    pub color: Color,

    /// Index of parent node (`NIL` for the root)
    pub parent: usize,

    /// Index of left child node (`NIL` if no left child)
    pub left: usize,

    /// Index of right child node (`NIL` if no right child)
    pub right: usize,

    /// Number of keys in the left subtree
    pub left_count: usize,

    /// Number of keys in the right subtree
    pub right_count: usize,
}

impl<T> Node<T> {
    /// Creates a detached red node hanging below `parent`.
    #[inline]
    pub const fn new(key: T, parent: usize) -> Self {
        Self {
            key,
            color: Color::Red,
            parent,
            left: NIL,
            right: NIL,
            left_count: 0,
            right_count: 0,
        }
    }

    /// Number of keys in the subtree rooted at this node, itself included.
    #[inline]
    pub const fn subtree_len(&self) -> usize {
        self.left_count + self.right_count + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_is_red_leaf() {
        let node = Node::new(7, 3);

        assert_eq!(node.key, 7);
        assert_eq!(node.color, Color::Red);
        assert_eq!(node.parent, 3);
        assert_eq!(node.left, NIL);
        assert_eq!(node.right, NIL);
        assert_eq!(node.left_count, 0);
        assert_eq!(node.right_count, 0);
        assert_eq!(node.subtree_len(), 1);
    }

    #[test]
    fn test_root_node_parent_is_sentinel() {
        let node = Node::new("root", NIL);
        assert_eq!(node.parent, NIL);
    }

    #[test]
    fn test_subtree_len_counts_both_sides() {
        let mut node = Node::new(1u8, NIL);
        node.left_count = 4;
        node.right_count = 2;
        assert_eq!(node.subtree_len(), 7);
    }
}

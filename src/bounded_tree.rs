use alloc::vec::Vec;
use core::cmp::Ordering;

use log::{debug, trace};
use num_traits::ToPrimitive;

use crate::{
    Iter, TreeError,
    utils::{Color, NIL, Node},
};

/// Upper bound on the arena slots reserved up front; larger trees grow on demand.
const PREALLOCATE_LIMIT: usize = 1 << 12;

/// Outcome of offering a key to [`BoundedTree::bounded_insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Admission<T> {
    /// The tree had room and the key was added
    Inserted,
    /// The tree was full, so its maximum (carried here) was evicted to admit the key
    Replaced(T),
    /// The tree was full and the key was not below its maximum; the key is handed back
    Rejected(T),
}

impl<T> Admission<T> {
    /// Returns `true` if the offered key is now retained by the tree
    #[inline]
    pub const fn is_admitted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    /// Returns the evicted maximum, if the admission displaced one
    #[inline]
    pub fn evicted(self) -> Option<T> {
        match self {
            Self::Replaced(evicted) => Some(evicted),
            _ => None,
        }
    }

    /// Maps the carried key, keeping the admission decision
    ///
    /// # Arguments
    ///
    /// * `f` - Conversion applied to the evicted or rejected key
    ///
    /// # Returns
    ///
    /// * `Admission<U>` - The same decision over the converted key
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Admission<U> {
        match self {
            Self::Inserted => Admission::Inserted,
            Self::Replaced(evicted) => Admission::Replaced(f(evicted)),
            Self::Rejected(rejected) => Admission::Rejected(f(rejected)),
        }
    }
}

/// A size-bounded Red-Black tree retaining the `k` smallest keys offered to it.
///
/// Every node carries the sizes of its left and right subtrees, so rank and
/// positional queries run in O(log n) next to the usual ordered-set
/// operations. The tree never holds more than `capacity` keys: once full,
/// [`bounded_insert`](Self::bounded_insert) evicts the current maximum to
/// make room for a smaller key and discards anything else.
///
/// Nodes live in a densely packed arena and refer to each other by index,
/// with the reserved `NIL` index acting as the shared black sentinel. Removing
/// a node drops its key at once and compacts the arena.
///
/// Duplicate keys are retained individually (multiset behavior); ties route
/// to the right on insertion.
///
/// # Examples
///
/// ```
/// use kmin_tree::BoundedTree;
///
/// let mut tree = BoundedTree::new(4);
/// tree.extend([5, 798, 142, 183, 800, 293, 640, 172, 21, 1]);
///
/// assert_eq!(tree.to_vec(), [1, 5, 21, 142]);
/// assert_eq!(tree.rank(&21), 2);
/// ```
#[derive(Debug, Clone)]
pub struct BoundedTree<T> {
    /// Node arena; every slot holds a node reachable from `root`
    nodes: Vec<Node<T>>,

    /// Index of the root node in the arena
    /// Equal to `NIL` when the tree is empty
    root: usize,

    /// Maximum number of keys this tree retains, fixed at construction
    capacity: usize,
}

impl<T> BoundedTree<T> {
    /// Creates an empty tree retaining at most `capacity` keys.
    ///
    /// A capacity of zero is allowed and rejects every bounded insertion.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The number of smallest keys to retain
    ///
    /// # Returns
    ///
    /// * `Self` - An empty tree
    pub fn new(capacity: usize) -> Self {
        debug!("creating bounded tree with capacity {capacity}");
        Self {
            nodes: Vec::with_capacity(capacity.min(PREALLOCATE_LIMIT)),
            root: NIL,
            capacity,
        }
    }

    /// Creates an empty tree from any primitive integer capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The requested capacity, possibly signed
    ///
    /// # Returns
    ///
    /// * `Result<Self, TreeError>` - The tree, or [`TreeError::InvalidCapacity`]
    ///   if `capacity` is negative or too large for `usize`
    ///
    /// # Examples
    ///
    /// ```
    /// use kmin_tree::{BoundedTree, TreeError};
    ///
    /// assert!(BoundedTree::<u32>::try_with_capacity(10i64).is_ok());
    /// assert_eq!(
    ///     BoundedTree::<u32>::try_with_capacity(-1i64).unwrap_err(),
    ///     TreeError::InvalidCapacity
    /// );
    /// ```
    pub fn try_with_capacity<C: ToPrimitive>(capacity: C) -> Result<Self, TreeError> {
        capacity
            .to_usize()
            .map(Self::new)
            .ok_or(TreeError::InvalidCapacity)
    }

    /// Returns the number of keys currently retained
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the maximum number of keys the tree retains
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if the tree holds no keys
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }

    /// Returns `true` if the tree holds `capacity` keys
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Returns how many more keys fit before eviction starts
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.len()
    }

    /// Drops every key, keeping the capacity.
    pub fn clear(&mut self) {
        debug!("clearing bounded tree holding {} keys", self.len());
        self.nodes.clear();
        self.root = NIL;
    }

    /// Returns the smallest retained key, or `None` if the tree is empty
    pub fn min(&self) -> Option<&T> {
        self.key_at(self.find_minimum(self.root))
    }

    /// Returns the largest retained key, or `None` if the tree is empty
    pub fn max(&self) -> Option<&T> {
        self.key_at(self.find_maximum(self.root))
    }

    /// Returns the key at position `index` in ascending order.
    ///
    /// # Arguments
    ///
    /// * `index` - Zero-based position, `0` being the minimum
    ///
    /// # Returns
    ///
    /// * `Option<&T>` - The key, or `None` if `index >= len()`
    pub fn select(&self, index: usize) -> Option<&T> {
        let mut current = self.root;
        let mut remaining_rank = index;

        while current != NIL {
            let node = &self.nodes[current];
            match remaining_rank.cmp(&node.left_count) {
                Ordering::Less => current = node.left,
                Ordering::Equal => return Some(&node.key),
                Ordering::Greater => {
                    remaining_rank -= node.left_count + 1;
                    current = node.right;
                }
            }
        }
        None
    }

    /// Returns an iterator over all retained keys in ascending order.
    ///
    /// The iterator borrows the tree; a fresh one may be taken at any time
    /// and reflects the tree's state at that moment.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(&self.nodes, self.root, self.len())
    }

    /// Copies the retained keys into a vector in ascending order
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }

    /// Consumes the tree, returning its keys in ascending order.
    pub fn into_sorted_vec(self) -> Vec<T> {
        let mut positions = alloc::vec![0; self.len()];
        let mut stack = Vec::new();
        let mut current = self.root;
        let mut position = 0;

        while current != NIL || !stack.is_empty() {
            while current != NIL {
                stack.push(current);
                current = self.nodes[current].left;
            }
            if let Some(idx) = stack.pop() {
                positions[idx] = position;
                position += 1;
                current = self.nodes[idx].right;
            }
        }

        let mut keyed: Vec<(usize, T)> = positions
            .into_iter()
            .zip(self.nodes)
            .map(|(position, node)| (position, node.key))
            .collect();
        keyed.sort_unstable_by_key(|&(position, _)| position);
        keyed.into_iter().map(|(_, key)| key).collect()
    }

    #[inline]
    fn key_at(&self, idx: usize) -> Option<&T> {
        // `NIL` is out of range, so the sentinel maps to `None`
        self.nodes.get(idx).map(|node| &node.key)
    }

    #[inline]
    fn get_parent(&self, node: usize) -> usize {
        if node == NIL {
            NIL
        } else {
            self.nodes[node].parent
        }
    }

    #[inline]
    fn get_left(&self, node: usize) -> usize {
        if node == NIL {
            NIL
        } else {
            self.nodes[node].left
        }
    }

    #[inline]
    fn get_right(&self, node: usize) -> usize {
        if node == NIL {
            NIL
        } else {
            self.nodes[node].right
        }
    }

    #[inline]
    fn get_color(&self, node: usize) -> Color {
        if node == NIL {
            Color::Black
        } else {
            self.nodes[node].color
        }
    }

    #[inline]
    fn set_color(&mut self, node: usize, color: Color) {
        if node != NIL {
            self.nodes[node].color = color;
        }
    }

    #[inline]
    fn is_red(&self, node: usize) -> bool {
        self.get_color(node) == Color::Red
    }

    #[inline]
    fn is_black(&self, node: usize) -> bool {
        self.get_color(node) == Color::Black
    }

    #[inline]
    fn subtree_len(&self, node: usize) -> usize {
        if node == NIL {
            0
        } else {
            self.nodes[node].subtree_len()
        }
    }

    fn recalculate_counts(&mut self, node: usize) {
        if node == NIL {
            return;
        }

        let left_count = self.subtree_len(self.nodes[node].left);
        let right_count = self.subtree_len(self.nodes[node].right);

        let node = &mut self.nodes[node];
        node.left_count = left_count;
        node.right_count = right_count;
    }

    fn find_minimum(&self, mut node: usize) -> usize {
        while node != NIL {
            let left = self.nodes[node].left;
            if left == NIL {
                break;
            }
            node = left;
        }
        node
    }

    fn find_maximum(&self, mut node: usize) -> usize {
        while node != NIL {
            let right = self.nodes[node].right;
            if right == NIL {
                break;
            }
            node = right;
        }
        node
    }

    fn find_successor(&self, node: usize) -> usize {
        if node == NIL {
            return NIL;
        }

        let right = self.nodes[node].right;
        if right != NIL {
            return self.find_minimum(right);
        }

        let mut child = node;
        let mut parent = self.nodes[node].parent;
        while parent != NIL && child == self.nodes[parent].right {
            child = parent;
            parent = self.nodes[parent].parent;
        }
        parent
    }

    fn rotate_left(&mut self, x: usize) {
        let y = self.get_right(x);
        if y == NIL {
            return;
        }

        let y_left = self.nodes[y].left;
        self.nodes[x].right = y_left;
        if y_left != NIL {
            self.nodes[y_left].parent = x;
        }

        let x_parent = self.nodes[x].parent;
        self.nodes[y].parent = x_parent;

        if x_parent == NIL {
            self.root = y;
        } else if x == self.nodes[x_parent].left {
            self.nodes[x_parent].left = y;
        } else {
            self.nodes[x_parent].right = y;
        }

        self.nodes[y].left = x;
        self.nodes[x].parent = y;

        // x now sits below y, so its counts must be settled first
        self.recalculate_counts(x);
        self.recalculate_counts(y);
    }

    fn rotate_right(&mut self, y: usize) {
        let x = self.get_left(y);
        if x == NIL {
            return;
        }

        let x_right = self.nodes[x].right;
        self.nodes[y].left = x_right;
        if x_right != NIL {
            self.nodes[x_right].parent = y;
        }

        let y_parent = self.nodes[y].parent;
        self.nodes[x].parent = y_parent;

        if y_parent == NIL {
            self.root = x;
        } else if y == self.nodes[y_parent].left {
            self.nodes[y_parent].left = x;
        } else {
            self.nodes[y_parent].right = x;
        }

        self.nodes[x].right = y;
        self.nodes[y].parent = x;

        self.recalculate_counts(y);
        self.recalculate_counts(x);
    }

    fn fix_insertion_violations(&mut self, mut node: usize) {
        while node != self.root && self.is_red(self.get_parent(node)) {
            let parent = self.get_parent(node);
            let grandparent = self.get_parent(parent);

            if parent == self.get_left(grandparent) {
                let uncle = self.get_right(grandparent);

                if self.is_red(uncle) {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    node = grandparent;
                } else {
                    if node == self.get_right(parent) {
                        node = parent;
                        self.rotate_left(node);
                    }
                    let updated_parent = self.get_parent(node);
                    let updated_grandparent = self.get_parent(updated_parent);
                    self.set_color(updated_parent, Color::Black);
                    self.set_color(updated_grandparent, Color::Red);
                    self.rotate_right(updated_grandparent);
                }
            } else {
                let uncle = self.get_left(grandparent);

                if self.is_red(uncle) {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    node = grandparent;
                } else {
                    if node == self.get_left(parent) {
                        node = parent;
                        self.rotate_right(node);
                    }
                    let updated_parent = self.get_parent(node);
                    let updated_grandparent = self.get_parent(updated_parent);
                    self.set_color(updated_parent, Color::Black);
                    self.set_color(updated_grandparent, Color::Red);
                    self.rotate_left(updated_grandparent);
                }
            }
        }
        self.set_color(self.root, Color::Black);
    }

    /// Unlinks the node at `target` and returns its key.
    ///
    /// A node with two children keeps its slot and takes over its successor's
    /// key instead; the successor, which has at most one child, is the node
    /// physically spliced out.
    fn delete_node(&mut self, target: usize) -> T {
        let spliced = if self.nodes[target].left == NIL || self.nodes[target].right == NIL {
            target
        } else {
            self.find_minimum(self.nodes[target].right)
        };

        let child = if self.nodes[spliced].left != NIL {
            self.nodes[spliced].left
        } else {
            self.nodes[spliced].right
        };
        let parent = self.nodes[spliced].parent;
        let from_left = parent != NIL && self.nodes[parent].left == spliced;
        let spliced_color = self.nodes[spliced].color;

        self.transplant(spliced, child);
        if spliced != target {
            self.swap_keys(target, spliced);
        }

        self.decrement_counts_to_root(parent, from_left);

        if spliced_color == Color::Black {
            self.fix_deletion_violations(child, parent);
        }

        self.release(spliced)
    }

    fn transplant(&mut self, old_node: usize, new_node: usize) {
        let parent = self.nodes[old_node].parent;

        if parent == NIL {
            self.root = new_node;
        } else if old_node == self.nodes[parent].left {
            self.nodes[parent].left = new_node;
        } else {
            self.nodes[parent].right = new_node;
        }

        if new_node != NIL {
            self.nodes[new_node].parent = parent;
        }
    }

    fn swap_keys(&mut self, a: usize, b: usize) {
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.nodes.split_at_mut(high);
        core::mem::swap(&mut head[low].key, &mut tail[0].key);
    }

    /// Walks from the splice point to the root, taking one key off the side
    /// the walk arrives from at every ancestor.
    ///
    /// The side is read from the links rather than from key comparisons, so
    /// ancestors holding a key equal to the removed one are charged on the
    /// side that actually lost the node.
    fn decrement_counts_to_root(&mut self, mut node: usize, mut from_left: bool) {
        while node != NIL {
            let current = &mut self.nodes[node];
            if from_left {
                current.left_count -= 1;
            } else {
                current.right_count -= 1;
            }

            let child = node;
            node = current.parent;
            from_left = node != NIL && self.nodes[node].left == child;
        }
    }

    /// Restores the black height after a black node was spliced out above
    /// `node`. `parent` is tracked explicitly since `node` may be the sentinel.
    fn fix_deletion_violations(&mut self, mut node: usize, mut parent: usize) {
        while node != self.root && self.is_black(node) {
            if node == self.get_left(parent) {
                let mut sibling = self.get_right(parent);

                if self.is_red(sibling) {
                    self.set_color(sibling, Color::Black);
                    self.set_color(parent, Color::Red);
                    self.rotate_left(parent);
                    sibling = self.get_right(parent);
                }

                if self.is_black(self.get_left(sibling)) && self.is_black(self.get_right(sibling)) {
                    self.set_color(sibling, Color::Red);
                    node = parent;
                    parent = self.get_parent(node);
                } else {
                    if self.is_black(self.get_right(sibling)) {
                        self.set_color(self.get_left(sibling), Color::Black);
                        self.set_color(sibling, Color::Red);
                        self.rotate_right(sibling);
                        sibling = self.get_right(parent);
                    }

                    self.set_color(sibling, self.get_color(parent));
                    self.set_color(parent, Color::Black);
                    self.set_color(self.get_right(sibling), Color::Black);
                    self.rotate_left(parent);
                    node = self.root;
                }
            } else {
                let mut sibling = self.get_left(parent);

                if self.is_red(sibling) {
                    self.set_color(sibling, Color::Black);
                    self.set_color(parent, Color::Red);
                    self.rotate_right(parent);
                    sibling = self.get_left(parent);
                }

                if self.is_black(self.get_right(sibling)) && self.is_black(self.get_left(sibling)) {
                    self.set_color(sibling, Color::Red);
                    node = parent;
                    parent = self.get_parent(node);
                } else {
                    if self.is_black(self.get_left(sibling)) {
                        self.set_color(self.get_right(sibling), Color::Black);
                        self.set_color(sibling, Color::Red);
                        self.rotate_left(sibling);
                        sibling = self.get_left(parent);
                    }

                    self.set_color(sibling, self.get_color(parent));
                    self.set_color(parent, Color::Black);
                    self.set_color(self.get_left(sibling), Color::Black);
                    self.rotate_right(parent);
                    node = self.root;
                }
            }
        }

        self.set_color(node, Color::Black);
    }

    /// Drops the detached node at `idx` by moving the last arena slot into it.
    fn release(&mut self, idx: usize) -> T {
        let last = self.nodes.len() - 1;

        if idx != last {
            let (parent, left, right) = {
                let moved = &self.nodes[last];
                (moved.parent, moved.left, moved.right)
            };

            if parent == NIL {
                self.root = idx;
            } else if self.nodes[parent].left == last {
                self.nodes[parent].left = idx;
            } else {
                self.nodes[parent].right = idx;
            }
            if left != NIL {
                self.nodes[left].parent = idx;
            }
            if right != NIL {
                self.nodes[right].parent = idx;
            }
        }

        self.nodes.swap_remove(idx).key
    }

    /// Returns the black height and size of the subtree at `node`, or `None`
    /// if coloring, parent links or cached counts are inconsistent in it.
    #[cfg(any(test, debug_assertions))]
    fn verify_subtree(&self, node: usize) -> Option<(usize, usize)> {
        if node == NIL {
            return Some((1, 0));
        }

        let node_ref = &self.nodes[node];

        if self.is_red(node) && (self.is_red(node_ref.left) || self.is_red(node_ref.right)) {
            return None;
        }

        for child in [node_ref.left, node_ref.right] {
            if child != NIL && self.nodes[child].parent != node {
                return None;
            }
        }

        let (left_height, left_len) = self.verify_subtree(node_ref.left)?;
        let (right_height, right_len) = self.verify_subtree(node_ref.right)?;

        if left_height != right_height
            || node_ref.left_count != left_len
            || node_ref.right_count != right_len
        {
            return None;
        }

        let height = if self.is_black(node) {
            left_height + 1
        } else {
            left_height
        };
        Some((height, left_len + right_len + 1))
    }

    #[cfg(test)]
    fn height(&self, node: usize) -> usize {
        if node == NIL {
            0
        } else {
            1 + self
                .height(self.nodes[node].left)
                .max(self.height(self.nodes[node].right))
        }
    }
}

impl<T: Ord> BoundedTree<T> {
    /// Offers a key to the tree under its capacity policy.
    ///
    /// While the tree has room the key is inserted. Once full, a key smaller
    /// than the current maximum evicts that maximum and takes its place;
    /// any other key is handed back untouched, leaving the tree unchanged.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to offer
    ///
    /// # Returns
    ///
    /// * `Admission<T>` - What the tree did with the key
    pub fn bounded_insert(&mut self, key: T) -> Admission<T> {
        if self.len() < self.capacity {
            self.insert_node(key);
            trace!("admitted key, {}/{} slots used", self.len(), self.capacity);
            return Admission::Inserted;
        }

        let max = self.find_maximum(self.root);
        if max == NIL || key >= self.nodes[max].key {
            trace!("rejected key not below the maximum of {} retained", self.len());
            return Admission::Rejected(key);
        }

        let evicted = self.delete_node(max);
        self.insert_node(key);
        trace!("evicted maximum to admit key, {} retained", self.len());

        #[cfg(debug_assertions)]
        debug_assert!(
            self.verify_invariants(),
            "tree invariants violated after eviction"
        );

        Admission::Replaced(evicted)
    }

    /// Inserts a key without evicting anything.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to insert
    ///
    /// # Returns
    ///
    /// * `Result<(), TreeError>` - [`TreeError::CapacityExhausted`] if the tree is full
    pub fn insert(&mut self, key: T) -> Result<(), TreeError> {
        if self.is_full() {
            return Err(TreeError::CapacityExhausted {
                capacity: self.capacity,
            });
        }
        self.insert_node(key);
        Ok(())
    }

    /// Removes one occurrence of `key`.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to remove
    ///
    /// # Returns
    ///
    /// * `Option<T>` - The removed key, or `None` if it was not present
    pub fn remove(&mut self, key: &T) -> Option<T> {
        let node = self.find_node(key);
        if node == NIL {
            return None;
        }

        let removed = self.delete_node(node);

        #[cfg(debug_assertions)]
        debug_assert!(
            self.verify_invariants(),
            "tree invariants violated after removal"
        );

        Some(removed)
    }

    /// Returns `true` if at least one occurrence of `key` is retained
    pub fn contains(&self, key: &T) -> bool {
        self.find_node(key) != NIL
    }

    /// Returns the retained key equal to `key`, if any
    pub fn get(&self, key: &T) -> Option<&T> {
        self.key_at(self.find_node(key))
    }

    /// Returns the key following an occurrence of `key` in ascending order.
    ///
    /// With duplicates the successor of one occurrence may be an equal key.
    ///
    /// # Returns
    ///
    /// * `Option<&T>` - `None` if `key` is absent or is the maximum
    pub fn successor(&self, key: &T) -> Option<&T> {
        self.key_at(self.find_successor(self.find_node(key)))
    }

    /// Returns the number of retained keys strictly smaller than `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kmin_tree::BoundedTree;
    ///
    /// let mut tree = BoundedTree::new(8);
    /// tree.extend([10, 20, 20, 30]);
    ///
    /// assert_eq!(tree.rank(&5), 0);
    /// assert_eq!(tree.rank(&20), 1);
    /// assert_eq!(tree.rank(&25), 3);
    /// ```
    pub fn rank(&self, key: &T) -> usize {
        let mut current = self.root;
        let mut smaller = 0;

        while current != NIL {
            let node = &self.nodes[current];
            if *key <= node.key {
                current = node.left;
            } else {
                smaller += node.left_count + 1;
                current = node.right;
            }
        }
        smaller
    }

    /// Returns the retained keys strictly smaller than `key`, ascending, at
    /// most `limit` of them.
    ///
    /// The iterator stops at the first key not below `key` without visiting
    /// the rest of the tree.
    ///
    /// # Arguments
    ///
    /// * `key` - Exclusive upper bound
    /// * `limit` - Maximum number of keys yielded
    pub fn range_below(&self, key: &T, limit: usize) -> Iter<'_, T> {
        // The first `rank(key)` keys in order are exactly those below `key`
        Iter::new(&self.nodes, self.root, self.rank(key).min(limit))
    }

    fn find_node(&self, key: &T) -> usize {
        let mut current = self.root;

        while current != NIL {
            let node = &self.nodes[current];
            match key.cmp(&node.key) {
                Ordering::Equal => return current,
                Ordering::Less => current = node.left,
                Ordering::Greater => current = node.right,
            }
        }
        NIL
    }

    fn insert_node(&mut self, key: T) {
        let mut parent = NIL;
        let mut current = self.root;
        let mut go_left = false;

        while current != NIL {
            parent = current;
            let node = &mut self.nodes[current];
            go_left = key < node.key;
            if go_left {
                node.left_count += 1;
                current = node.left;
            } else {
                node.right_count += 1;
                current = node.right;
            }
        }

        let new_idx = self.nodes.len();
        self.nodes.push(Node::new(key, parent));

        if parent == NIL {
            self.root = new_idx;
        } else if go_left {
            self.nodes[parent].left = new_idx;
        } else {
            self.nodes[parent].right = new_idx;
        }

        self.fix_insertion_violations(new_idx);

        #[cfg(debug_assertions)]
        debug_assert!(
            self.verify_invariants(),
            "tree invariants violated after insertion"
        );
    }

    /// Checks ordering, coloring, counter and capacity invariants.
    #[cfg(any(test, debug_assertions))]
    fn verify_invariants(&self) -> bool {
        if self.len() > self.capacity {
            return false;
        }

        if self.root == NIL {
            return self.nodes.is_empty();
        }

        if !self.is_black(self.root) || self.nodes[self.root].parent != NIL {
            return false;
        }

        match self.verify_subtree(self.root) {
            Some((_, len)) if len == self.len() => {}
            _ => return false,
        }

        let mut keys = self.iter();
        let mut previous = keys.next();
        for key in keys {
            if previous.is_some_and(|previous| previous > key) {
                return false;
            }
            previous = Some(key);
        }
        true
    }
}

impl<T: Ord> Extend<T> for BoundedTree<T> {
    /// Feeds every key through [`bounded_insert`](BoundedTree::bounded_insert).
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for key in iter {
            let _ = self.bounded_insert(key);
        }
    }
}

impl<'a, T> IntoIterator for &'a BoundedTree<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::{collection::vec as prop_vec, prelude::*};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn assert_valid<T: Ord>(tree: &BoundedTree<T>) {
        assert!(tree.verify_invariants(), "tree invariants violated");

        // Height bound implied by the black height: h <= 2 * log2(n + 1)
        let height = tree.height(tree.root) as f64;
        let bound = 2.0 * ((tree.len() + 1) as f64).log2();
        assert!(height <= bound, "height {height} exceeds {bound}");
    }

    fn k_smallest_by_sorting(stream: &[i32], k: usize) -> Vec<i32> {
        let mut sorted = stream.to_vec();
        sorted.sort_unstable();
        sorted.truncate(k);
        sorted
    }

    #[test]
    fn test_tree_creation() {
        let tree = BoundedTree::<i32>::new(10);
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.capacity(), 10);
        assert_eq!(tree.remaining_capacity(), 10);
        assert!(tree.is_empty());
        assert!(!tree.is_full());
        assert_valid(&tree);
    }

    #[test]
    fn test_try_with_capacity() {
        assert_eq!(
            BoundedTree::<i32>::try_with_capacity(-1i32).unwrap_err(),
            TreeError::InvalidCapacity
        );
        assert_eq!(
            BoundedTree::<i32>::try_with_capacity(i64::MIN).unwrap_err(),
            TreeError::InvalidCapacity
        );
        assert_eq!(
            BoundedTree::<i32>::try_with_capacity(u128::MAX).unwrap_err(),
            TreeError::InvalidCapacity
        );

        let tree = BoundedTree::<i32>::try_with_capacity(0u8).unwrap();
        assert_eq!(tree.capacity(), 0);

        let tree = BoundedTree::<i32>::try_with_capacity(7i64).unwrap();
        assert_eq!(tree.capacity(), 7);
    }

    #[test]
    fn test_empty_tree_queries() {
        let tree = BoundedTree::<i32>::new(4);
        assert_eq!(tree.min(), None);
        assert_eq!(tree.max(), None);
        assert_eq!(tree.successor(&1), None);
        assert_eq!(tree.select(0), None);
        assert_eq!(tree.rank(&i32::MAX), 0);
        assert_eq!(tree.iter().count(), 0);
        assert_eq!(tree.range_below(&100, 10).count(), 0);
        assert!(!tree.contains(&0));
        assert_eq!(tree.into_sorted_vec(), Vec::<i32>::new());
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut tree = BoundedTree::new(0);
        assert_eq!(tree.bounded_insert(1), Admission::Rejected(1));
        assert_eq!(tree.bounded_insert(i32::MIN), Admission::Rejected(i32::MIN));
        assert_eq!(
            tree.insert(3),
            Err(TreeError::CapacityExhausted { capacity: 0 })
        );
        assert!(tree.is_empty());
        assert!(tree.is_full());
    }

    #[test]
    fn test_stream_scenario() {
        let stream = [5, 798, 142, 183, 800, 293, 640, 172, 21, 1];
        let mut tree = BoundedTree::new(4);

        tree.extend(stream[..4].iter().copied());
        assert_eq!(tree.to_vec(), vec![5, 142, 183, 798]);

        tree.extend(stream[4..].iter().copied());
        assert_eq!(tree.to_vec(), vec![1, 5, 21, 142]);
        assert_eq!(tree.len(), 4);
        assert_valid(&tree);
    }

    #[test]
    fn test_stream_checkpoints() {
        let stream = [5, 798, 142, 183, 800, 293, 640, 172, 21, 1];
        let mut tree = BoundedTree::new(4);
        let mut checkpoints = vec![];

        for (i, &key) in stream.iter().enumerate() {
            if i == 3 || i == 5 || i == 6 {
                checkpoints.push(tree.to_vec());
            }
            let _ = tree.bounded_insert(key);
        }

        assert_eq!(
            checkpoints,
            vec![
                vec![5, 142, 798],
                vec![5, 142, 183, 798],
                vec![5, 142, 183, 293],
            ]
        );
    }

    #[test]
    fn test_bounded_insert_outcomes() {
        let mut tree = BoundedTree::new(3);

        assert_eq!(tree.bounded_insert(30), Admission::Inserted);
        assert_eq!(tree.bounded_insert(10), Admission::Inserted);
        assert_eq!(tree.bounded_insert(20), Admission::Inserted);
        assert!(tree.is_full());

        assert_eq!(tree.bounded_insert(15), Admission::Replaced(30));
        assert_eq!(tree.bounded_insert(40), Admission::Rejected(40));
        assert_eq!(tree.bounded_insert(20), Admission::Rejected(20));
        assert_eq!(tree.to_vec(), vec![10, 15, 20]);
        assert_valid(&tree);
    }

    #[test]
    fn test_rejection_leaves_tree_unchanged() {
        let mut tree = BoundedTree::new(5);
        tree.extend([9, 4, 7, 1, 3]);
        let before = tree.to_vec();

        for key in [9, 10, 100, i32::MAX] {
            assert!(!tree.bounded_insert(key).is_admitted());
            assert_eq!(tree.to_vec(), before);
            assert_eq!(tree.len(), 5);
        }
    }

    #[test]
    fn test_admission_helpers() {
        let replaced: Admission<i32> = Admission::Replaced(4);
        assert!(replaced.is_admitted());
        assert_eq!(replaced.map(|k| k * 2), Admission::Replaced(8));
        assert_eq!(replaced.evicted(), Some(4));

        let rejected: Admission<i32> = Admission::Rejected(4);
        assert!(!rejected.is_admitted());
        assert_eq!(rejected.evicted(), None);
        assert_eq!(Admission::<i32>::Inserted.map(|k| k + 1), Admission::Inserted);
    }

    #[test]
    fn test_plain_insert_respects_capacity() {
        let mut tree = BoundedTree::new(2);
        assert_eq!(tree.insert(2), Ok(()));
        assert_eq!(tree.insert(1), Ok(()));
        assert_eq!(
            tree.insert(0),
            Err(TreeError::CapacityExhausted { capacity: 2 })
        );
        assert_eq!(tree.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_min_max_successor() {
        let mut tree = BoundedTree::new(10);
        tree.extend([50, 20, 80, 10, 30, 70, 90]);

        assert_eq!(tree.min(), Some(&10));
        assert_eq!(tree.max(), Some(&90));
        assert_eq!(tree.successor(&10), Some(&20));
        assert_eq!(tree.successor(&30), Some(&50));
        assert_eq!(tree.successor(&50), Some(&70));
        assert_eq!(tree.successor(&90), None);
        assert_eq!(tree.successor(&55), None);
    }

    #[test]
    fn test_remove() {
        let mut tree = BoundedTree::new(10);
        tree.extend([5, 2, 8, 1, 3, 7, 9]);

        assert_eq!(tree.remove(&100), None);
        assert_eq!(tree.len(), 7);

        assert_eq!(tree.remove(&5), Some(5));
        assert_valid(&tree);
        assert_eq!(tree.remove(&1), Some(1));
        assert_valid(&tree);
        assert_eq!(tree.remove(&8), Some(8));
        assert_valid(&tree);

        assert_eq!(tree.to_vec(), vec![2, 3, 7, 9]);
        assert_eq!(tree.remaining_capacity(), 6);

        for key in [2, 3, 7, 9] {
            assert_eq!(tree.remove(&key), Some(key));
            assert_valid(&tree);
        }
        assert!(tree.is_empty());
        assert_eq!(tree.min(), None);
    }

    #[test]
    fn test_duplicates() {
        let mut tree = BoundedTree::new(10);
        tree.extend([5, 5, 5, 3, 5, 7, 3]);

        assert_eq!(tree.len(), 7);
        assert_eq!(tree.rank(&5), 2);
        assert_eq!(tree.rank(&6), 6);
        assert!(matches!(tree.successor(&3), Some(&3) | Some(&5)));
        assert_eq!(tree.successor(&7), None);
        assert_valid(&tree);

        assert_eq!(tree.remove(&5), Some(5));
        assert_eq!(tree.remove(&5), Some(5));
        assert_valid(&tree);
        assert_eq!(tree.to_vec(), vec![3, 3, 5, 5, 7]);

        assert_eq!(tree.remove(&3), Some(3));
        assert_eq!(tree.remove(&5), Some(5));
        assert_eq!(tree.remove(&5), Some(5));
        assert_eq!(tree.remove(&5), None);
        assert_eq!(tree.to_vec(), vec![3, 7]);
        assert_valid(&tree);
    }

    #[test]
    fn test_duplicate_heavy_eviction() {
        let mut tree = BoundedTree::new(4);
        tree.extend([2, 2, 2, 2, 2, 1, 2, 1, 2]);

        assert_eq!(tree.to_vec(), vec![1, 1, 2, 2]);
        assert_valid(&tree);
    }

    #[test]
    fn test_rank_and_select() {
        let mut tree = BoundedTree::new(100);
        tree.extend((0..50).map(|i| i * 2));

        assert_eq!(tree.rank(&0), 0);
        assert_eq!(tree.rank(&1), 1);
        assert_eq!(tree.rank(&2), 1);
        assert_eq!(tree.rank(&51), 26);
        assert_eq!(tree.rank(&1000), 50);

        for i in 0..50 {
            assert_eq!(tree.select(i as usize), Some(&(i * 2)));
        }
        assert_eq!(tree.select(50), None);
    }

    #[test]
    fn test_range_below() {
        let mut tree = BoundedTree::new(10);
        tree.extend([40, 10, 30, 20, 50, 60]);

        let below: Vec<_> = tree.range_below(&35, usize::MAX).copied().collect();
        assert_eq!(below, vec![10, 20, 30]);

        let capped: Vec<_> = tree.range_below(&35, 2).copied().collect();
        assert_eq!(capped, vec![10, 20]);

        assert_eq!(tree.range_below(&10, 5).count(), 0);
        assert_eq!(tree.range_below(&35, 0).count(), 0);
        assert_eq!(tree.range_below(&1000, 100).len(), 6);

        // Restartable: a second pass over the same state yields the same keys
        let again: Vec<_> = tree.range_below(&35, usize::MAX).copied().collect();
        assert_eq!(again, below);
    }

    #[test]
    fn test_iter_is_exact_size_and_sorted() {
        let mut tree = BoundedTree::new(64);
        tree.extend((0..64).rev());

        let iter = tree.iter();
        assert_eq!(iter.len(), 64);
        let keys: Vec<_> = iter.copied().collect();
        assert_eq!(keys, (0..64).collect::<Vec<_>>());

        let mut partial = tree.iter();
        assert_eq!(partial.next(), Some(&0));
        assert_eq!(partial.len(), 63);
        let cloned: Vec<_> = partial.clone().collect();
        assert_eq!(cloned.len(), 63);

        let by_ref: Vec<_> = (&tree).into_iter().collect();
        assert_eq!(by_ref.len(), 64);
    }

    #[test]
    fn test_get_and_contains() {
        let mut tree = BoundedTree::new(4);
        tree.extend([3, 1, 4, 1]);

        assert!(tree.contains(&1));
        assert!(!tree.contains(&2));
        assert_eq!(tree.get(&4), Some(&4));
        assert_eq!(tree.get(&5), None);
    }

    #[test]
    fn test_clear() {
        let mut tree = BoundedTree::new(5);
        tree.extend(1..=5);
        assert!(tree.is_full());

        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.capacity(), 5);
        assert_eq!(tree.remaining_capacity(), 5);

        assert_eq!(tree.bounded_insert(42), Admission::Inserted);
        assert_eq!(tree.to_vec(), vec![42]);
    }

    #[test]
    fn test_into_sorted_vec_moves_keys() {
        let mut tree = BoundedTree::new(6);
        tree.extend(
            ["pear", "apple", "fig", "kiwi", "date", "lime", "banana"]
                .into_iter()
                .map(alloc::string::String::from),
        );

        assert_eq!(
            tree.into_sorted_vec(),
            vec!["apple", "banana", "date", "fig", "kiwi", "lime"]
        );
    }

    #[test]
    fn test_sequential_and_reverse_insertion_stay_balanced() {
        let mut ascending = BoundedTree::new(1000);
        ascending.extend(0..1000);
        assert_valid(&ascending);

        let mut descending = BoundedTree::new(1000);
        descending.extend((0..1000).rev());
        assert_valid(&descending);

        for i in (0..1000).step_by(3) {
            assert_eq!(ascending.remove(&i), Some(i));
        }
        assert_valid(&ascending);
        assert_eq!(ascending.len(), 666);
    }

    #[test]
    fn test_counters_survive_every_operation() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut tree = BoundedTree::new(64);
        let mut shadow: Vec<i32> = Vec::new();

        for _ in 0..5_000 {
            let key = rng.gen_range(-200..200);
            if rng.gen_bool(0.3) {
                let removed = tree.remove(&key);
                if let Some(pos) = shadow.iter().position(|&k| k == key) {
                    shadow.swap_remove(pos);
                    assert_eq!(removed, Some(key));
                } else {
                    assert_eq!(removed, None);
                }
            } else {
                match tree.bounded_insert(key) {
                    Admission::Inserted => shadow.push(key),
                    Admission::Replaced(evicted) => {
                        let pos = shadow.iter().position(|&k| k == evicted);
                        assert_eq!(shadow.iter().max(), Some(&evicted));
                        if let Some(pos) = pos {
                            shadow.swap_remove(pos);
                        }
                        shadow.push(key);
                    }
                    Admission::Rejected(_) => {
                        assert!(shadow.iter().all(|&k| k <= key));
                    }
                }
            }

            let probe = rng.gen_range(-250..250);
            assert_eq!(tree.rank(&probe), shadow.iter().filter(|&&k| k < probe).count());
        }

        assert_valid(&tree);
        shadow.sort_unstable();
        assert_eq!(tree.to_vec(), shadow);
    }

    proptest! {
        #[test]
        fn bounded_selection_matches_sorting(
            stream in prop_vec(-1_000i32..1_000, 0..400),
            k in 0usize..64,
        ) {
            let mut tree = BoundedTree::new(k);
            for &key in &stream {
                let _ = tree.bounded_insert(key);
                prop_assert!(tree.len() <= k);
            }

            prop_assert_eq!(tree.len(), k.min(stream.len()));
            prop_assert_eq!(tree.to_vec(), k_smallest_by_sorting(&stream, k));
            assert_valid(&tree);
        }

        #[test]
        fn rank_matches_linear_scan(
            keys in prop_vec(-100i32..100, 0..200),
            probes in prop_vec(-120i32..120, 1..20),
        ) {
            let mut tree = BoundedTree::new(keys.len());
            tree.extend(keys.iter().copied());

            for probe in probes {
                let expected = keys.iter().filter(|&&k| k < probe).count();
                prop_assert_eq!(tree.rank(&probe), expected);

                let below: Vec<_> = tree.range_below(&probe, usize::MAX).copied().collect();
                let mut expected_below: Vec<_> = keys.iter().copied().filter(|&k| k < probe).collect();
                expected_below.sort_unstable();
                prop_assert_eq!(below, expected_below);
            }
        }

        #[test]
        fn removals_keep_invariants(
            keys in prop_vec(0i32..50, 1..150),
            removals in prop_vec(0i32..50, 0..150),
        ) {
            let mut tree = BoundedTree::new(keys.len());
            tree.extend(keys.iter().copied());
            let mut expected = keys.clone();

            for key in removals {
                let removed = tree.remove(&key);
                match expected.iter().position(|&k| k == key) {
                    Some(pos) => {
                        expected.remove(pos);
                        prop_assert_eq!(removed, Some(key));
                    }
                    None => prop_assert_eq!(removed, None),
                }
                assert_valid(&tree);
            }

            expected.sort_unstable();
            let traversed = tree.to_vec();
            prop_assert_eq!(traversed.len(), tree.len());
            prop_assert_eq!(traversed, expected);
        }
    }
}

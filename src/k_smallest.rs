use alloc::vec::Vec;

use num_traits::Float;
use ordered_float::{FloatCore, OrderedFloat, PrimitiveFloat};

use crate::{Admission, BoundedTree, Kbn};

/// Collects the `k` smallest keys of a stream in ascending order.
///
/// # Arguments
///
/// * `stream` - The keys to select from, consumed once
/// * `k` - How many of the smallest keys to keep
///
/// # Returns
///
/// * `Vec<T>` - At most `k` keys, ascending
///
/// # Examples
///
/// ```
/// use kmin_tree::k_smallest;
///
/// let smallest = k_smallest([5, 798, 142, 183, 800, 293, 640, 172, 21, 1], 4);
/// assert_eq!(smallest, [1, 5, 21, 142]);
/// ```
pub fn k_smallest<T, I>(stream: I, k: usize) -> Vec<T>
where
    T: Ord,
    I: IntoIterator<Item = T>,
{
    let mut tree = BoundedTree::new(k);
    tree.extend(stream);
    tree.into_sorted_vec()
}

/// # Smallest Values of a Floating Point Stream
///
/// Tracks the `k` smallest values pushed so far, for streams of raw floats
/// that do not implement `Ord` themselves.
///
/// Values are ordered through `OrderedFloat`. `NaN` never compares below a
/// retained value, so it is rejected outright rather than occupying a slot
/// while the tree fills up. A compensated running sum of the retained values
/// is kept alongside the tree, updated on every admission and eviction.
#[derive(Debug, Clone)]
pub struct KSmallest<T> {
    /// Bounded tree over the retained values
    tree: BoundedTree<OrderedFloat<T>>,
    /// Sum of the retained values
    sum: Kbn<T>,
}

impl<T> KSmallest<T>
where
    T: Float + FloatCore + PrimitiveFloat,
{
    /// Creates a new `KSmallest` retaining at most `k` values
    ///
    /// # Arguments
    ///
    /// * `k` - The number of smallest values to retain
    ///
    /// # Returns
    ///
    /// * `Self` - An empty tracker
    pub fn new(k: usize) -> Self {
        Self {
            tree: BoundedTree::new(k),
            sum: Default::default(),
        }
    }

    /// Offers a new value to the tracker
    ///
    /// # Arguments
    ///
    /// * `value` - The value to offer
    ///
    /// # Returns
    ///
    /// * `Admission<T>` - Whether the value was kept and what it displaced
    pub fn push(&mut self, value: T) -> Admission<T> {
        if Float::is_nan(value) {
            return Admission::Rejected(value);
        }

        let admission = self
            .tree
            .bounded_insert(OrderedFloat(value))
            .map(OrderedFloat::into_inner);

        match admission {
            Admission::Inserted => self.sum += value,
            Admission::Replaced(evicted) => {
                self.sum -= evicted;
                self.sum += value;
            }
            Admission::Rejected(_) => {}
        }
        admission
    }

    /// Returns `k`, the number of values retained once full
    #[inline]
    pub fn k(&self) -> usize {
        self.tree.capacity()
    }

    /// Returns the number of values currently retained
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if no value is retained
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns `true` once `k` values are retained
    #[inline]
    pub fn is_full(&self) -> bool {
        self.tree.is_full()
    }

    /// Returns the smallest retained value
    pub fn min(&self) -> Option<T> {
        self.tree.min().map(|value| value.into_inner())
    }

    /// Returns the largest retained value, the admission threshold once full
    pub fn max(&self) -> Option<T> {
        self.tree.max().map(|value| value.into_inner())
    }

    /// Returns the number of retained values strictly below `value`
    pub fn rank(&self, value: T) -> usize {
        self.tree.rank(&OrderedFloat(value))
    }

    /// Returns the retained values in ascending order
    pub fn values(&self) -> impl Iterator<Item = T> + '_ {
        self.tree.iter().map(|value| value.into_inner())
    }

    /// Returns the compensated sum of the retained values
    ///
    /// # Returns
    ///
    /// * `Option<T>` - The sum, or `None` if nothing is retained
    pub fn sum(&self) -> Option<T> {
        (!self.tree.is_empty()).then(|| self.sum.total())
    }

    /// Returns the mean of the retained values
    ///
    /// # Returns
    ///
    /// * `Option<T>` - The mean, or `None` if nothing is retained
    pub fn mean(&self) -> Option<T> {
        self.sum()
            .zip(num_traits::cast::<usize, T>(self.len()))
            .map(|(sum, n)| sum / n)
    }

    /// Resets the tracker, keeping `k`
    ///
    /// # Returns
    ///
    /// * `&mut Self` - The tracker
    pub fn reset(&mut self) -> &mut Self {
        self.tree.clear();
        self.sum = Default::default();
        self
    }
}

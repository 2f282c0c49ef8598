use thiserror::Error;

/// Errors reported by [`BoundedTree`](crate::BoundedTree).
///
/// The tree is a pure in-memory structure, so the taxonomy is narrow: removing
/// a missing key is not an error, and invariant violations are bugs caught by
/// debug assertions rather than reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The requested capacity is negative or does not fit in `usize`
    #[error("capacity must be a non-negative integer that fits in usize")]
    InvalidCapacity,

    /// A plain insertion was attempted on a tree already holding `capacity` keys
    #[error("tree is at its capacity of {capacity} keys")]
    CapacityExhausted {
        /// The capacity the tree was created with
        capacity: usize,
    },
}

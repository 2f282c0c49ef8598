#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), no_std)]
#![deny(
    unsafe_code,
    unused_imports,
    unused_variables,
    unused_must_use,
    missing_docs,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented
)]
#![allow(clippy::len_without_is_empty)]

extern crate alloc;

pub(crate) type Kbn<T> = compensated_summation::KahanBabuskaNeumaier<T>;

mod utils;

mod error;
pub use error::TreeError;

mod iter;
pub use iter::Iter;

mod bounded_tree;
pub use bounded_tree::{Admission, BoundedTree};

mod k_smallest;
pub use k_smallest::{KSmallest, k_smallest};

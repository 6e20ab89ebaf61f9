//! Exact inversion of dense real matrices by recursive blockwise partitioning.
//!
//! A square matrix is split into quadrants `[[A, B], [C, D]]` and inverted
//! through the Schur complement of one diagonal block, recursing until blocks
//! reach order 4 or less, where closed-form cofactor inverses take over. Three
//! realizations share that recursion:
//!
//! - [`InversionVariant::Auxiliary`]: sequential, every intermediate in a fresh
//!   buffer.
//! - [`InversionVariant::InPlace`]: sequential, one working copy overwritten in
//!   a fixed order.
//! - [`InversionVariant::ParallelBottomUp`]: a level-synchronized merge over a
//!   fixed leaf partition, run by a worker team.
//!
//! An exactly zero determinant anywhere in the recursion fails the whole call
//! with [`InversionError::Singular`]. Nothing is retried internally.
//!
//! ```
//! use blockinv::{InversionOptions, invert, invert_with};
//! use ndarray::array;
//!
//! let a = array![[4.0, 7.0], [2.0, 6.0]];
//! let inv = invert(2, &a).unwrap();
//! assert!((inv[[0, 0]] - 0.6).abs() < 1e-12);
//!
//! let par = invert_with(2, &a, &InversionOptions::parallel(2)).unwrap();
//! assert!((par[[1, 0]] + 0.2).abs() < 1e-12);
//! ```

pub mod invert;
pub mod leaf;
pub mod linalg;
pub mod parallel;
pub mod partition;
pub mod schur;
pub mod sequential;
pub mod types;

pub use invert::{InversionError, invert, invert_into, invert_with};
pub use parallel::ParallelBottomUpInverter;
pub use partition::{BlockDescriptor, LeafPartition, Quadrants, split_quadrants};
pub use schur::BlockOps;
pub use sequential::{SequentialInverter, StorageMode};
pub use types::{InversionOptions, InversionVariant, PivotSide, PivotStrategy};

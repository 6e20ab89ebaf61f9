//! Public entry points and the crate-wide error type.

use crate::parallel::ParallelBottomUpInverter;
use crate::sequential::SequentialInverter;
use crate::types::{InversionOptions, InversionVariant};
use ndarray::{Array2, ArrayBase, ArrayViewMut2, Data, Ix2};
use thiserror::Error;

/// A comprehensive error type for every inversion path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InversionError {
    #[error("Matrix order must be positive and supported by the requested kernel, but was {0}.")]
    InvalidOrder(usize),

    #[error("Expected a {order}x{order} buffer, but got {rows}x{cols}.")]
    ShapeMismatch {
        order: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Block of order {order} is singular: its determinant is exactly zero.")]
    Singular { order: usize },

    #[error("Dimension mismatch in {op}: {left:?} is incompatible with {right:?}.")]
    DimensionMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("Failed to build the worker pool: {0}")]
    WorkerPool(String),
}

impl InversionError {
    /// True when the call failed because some block had a zero determinant.
    ///
    /// Callers may retry such failures with a different pivot strategy.
    pub fn is_singular(&self) -> bool {
        matches!(self, Self::Singular { .. })
    }
}

fn check_shape(order: usize, dim: (usize, usize)) -> Result<(), InversionError> {
    if dim != (order, order) {
        return Err(InversionError::ShapeMismatch {
            order,
            rows: dim.0,
            cols: dim.1,
        });
    }
    Ok(())
}

/// Invert `input` with the default options: sequential, in place, pivot A.
pub fn invert<S>(order: usize, input: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, InversionError>
where
    S: Data<Elem = f64>,
{
    let opts = InversionOptions::in_place();
    invert_with(order, input, &opts)
}

/// Invert `input` with explicit options, returning a freshly allocated inverse.
pub fn invert_with<S>(
    order: usize,
    input: &ArrayBase<S, Ix2>,
    opts: &InversionOptions,
) -> Result<Array2<f64>, InversionError>
where
    S: Data<Elem = f64>,
{
    if order == 0 {
        return Err(InversionError::InvalidOrder(0));
    }
    let mut output = Array2::<f64>::zeros((order, order));
    invert_into(order, input, output.view_mut(), opts)?;
    Ok(output)
}

/// Invert `input` into a caller-supplied `order x order` buffer.
///
/// The input is never modified. On failure the contents of `output` are
/// unspecified.
pub fn invert_into<S>(
    order: usize,
    input: &ArrayBase<S, Ix2>,
    output: ArrayViewMut2<'_, f64>,
    opts: &InversionOptions,
) -> Result<(), InversionError>
where
    S: Data<Elem = f64>,
{
    if order == 0 {
        return Err(InversionError::InvalidOrder(0));
    }
    check_shape(order, input.dim())?;
    check_shape(order, output.dim())?;

    log::debug!(
        "Inverting order {order} with {:?} (pivot {:?}, {} workers)",
        opts.variant,
        opts.pivot,
        opts.effective_workers()
    );

    match opts.variant {
        InversionVariant::Auxiliary => {
            SequentialInverter::auxiliary(opts.pivot).invert_into(input.view(), output)
        }
        InversionVariant::InPlace => {
            SequentialInverter::in_place(opts.pivot).invert_into(input.view(), output)
        }
        InversionVariant::ParallelBottomUp => {
            ParallelBottomUpInverter::new(opts.effective_workers()).invert_into(input.view(), output)
        }
    }
}

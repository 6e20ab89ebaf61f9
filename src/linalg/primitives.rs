//! Elementary dense-matrix operations consumed by the blockwise inversion core.
//!
//! Every binary operation validates operand shapes and reports a
//! [`InversionError::DimensionMismatch`] instead of panicking.

use crate::invert::InversionError;
use crate::linalg::faer_ndarray::{faer_gemm_into, gemm_worth_faer};
use ndarray::linalg::general_mat_mul;
use ndarray::{Array2, ArrayBase, ArrayViewMut2, Data, DataMut, Ix2, Zip};

#[inline]
fn mismatch<S1, S2>(
    op: &'static str,
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
) -> InversionError
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    InversionError::DimensionMismatch {
        op,
        left: a.dim(),
        right: b.dim(),
    }
}

/// `out = alpha * a * b`, or `out += alpha * a * b` when `accumulate` is set.
pub(crate) fn gemm_into<S1, S2>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
    out: &mut ArrayViewMut2<'_, f64>,
    alpha: f64,
    accumulate: bool,
) -> Result<(), InversionError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    if a.ncols() != b.nrows() {
        return Err(mismatch("multiply", a, b));
    }
    if out.dim() != (a.nrows(), b.ncols()) {
        return Err(InversionError::DimensionMismatch {
            op: "multiply output",
            left: (a.nrows(), b.ncols()),
            right: out.dim(),
        });
    }
    if gemm_worth_faer(a.nrows(), b.ncols(), a.ncols())
        && faer_gemm_into(a, b, out, alpha, accumulate)
    {
        return Ok(());
    }
    let beta = if accumulate { 1.0 } else { 0.0 };
    general_mat_mul(alpha, a, b, beta, out);
    Ok(())
}

/// `a[m×n] · b[n×p]`; fails on inner-dimension mismatch.
pub fn multiply<S1, S2>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
) -> Result<Array2<f64>, InversionError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let mut out = Array2::<f64>::zeros((a.nrows(), b.ncols()));
    gemm_into(a, b, &mut out.view_mut(), 1.0, false)?;
    Ok(out)
}

/// Write `a · b` into a caller-owned buffer of shape `(a.nrows(), b.ncols())`.
pub fn multiply_into<S1, S2>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
    out: &mut ArrayViewMut2<'_, f64>,
) -> Result<(), InversionError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    gemm_into(a, b, out, 1.0, false)
}

/// `a · b · c`, chained through one temporary.
pub fn multiply3<S1, S2, S3>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
    c: &ArrayBase<S3, Ix2>,
) -> Result<Array2<f64>, InversionError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    S3: Data<Elem = f64>,
{
    let temp = multiply(a, b)?;
    multiply(&temp, c)
}

pub fn add<S1, S2>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
) -> Result<Array2<f64>, InversionError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    if a.dim() != b.dim() {
        return Err(mismatch("add", a, b));
    }
    Ok(a + b)
}

pub fn subtract<S1, S2>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
) -> Result<Array2<f64>, InversionError>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    if a.dim() != b.dim() {
        return Err(mismatch("subtract", a, b));
    }
    Ok(a - b)
}

/// `dst += src` elementwise.
pub fn add_assign<S1, S2>(
    dst: &mut ArrayBase<S1, Ix2>,
    src: &ArrayBase<S2, Ix2>,
) -> Result<(), InversionError>
where
    S1: DataMut<Elem = f64>,
    S2: Data<Elem = f64>,
{
    if dst.dim() != src.dim() {
        return Err(InversionError::DimensionMismatch {
            op: "add_assign",
            left: dst.dim(),
            right: src.dim(),
        });
    }
    Zip::from(dst).and(src).for_each(|d, &s| *d += s);
    Ok(())
}

/// Multiply every entry by `x`, in place.
pub fn scale<S>(a: &mut ArrayBase<S, Ix2>, x: f64)
where
    S: DataMut<Elem = f64>,
{
    a.mapv_inplace(|v| v * x);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn multiply_matches_hand_computed_product() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let b = array![[1.0, 0.0], [0.0, 1.0], [2.0, -1.0]];
        let c = multiply(&a, &b).expect("shapes agree");
        assert_eq!(c, array![[7.0, -1.0], [16.0, -1.0]]);
    }

    #[test]
    fn multiply_rejects_inner_dimension_mismatch() {
        let a = Array2::<f64>::zeros((2, 3));
        let b = Array2::<f64>::zeros((2, 3));
        let err = multiply(&a, &b).unwrap_err();
        assert_eq!(
            err,
            InversionError::DimensionMismatch {
                op: "multiply",
                left: (2, 3),
                right: (2, 3),
            }
        );
    }

    #[test]
    fn multiply3_chains_left_to_right() {
        let a = array![[2.0, 0.0], [0.0, 3.0]];
        let b = array![[1.0, 1.0], [0.0, 1.0]];
        let c = array![[1.0], [2.0]];
        let got = multiply3(&a, &b, &c).expect("shapes agree");
        assert_eq!(got, array![[6.0], [6.0]]);
    }

    #[test]
    fn subtract_and_add_check_shapes() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[0.5, 0.5], [0.5, 0.5]];
        assert_eq!(subtract(&a, &b).unwrap(), array![[0.5, 1.5], [2.5, 3.5]]);
        assert_eq!(add(&a, &b).unwrap(), array![[1.5, 2.5], [3.5, 4.5]]);
        let wide = Array2::<f64>::zeros((2, 3));
        assert!(subtract(&a, &wide).is_err());
        assert!(add(&wide, &a).is_err());
    }

    #[test]
    fn scale_negates_in_place() {
        let mut a = array![[1.0, -2.0], [0.0, 4.0]];
        scale(&mut a, -1.0);
        assert_eq!(a, array![[-1.0, 2.0], [-0.0, -4.0]]);
    }

    #[test]
    fn accumulating_gemm_adds_onto_destination() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[1.0, 0.0], [0.0, 1.0]];
        let mut out = Array2::<f64>::ones((2, 2));
        gemm_into(&a, &b, &mut out.view_mut(), -1.0, true).unwrap();
        assert_eq!(out, array![[0.0, -1.0], [-2.0, -3.0]]);
    }

    #[test]
    fn gemm_rejects_wrong_output_shape() {
        let a = Array2::<f64>::eye(2);
        let mut out = Array2::<f64>::zeros((3, 2));
        assert!(gemm_into(&a, &a, &mut out.view_mut(), 1.0, false).is_err());
    }
}

//! Bridge from ndarray storage to faer's GEMM for products large enough to pay
//! for it.

use faer::linalg::matmul::matmul;
use faer::{Accum, MatMut, MatRef, Par, get_global_parallelism};
use ndarray::{Array2, ArrayBase, ArrayViewMut2, Data, Ix2};

/// Whether an `m x k` by `k x n` product should go through faer.
#[inline]
pub(crate) fn gemm_worth_faer(m: usize, n: usize, k: usize) -> bool {
    const EDGE: usize = 32;
    const WORK: usize = 1 << 18;
    m.max(n).max(k) >= EDGE && m.saturating_mul(n).saturating_mul(k) >= WORK
}

#[inline]
fn gemm_par(m: usize, n: usize, k: usize) -> Par {
    if m.min(n).min(k) >= 128 {
        get_global_parallelism()
    } else {
        Par::Seq
    }
}

/// Mutable faer alias of `view`, or `None` when a stride is zero or negative.
#[inline]
pub(crate) fn dest_mat<'a>(view: &'a mut ArrayViewMut2<'_, f64>) -> Option<MatMut<'a, f64>> {
    let (rows, cols) = view.dim();
    let &[rs, cs] = view.strides() else {
        return None;
    };
    if rows > 0 && cols > 0 && (rs <= 0 || cs <= 0) {
        return None;
    }
    // SAFETY: `view` stays mutably borrowed for 'a and describes exactly this
    // pointer, shape and stride triple.
    Some(unsafe { MatMut::from_raw_parts_mut(view.as_mut_ptr(), rows, cols, rs, cs) })
}

/// GEMM input: an alias of the caller's storage, or a compact copy when its
/// strides run backwards.
pub(crate) enum GemmOperand<'a> {
    Borrowed(MatRef<'a, f64>),
    Copied(Array2<f64>),
}

impl<'a> GemmOperand<'a> {
    pub(crate) fn of<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        match *array.strides() {
            [rs, cs] if rs > 0 && cs > 0 => {
                // SAFETY: `array` is shared-borrowed for 'a and its positive
                // strides address only elements it owns or views.
                Self::Borrowed(unsafe {
                    MatRef::from_raw_parts(array.as_ptr(), rows, cols, rs, cs)
                })
            }
            _ => Self::Copied(array.as_standard_layout().into_owned()),
        }
    }

    pub(crate) fn mat(&self) -> MatRef<'_, f64> {
        match self {
            Self::Borrowed(mat) => *mat,
            Self::Copied(copy) => {
                let (rows, cols) = copy.dim();
                // SAFETY: `copy` is in standard layout and lives as long as `self`.
                unsafe { MatRef::from_raw_parts(copy.as_ptr(), rows, cols, cols as isize, 1) }
            }
        }
    }
}

/// `out = alpha * a * b`, or `out += alpha * a * b` when `accumulate`, through faer.
///
/// Returns `false` with `out` untouched when its layout cannot be aliased.
pub(crate) fn faer_gemm_into<S1, S2>(
    a: &ArrayBase<S1, Ix2>,
    b: &ArrayBase<S2, Ix2>,
    out: &mut ArrayViewMut2<'_, f64>,
    alpha: f64,
    accumulate: bool,
) -> bool
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let (m, k) = a.dim();
    let n = b.ncols();
    let Some(dst) = dest_mat(out) else {
        return false;
    };
    let (lhs, rhs) = (GemmOperand::of(a), GemmOperand::of(b));
    let accum = if accumulate { Accum::Add } else { Accum::Replace };
    matmul(dst, accum, lhs.mat(), rhs.mat(), alpha, gemm_par(m, n, k));
    true
}

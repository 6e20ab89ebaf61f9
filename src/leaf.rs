//! Closed-form inverses for the leaf orders 1 through 4.
//!
//! Each kernel evaluates the determinant as an explicit sum of products and
//! returns the adjugate scaled by its reciprocal. An exactly zero determinant is
//! the only singularity signal.

use crate::invert::InversionError;
use ndarray::{ArrayView2, ArrayViewMut2};

/// Largest order handled without splitting.
pub const MAX_LEAF_ORDER: usize = 4;

#[inline]
fn singular(order: usize) -> InversionError {
    log::warn!("Unable to invert leaf block of order {order}: determinant is exactly zero");
    InversionError::Singular { order }
}

#[inline]
fn check_leaf_shape(rows: usize, cols: usize) -> Result<usize, InversionError> {
    if rows != cols {
        return Err(InversionError::ShapeMismatch {
            order: rows,
            rows,
            cols,
        });
    }
    if rows == 0 || rows > MAX_LEAF_ORDER {
        return Err(InversionError::InvalidOrder(rows));
    }
    Ok(rows)
}

/// Determinant of a leaf block, or `None` when the order is outside 1..=4.
pub fn determinant(block: ArrayView2<'_, f64>) -> Option<f64> {
    let (rows, cols) = block.dim();
    if rows != cols || rows == 0 || rows > MAX_LEAF_ORDER {
        return None;
    }
    let mut buf = [0.0; 16];
    load(block, &mut buf);
    match rows {
        1 => Some(buf[0]),
        2 => Some(det2(&buf)),
        3 => Some(det3(&buf)),
        4 => Some(Minors4::new(&buf).det),
        _ => None,
    }
}

/// Invert `input` into `output`; both must be the same leaf order.
pub fn invert_leaf(
    input: ArrayView2<'_, f64>,
    mut output: ArrayViewMut2<'_, f64>,
) -> Result<(), InversionError> {
    let order = check_leaf_shape(input.nrows(), input.ncols())?;
    if output.dim() != (order, order) {
        return Err(InversionError::ShapeMismatch {
            order,
            rows: output.nrows(),
            cols: output.ncols(),
        });
    }
    let mut buf = [0.0; 16];
    load(input, &mut buf);
    let inv = invert_buffer(order, &buf)?;
    store(&inv, &mut output);
    Ok(())
}

/// Invert a leaf block where it lies. The block is read completely before any
/// entry is written.
pub fn invert_leaf_in_place(mut block: ArrayViewMut2<'_, f64>) -> Result<(), InversionError> {
    let order = check_leaf_shape(block.nrows(), block.ncols())?;
    let mut buf = [0.0; 16];
    load(block.view(), &mut buf);
    let inv = invert_buffer(order, &buf)?;
    store(&inv, &mut block);
    Ok(())
}

/// Row-major leaf kernel over a packed buffer of `order * order` entries.
pub(crate) fn invert_buffer(order: usize, a: &[f64; 16]) -> Result<[f64; 16], InversionError> {
    match order {
        1 => invert1(a),
        2 => invert2(a),
        3 => invert3(a),
        4 => invert4(a),
        _ => Err(InversionError::InvalidOrder(order)),
    }
}

fn load(block: ArrayView2<'_, f64>, buf: &mut [f64; 16]) {
    let n = block.ncols();
    for ((i, j), &v) in block.indexed_iter() {
        buf[i * n + j] = v;
    }
}

fn store(buf: &[f64; 16], block: &mut ArrayViewMut2<'_, f64>) {
    let n = block.ncols();
    for ((i, j), v) in block.indexed_iter_mut() {
        *v = buf[i * n + j];
    }
}

fn invert1(a: &[f64; 16]) -> Result<[f64; 16], InversionError> {
    let det = a[0];
    if det == 0.0 {
        return Err(singular(1));
    }
    let mut out = [0.0; 16];
    out[0] = 1.0 / det;
    Ok(out)
}

#[inline]
fn det2(a: &[f64; 16]) -> f64 {
    a[0] * a[3] - a[1] * a[2]
}

fn invert2(a: &[f64; 16]) -> Result<[f64; 16], InversionError> {
    let det = det2(a);
    if det == 0.0 {
        return Err(singular(2));
    }
    let mut out = [0.0; 16];
    out[0] = a[3] / det;
    out[1] = -(a[1] / det);
    out[2] = -(a[2] / det);
    out[3] = a[0] / det;
    Ok(out)
}

#[inline]
fn det3(a: &[f64; 16]) -> f64 {
    let (a11, a12, a13) = (a[0], a[1], a[2]);
    let (a21, a22, a23) = (a[3], a[4], a[5]);
    let (a31, a32, a33) = (a[6], a[7], a[8]);
    -(a13 * a22 * a31) + a12 * a23 * a31 + a13 * a21 * a32 - a11 * a23 * a32 - a12 * a21 * a33
        + a11 * a22 * a33
}

fn invert3(a: &[f64; 16]) -> Result<[f64; 16], InversionError> {
    let det = det3(a);
    if det == 0.0 {
        return Err(singular(3));
    }
    let (a11, a12, a13) = (a[0], a[1], a[2]);
    let (a21, a22, a23) = (a[3], a[4], a[5]);
    let (a31, a32, a33) = (a[6], a[7], a[8]);
    let mut out = [0.0; 16];
    out[0] = (-(a23 * a32) + a22 * a33) / det;
    out[1] = (a13 * a32 - a12 * a33) / det;
    out[2] = (-(a13 * a22) + a12 * a23) / det;
    out[3] = (a23 * a31 - a21 * a33) / det;
    out[4] = (-(a13 * a31) + a11 * a33) / det;
    out[5] = (a13 * a21 - a11 * a23) / det;
    out[6] = (-(a22 * a31) + a21 * a32) / det;
    out[7] = (a12 * a31 - a11 * a32) / det;
    out[8] = (-(a12 * a21) + a11 * a22) / det;
    Ok(out)
}

/// 2x2 minors of the top two rows (`s`) and the bottom two rows (`c`) of a 4x4
/// matrix; the determinant is their Laplace pairing.
struct Minors4 {
    s: [f64; 6],
    c: [f64; 6],
    det: f64,
}

impl Minors4 {
    fn new(a: &[f64; 16]) -> Self {
        let s = [
            a[0] * a[5] - a[4] * a[1],
            a[0] * a[6] - a[4] * a[2],
            a[0] * a[7] - a[4] * a[3],
            a[1] * a[6] - a[5] * a[2],
            a[1] * a[7] - a[5] * a[3],
            a[2] * a[7] - a[6] * a[3],
        ];
        let c = [
            a[8] * a[13] - a[12] * a[9],
            a[8] * a[14] - a[12] * a[10],
            a[8] * a[15] - a[12] * a[11],
            a[9] * a[14] - a[13] * a[10],
            a[9] * a[15] - a[13] * a[11],
            a[10] * a[15] - a[14] * a[11],
        ];
        let det = s[0] * c[5] - s[1] * c[4] + s[2] * c[3] + s[3] * c[2] - s[4] * c[1]
            + s[5] * c[0];
        Self { s, c, det }
    }
}

fn invert4(a: &[f64; 16]) -> Result<[f64; 16], InversionError> {
    let Minors4 { s, c, det } = Minors4::new(a);
    if det == 0.0 {
        return Err(singular(4));
    }
    let m = |i: usize, j: usize| a[i * 4 + j];
    let adj = [
        m(1, 1) * c[5] - m(1, 2) * c[4] + m(1, 3) * c[3],
        -m(0, 1) * c[5] + m(0, 2) * c[4] - m(0, 3) * c[3],
        m(3, 1) * s[5] - m(3, 2) * s[4] + m(3, 3) * s[3],
        -m(2, 1) * s[5] + m(2, 2) * s[4] - m(2, 3) * s[3],
        -m(1, 0) * c[5] + m(1, 2) * c[2] - m(1, 3) * c[1],
        m(0, 0) * c[5] - m(0, 2) * c[2] + m(0, 3) * c[1],
        -m(3, 0) * s[5] + m(3, 2) * s[2] - m(3, 3) * s[1],
        m(2, 0) * s[5] - m(2, 2) * s[2] + m(2, 3) * s[1],
        m(1, 0) * c[4] - m(1, 1) * c[2] + m(1, 3) * c[0],
        -m(0, 0) * c[4] + m(0, 1) * c[2] - m(0, 3) * c[0],
        m(3, 0) * s[4] - m(3, 1) * s[2] + m(3, 3) * s[0],
        -m(2, 0) * s[4] + m(2, 1) * s[2] - m(2, 3) * s[0],
        -m(1, 0) * c[3] + m(1, 1) * c[1] - m(1, 2) * c[0],
        m(0, 0) * c[3] - m(0, 1) * c[1] + m(0, 2) * c[0],
        -m(3, 0) * s[3] + m(3, 1) * s[1] - m(3, 2) * s[0],
        m(2, 0) * s[3] - m(2, 1) * s[1] + m(2, 2) * s[0],
    ];
    let mut out = [0.0; 16];
    for (dst, cof) in out.iter_mut().zip(adj.iter()) {
        *dst = cof / det;
    }
    Ok(out)
}

#![allow(dead_code)]

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded random matrix whose diagonal dominates each row, so every principal
/// block and every Schur complement along the recursion is invertible.
pub fn dominant_matrix(order: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut m = Array2::<f64>::from_shape_fn((order, order), |_| rng.random_range(-1.0..1.0));
    for i in 0..order {
        let off_diag: f64 = m.row(i).iter().map(|v| v.abs()).sum();
        let sign = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        m[[i, i]] = sign * (off_diag + 1.0);
    }
    m
}

/// Independent reference inverse by Gauss-Jordan elimination with partial
/// pivoting. `None` when a pivot column is exactly zero.
pub fn gauss_jordan_inverse(a: ArrayView2<'_, f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut work = a.to_owned();
    let mut inv = Array2::<f64>::eye(n);
    for col in 0..n {
        let pivot_row = (col..n).max_by(|&x, &y| {
            work[[x, col]]
                .abs()
                .partial_cmp(&work[[y, col]].abs())
                .unwrap()
        })?;
        if work[[pivot_row, col]] == 0.0 {
            return None;
        }
        for j in 0..n {
            work.swap([col, j], [pivot_row, j]);
            inv.swap([col, j], [pivot_row, j]);
        }
        let pivot = work[[col, col]];
        for j in 0..n {
            work[[col, j]] /= pivot;
            inv[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = work[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                work[[row, j]] -= factor * work[[col, j]];
                inv[[row, j]] -= factor * inv[[col, j]];
            }
        }
    }
    Some(inv)
}

/// Largest entry of `|a * b - I|`.
pub fn identity_residual(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.dot(b)
        .indexed_iter()
        .map(|((i, j), &v)| (v - if i == j { 1.0 } else { 0.0 }).abs())
        .fold(0.0, f64::max)
}

pub fn max_abs_diff(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> f64 {
    assert_eq!(a.dim(), b.dim());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

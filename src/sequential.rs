//! Top-down recursive inversion over two storage policies.
//!
//! [`InPlaceBlocks`] overwrites quadrants of a single working copy, staging each
//! product through a small reusable panel of row or column lines.
//! [`AuxiliaryBlocks`] gives every recursive inversion its own private copy of
//! the block and materializes every product in a fresh buffer.

use crate::invert::InversionError;
use crate::leaf::{invert_leaf, invert_leaf_in_place};
use crate::linalg::primitives::{add, gemm_into, multiply, multiply3, scale, subtract};
use crate::partition::BlockDescriptor;
use crate::schur::{BlockOps, invert_block};
use crate::types::PivotStrategy;
use ndarray::{Array2, ArrayView2, ArrayViewMut2, s};

/// Lines staged per panel when an in-place product overwrites one of its operands.
const PANEL_LINES: usize = 64;

fn scratch_view(
    buf: &mut Vec<f64>,
    rows: usize,
    cols: usize,
) -> Result<ArrayViewMut2<'_, f64>, InversionError> {
    let len = rows * cols;
    if buf.len() < len {
        buf.resize(len, 0.0);
    }
    ArrayViewMut2::from_shape((rows, cols), &mut buf[..len]).map_err(|_| {
        InversionError::DimensionMismatch {
            op: "scratch panel",
            left: (rows, cols),
            right: (len, 1),
        }
    })
}

/// Storage over one working buffer that is overwritten as the recursion proceeds.
pub struct InPlaceBlocks<'a> {
    work: ArrayViewMut2<'a, f64>,
    strategy: PivotStrategy,
    scratch: Vec<f64>,
}

impl<'a> InPlaceBlocks<'a> {
    pub fn new(work: ArrayViewMut2<'a, f64>, strategy: PivotStrategy) -> Self {
        Self {
            work,
            strategy,
            scratch: Vec::new(),
        }
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.work.view()
    }
}

impl BlockOps for InPlaceBlocks<'_> {
    fn strategy(&self) -> PivotStrategy {
        self.strategy
    }

    fn invert_leaf(&mut self, block: BlockDescriptor) -> Result<(), InversionError> {
        invert_leaf_in_place(self.work.slice_mut(block.slice_info()))
    }

    fn negate_left_product(
        &mut self,
        pivot: BlockDescriptor,
        target: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let Self { work, scratch, .. } = self;
        let (p, mut t) = work.multi_slice_mut((pivot.slice_info(), target.slice_info()));
        for start in (0..target.cols).step_by(PANEL_LINES) {
            let width = PANEL_LINES.min(target.cols - start);
            let mut panel = scratch_view(scratch, target.rows, width)?;
            let mut lines = t.slice_mut(s![.., start..start + width]);
            panel.assign(&lines);
            gemm_into(&p, &panel, &mut lines, -1.0, false)?;
        }
        Ok(())
    }

    fn right_product(
        &mut self,
        target: BlockDescriptor,
        pivot: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let Self { work, scratch, .. } = self;
        let (mut t, p) = work.multi_slice_mut((target.slice_info(), pivot.slice_info()));
        for start in (0..target.rows).step_by(PANEL_LINES) {
            let height = PANEL_LINES.min(target.rows - start);
            let mut panel = scratch_view(scratch, height, target.cols)?;
            let mut lines = t.slice_mut(s![start..start + height, ..]);
            panel.assign(&lines);
            gemm_into(&panel, &p, &mut lines, 1.0, false)?;
        }
        Ok(())
    }

    fn accumulate_product(
        &mut self,
        dst: BlockDescriptor,
        left: BlockDescriptor,
        right: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let (mut d, l, r) = self.work.multi_slice_mut((
            dst.slice_info(),
            left.slice_info(),
            right.slice_info(),
        ));
        gemm_into(&l, &r, &mut d, 1.0, true)
    }

    fn snapshot(&self, block: BlockDescriptor) -> Array2<f64> {
        self.work.slice(block.slice_info()).to_owned()
    }

    fn restore_schur(
        &mut self,
        dst: BlockDescriptor,
        saved: &Array2<f64>,
        left: BlockDescriptor,
        right: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let Self { work, scratch, .. } = self;
        let (mut d, l, r) =
            work.multi_slice_mut((dst.slice_info(), left.slice_info(), right.slice_info()));
        let mut coupling = scratch_view(scratch, left.rows, right.cols)?;
        gemm_into(&l, &r, &mut coupling, 1.0, false)?;
        d.assign(saved);
        gemm_into(saved, &coupling, &mut d, -1.0, true)
    }
}

/// Storage where nothing is overwritten until a fresh result replaces it.
pub struct AuxiliaryBlocks {
    work: Array2<f64>,
    strategy: PivotStrategy,
}

impl AuxiliaryBlocks {
    pub fn new(work: Array2<f64>, strategy: PivotStrategy) -> Self {
        Self { work, strategy }
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.work
    }
}

impl BlockOps for AuxiliaryBlocks {
    fn strategy(&self) -> PivotStrategy {
        self.strategy
    }

    fn invert_leaf(&mut self, block: BlockDescriptor) -> Result<(), InversionError> {
        let mut inverse = Array2::<f64>::zeros((block.rows, block.cols));
        invert_leaf(self.work.slice(block.slice_info()), inverse.view_mut())?;
        self.work.slice_mut(block.slice_info()).assign(&inverse);
        Ok(())
    }

    fn negate_left_product(
        &mut self,
        pivot: BlockDescriptor,
        target: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let mut product = multiply(
            &self.work.slice(pivot.slice_info()),
            &self.work.slice(target.slice_info()),
        )?;
        scale(&mut product, -1.0);
        self.work.slice_mut(target.slice_info()).assign(&product);
        Ok(())
    }

    fn right_product(
        &mut self,
        target: BlockDescriptor,
        pivot: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let product = multiply(
            &self.work.slice(target.slice_info()),
            &self.work.slice(pivot.slice_info()),
        )?;
        self.work.slice_mut(target.slice_info()).assign(&product);
        Ok(())
    }

    fn accumulate_product(
        &mut self,
        dst: BlockDescriptor,
        left: BlockDescriptor,
        right: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let product = multiply(
            &self.work.slice(left.slice_info()),
            &self.work.slice(right.slice_info()),
        )?;
        let sum = add(&self.work.slice(dst.slice_info()), &product)?;
        self.work.slice_mut(dst.slice_info()).assign(&sum);
        Ok(())
    }

    fn snapshot(&self, block: BlockDescriptor) -> Array2<f64> {
        self.work.slice(block.slice_info()).to_owned()
    }

    fn restore_schur(
        &mut self,
        dst: BlockDescriptor,
        saved: &Array2<f64>,
        left: BlockDescriptor,
        right: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let product = multiply3(
            saved,
            &self.work.slice(left.slice_info()),
            &self.work.slice(right.slice_info()),
        )?;
        let schur = subtract(saved, &product)?;
        self.work.slice_mut(dst.slice_info()).assign(&schur);
        Ok(())
    }

    fn invert_diagonal(&mut self, block: BlockDescriptor) -> Result<(), InversionError> {
        let private = self.work.slice(block.slice_info()).to_owned();
        let mut sub = AuxiliaryBlocks::new(private, self.strategy);
        invert_block(&mut sub, block.at_origin(), self.strategy)?;
        self.work.slice_mut(block.slice_info()).assign(&sub.work);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageMode {
    Auxiliary,
    InPlace,
}

/// Recursive inverter with a fixed storage mode and pivot strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequentialInverter {
    mode: StorageMode,
    strategy: PivotStrategy,
}

impl SequentialInverter {
    pub fn new(mode: StorageMode, strategy: PivotStrategy) -> Self {
        Self { mode, strategy }
    }

    pub fn auxiliary(strategy: PivotStrategy) -> Self {
        Self::new(StorageMode::Auxiliary, strategy)
    }

    pub fn in_place(strategy: PivotStrategy) -> Self {
        Self::new(StorageMode::InPlace, strategy)
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn strategy(&self) -> PivotStrategy {
        self.strategy
    }

    pub fn invert(&self, input: ArrayView2<'_, f64>) -> Result<Array2<f64>, InversionError> {
        let mut output = Array2::<f64>::zeros(input.dim());
        self.invert_into(input, output.view_mut())?;
        Ok(output)
    }

    /// Write the inverse of `input` into `output`, leaving `input` untouched.
    pub fn invert_into(
        &self,
        input: ArrayView2<'_, f64>,
        mut output: ArrayViewMut2<'_, f64>,
    ) -> Result<(), InversionError> {
        let (rows, cols) = input.dim();
        if rows != cols {
            return Err(InversionError::ShapeMismatch {
                order: rows,
                rows,
                cols,
            });
        }
        if output.dim() != (rows, cols) {
            return Err(InversionError::ShapeMismatch {
                order: rows,
                rows: output.nrows(),
                cols: output.ncols(),
            });
        }
        let whole = BlockDescriptor::square(rows, 0, 0);
        match self.mode {
            StorageMode::Auxiliary => {
                let mut blocks = AuxiliaryBlocks::new(input.to_owned(), self.strategy);
                invert_block(&mut blocks, whole, self.strategy)?;
                output.assign(&blocks.into_inner());
            }
            StorageMode::InPlace => {
                output.assign(&input);
                let mut blocks = InPlaceBlocks::new(output, self.strategy);
                invert_block(&mut blocks, whole, self.strategy)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::split_quadrants;
    use crate::schur::{complete, complete_a_and_d};
    use crate::types::PivotSide;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array, s};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const STRATEGIES: [PivotStrategy; 3] = [PivotStrategy::A, PivotStrategy::D, PivotStrategy::AAndD];

    fn dominant(order: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut m = Array2::<f64>::from_shape_fn((order, order), |_| rng.random_range(-1.0..1.0));
        for i in 0..order {
            let row_sum: f64 = m.row(i).iter().map(|v| v.abs()).sum();
            m[[i, i]] = row_sum + 1.0;
        }
        m
    }

    fn max_identity_error(a: &Array2<f64>, inv: &Array2<f64>) -> f64 {
        let prod = a.dot(inv);
        prod.indexed_iter()
            .map(|((i, j), &v)| (v - if i == j { 1.0 } else { 0.0 }).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn both_modes_invert_with_every_strategy() {
        for order in [1, 3, 5, 6, 9, 17, 33] {
            let a = dominant(order, order as u64);
            for strategy in STRATEGIES {
                for inverter in [
                    SequentialInverter::auxiliary(strategy),
                    SequentialInverter::in_place(strategy),
                ] {
                    let inv = inverter.invert(a.view()).expect("invertible");
                    let err = max_identity_error(&a, &inv);
                    assert!(err < 1e-10, "{inverter:?} order {order}: {err:e}");
                }
            }
        }
    }

    #[test]
    fn input_is_left_untouched() {
        let a = dominant(11, 7);
        let original = a.clone();
        for inverter in [
            SequentialInverter::auxiliary(PivotStrategy::A),
            SequentialInverter::in_place(PivotStrategy::AAndD),
        ] {
            inverter.invert(a.view()).expect("invertible");
            assert_eq!(a, original);
        }
    }

    #[test]
    fn wide_products_cross_panel_boundaries() {
        let a = dominant(150, 3);
        let inv = SequentialInverter::in_place(PivotStrategy::A)
            .invert(a.view())
            .expect("invertible");
        assert!(max_identity_error(&a, &inv) < 1e-9);
    }

    #[test]
    fn single_split_agrees_with_the_leaf_kernel() {
        let leaves = [
            array![[4.0, 7.0], [2.0, 6.0]],
            array![[2.0, -1.0, 0.5], [1.0, 3.0, -2.0], [0.0, 1.5, 4.0]],
            dominant(4, 11),
        ];
        for a in leaves {
            let n = a.nrows();
            let mut expected = Array2::<f64>::zeros((n, n));
            invert_leaf(a.view(), expected.view_mut()).expect("leaf");
            let q = split_quadrants(n, 0, 0);

            for side in [PivotSide::A, PivotSide::D] {
                let mut work = a.clone();
                let mut blocks = InPlaceBlocks::new(work.view_mut(), PivotStrategy::A);
                complete(&mut blocks, side, &q).expect("split");
                for (x, y) in work.iter().zip(expected.iter()) {
                    assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
                }
            }

            let mut aux = AuxiliaryBlocks::new(a.clone(), PivotStrategy::AAndD);
            complete_a_and_d(&mut aux, &q).expect("split");
            for (x, y) in aux.into_inner().iter().zip(expected.iter()) {
                assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn singular_pivot_fails_without_falling_back() {
        // [[0, I], [I, I]] is invertible, but its top-left block is zero.
        let mut a = Array2::<f64>::zeros((6, 6));
        a.slice_mut(s![0..3, 3..6]).assign(&Array2::eye(3));
        a.slice_mut(s![3..6, 0..3]).assign(&Array2::eye(3));
        a.slice_mut(s![3..6, 3..6]).assign(&Array2::eye(3));

        for inverter in [
            SequentialInverter::in_place(PivotStrategy::A),
            SequentialInverter::auxiliary(PivotStrategy::A),
        ] {
            assert_eq!(
                inverter.invert(a.view()).unwrap_err(),
                InversionError::Singular { order: 3 }
            );
        }

        let inv = SequentialInverter::in_place(PivotStrategy::D)
            .invert(a.view())
            .expect("pivot D avoids the zero block");
        assert!(max_identity_error(&a, &inv) < 1e-12);
    }

    #[test]
    fn non_square_input_is_rejected() {
        let a = Array2::<f64>::zeros((3, 4));
        let err = SequentialInverter::in_place(PivotStrategy::A)
            .invert(a.view())
            .unwrap_err();
        assert!(matches!(err, InversionError::ShapeMismatch { .. }));
    }
}

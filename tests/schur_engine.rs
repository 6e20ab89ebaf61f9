mod common;

use blockinv::linalg::primitives::{add_assign, multiply, multiply3, scale, subtract};
use blockinv::schur::invert_block;
use blockinv::sequential::InPlaceBlocks;
use blockinv::{BlockDescriptor, BlockOps, InversionError, PivotStrategy, split_quadrants};
use common::{dominant_matrix, gauss_jordan_inverse, identity_residual, max_abs_diff};
use ndarray::Array2;

/// Block storage that negates either L = A^-1 B (the correct convention) or
/// R = C A^-1 instead.
struct CouplingSigns {
    work: Array2<f64>,
    negate_right: bool,
}

impl CouplingSigns {
    fn store(&mut self, block: BlockDescriptor, value: &Array2<f64>) {
        self.work.slice_mut(block.slice_info()).assign(value);
    }

    fn product(
        &self,
        left: BlockDescriptor,
        right: BlockDescriptor,
    ) -> Result<Array2<f64>, InversionError> {
        multiply(
            &self.work.slice(left.slice_info()),
            &self.work.slice(right.slice_info()),
        )
    }
}

impl BlockOps for CouplingSigns {
    fn strategy(&self) -> PivotStrategy {
        PivotStrategy::A
    }

    fn invert_leaf(&mut self, block: BlockDescriptor) -> Result<(), InversionError> {
        let mut out = Array2::<f64>::zeros((block.rows, block.cols));
        blockinv::leaf::invert_leaf(self.work.slice(block.slice_info()), out.view_mut())?;
        self.store(block, &out);
        Ok(())
    }

    fn negate_left_product(
        &mut self,
        pivot: BlockDescriptor,
        target: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let mut p = self.product(pivot, target)?;
        if !self.negate_right {
            scale(&mut p, -1.0);
        }
        self.store(target, &p);
        Ok(())
    }

    fn right_product(
        &mut self,
        target: BlockDescriptor,
        pivot: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let mut p = self.product(target, pivot)?;
        if self.negate_right {
            scale(&mut p, -1.0);
        }
        self.store(target, &p);
        Ok(())
    }

    fn accumulate_product(
        &mut self,
        dst: BlockDescriptor,
        left: BlockDescriptor,
        right: BlockDescriptor,
    ) -> Result<(), InversionError> {
        let p = self.product(left, right)?;
        add_assign(&mut self.work.slice_mut(dst.slice_info()), &p)
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
        let p = multiply3(
            saved,
            &self.work.slice(left.slice_info()),
            &self.work.slice(right.slice_info()),
        )?;
        let next = subtract(saved, &p)?;
        self.store(dst, &next);
        Ok(())
    }
}

#[test]
fn quadrants_match_the_brute_force_schur_formulas() {
    let order = 10;
    let a = dominant_matrix(order, 88);
    let mut work = a.clone();
    let whole = BlockDescriptor::square(order, 0, 0);
    invert_block(
        &mut InPlaceBlocks::new(work.view_mut(), PivotStrategy::A),
        whole,
        PivotStrategy::A,
    )
    .expect("invertible");

    let q = split_quadrants(order, 0, 0);
    let qa = a.slice(q.a.slice_info()).to_owned();
    let qb = a.slice(q.b.slice_info()).to_owned();
    let qc = a.slice(q.c.slice_info()).to_owned();
    let qd = a.slice(q.d.slice_info()).to_owned();
    let a_inv = gauss_jordan_inverse(qa.view()).expect("A invertible");
    let schur = &qd - &qc.dot(&a_inv).dot(&qb);
    let s_inv = gauss_jordan_inverse(schur.view()).expect("S invertible");

    let top_right = -a_inv.dot(&qb).dot(&s_inv);
    let bottom_left = -s_inv.dot(&qc).dot(&a_inv);
    let top_left = &a_inv + &a_inv.dot(&qb).dot(&s_inv).dot(&qc).dot(&a_inv);

    let tol = 1e-12;
    assert!(max_abs_diff(work.slice(q.b.slice_info()), top_right.view()) < tol);
    assert!(max_abs_diff(work.slice(q.c.slice_info()), bottom_left.view()) < tol);
    assert!(max_abs_diff(work.slice(q.a.slice_info()), top_left.view()) < tol);
    assert!(max_abs_diff(work.slice(q.d.slice_info()), s_inv.view()) < tol);
}

#[test]
fn negating_the_wrong_coupling_term_succeeds_with_a_wrong_inverse() {
    let order = 8;
    let a = dominant_matrix(order, 12);
    let whole = BlockDescriptor::square(order, 0, 0);

    let mut correct = CouplingSigns {
        work: a.clone(),
        negate_right: false,
    };
    invert_block(&mut correct, whole, PivotStrategy::A).expect("invertible");
    assert!(identity_residual(&a, &correct.work) < 1e-12);

    let mut swapped = CouplingSigns {
        work: a.clone(),
        negate_right: true,
    };
    invert_block(&mut swapped, whole, PivotStrategy::A)
        .expect("the swapped convention does not fail");
    assert!(identity_residual(&a, &swapped.work) > 1e-6);
    assert!(max_abs_diff(swapped.work.view(), correct.work.view()) > 1e-6);
}

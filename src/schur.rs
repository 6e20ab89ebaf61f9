//! Schur-complement completion of one 2x2 block split.
//!
//! For pivot A, with quadrants A, B, C, D of the block being inverted:
//!
//! 1. `A <- A^-1`
//! 2. `B <- L = -A^-1 B`
//! 3. `D <- S = D + C L`
//! 4. `C <- R = C A^-1`
//! 5. `D <- S^-1`
//! 6. `C <- -S^-1 R`
//! 7. `A <- A^-1 + L C`
//! 8. `B <- L S^-1`
//!
//! Exactly one of L and R carries the negation. Pivot D is the same sequence with
//! A and D exchanged and B and C exchanged. Every step reads only regions that no
//! earlier step still needs, so a storage policy may overwrite quadrants as it goes.

use crate::invert::InversionError;
use crate::leaf::MAX_LEAF_ORDER;
use crate::partition::{BlockDescriptor, Quadrants, split_quadrants};
use crate::types::{PivotSide, PivotStrategy};
use ndarray::Array2;

/// Block storage the completion runs against.
///
/// Descriptors address the implementor's working buffer. Blocks passed to one
/// call never overlap.
pub trait BlockOps {
    /// Pivot strategy applied at every recursion level.
    fn strategy(&self) -> PivotStrategy;

    /// Invert a square block of order 1 through 4 where it lies.
    fn invert_leaf(&mut self, block: BlockDescriptor) -> Result<(), InversionError>;

    /// `target <- -pivot * target`
    fn negate_left_product(
        &mut self,
        pivot: BlockDescriptor,
        target: BlockDescriptor,
    ) -> Result<(), InversionError>;

    /// `target <- target * pivot`
    fn right_product(
        &mut self,
        target: BlockDescriptor,
        pivot: BlockDescriptor,
    ) -> Result<(), InversionError>;

    /// `dst <- dst + left * right`
    fn accumulate_product(
        &mut self,
        dst: BlockDescriptor,
        left: BlockDescriptor,
        right: BlockDescriptor,
    ) -> Result<(), InversionError>;

    /// Copy of a block's current contents.
    fn snapshot(&self, block: BlockDescriptor) -> Array2<f64>;

    /// `dst <- saved - saved * left * right`
    fn restore_schur(
        &mut self,
        dst: BlockDescriptor,
        saved: &Array2<f64>,
        left: BlockDescriptor,
        right: BlockDescriptor,
    ) -> Result<(), InversionError>;

    /// Invert a square diagonal block, re-entering the recursion.
    fn invert_diagonal(&mut self, block: BlockDescriptor) -> Result<(), InversionError>
    where
        Self: Sized,
    {
        let strategy = self.strategy();
        invert_block(self, block, strategy)
    }
}

/// Complete the inverse of a split by pivoting on one diagonal block.
///
/// There is no fallback to the other side: a singular pivot or Schur complement
/// fails the call.
pub fn complete<O: BlockOps>(
    ops: &mut O,
    pivot: PivotSide,
    q: &Quadrants,
) -> Result<(), InversionError> {
    let (piv, opp, out, inn) = match pivot {
        PivotSide::A => (q.a, q.d, q.b, q.c),
        PivotSide::D => (q.d, q.a, q.c, q.b),
    };
    ops.invert_diagonal(piv)?;
    ops.negate_left_product(piv, out)?;
    ops.accumulate_product(opp, inn, out)?;
    ops.right_product(inn, piv)?;
    ops.invert_diagonal(opp)?;
    ops.negate_left_product(opp, inn)?;
    ops.accumulate_product(piv, out, inn)?;
    ops.right_product(out, opp)
}

/// Complete the inverse of a split by inverting both diagonal blocks and then
/// both Schur complements.
///
/// Needs A, D, `A - B D^-1 C` and `D - C A^-1 B` to be invertible.
pub fn complete_a_and_d<O: BlockOps>(ops: &mut O, q: &Quadrants) -> Result<(), InversionError> {
    let a0 = ops.snapshot(q.a);
    let d0 = ops.snapshot(q.d);
    ops.invert_diagonal(q.a)?;
    ops.invert_diagonal(q.d)?;
    ops.negate_left_product(q.a, q.b)?;
    ops.negate_left_product(q.d, q.c)?;
    // A0 (-A^-1 B)(-D^-1 C) = B D^-1 C
    ops.restore_schur(q.a, &a0, q.b, q.c)?;
    ops.restore_schur(q.d, &d0, q.c, q.b)?;
    ops.invert_diagonal(q.a)?;
    ops.invert_diagonal(q.d)?;
    ops.right_product(q.b, q.d)?;
    ops.right_product(q.c, q.a)
}

/// Invert the square `block` of `ops` in place by recursive splitting.
///
/// Terminates because every split of an order above 4 yields halves of order
/// at least 2 and strictly below the parent.
pub fn invert_block<O: BlockOps>(
    ops: &mut O,
    block: BlockDescriptor,
    strategy: PivotStrategy,
) -> Result<(), InversionError> {
    debug_assert!(block.is_square());
    let order = block.rows;
    if order == 0 {
        return Err(InversionError::InvalidOrder(0));
    }
    if order <= MAX_LEAF_ORDER {
        return ops.invert_leaf(block);
    }
    let q = split_quadrants(order, block.row_offset, block.col_offset);
    let result = match strategy {
        PivotStrategy::A => complete(ops, PivotSide::A, &q),
        PivotStrategy::D => complete(ops, PivotSide::D, &q),
        PivotStrategy::AAndD => complete_a_and_d(ops, &q),
    };
    if let Err(err) = &result {
        log::debug!(
            "Block of order {order} at ({}, {}) could not be inverted: {err}",
            block.row_offset,
            block.col_offset
        );
    }
    result
}

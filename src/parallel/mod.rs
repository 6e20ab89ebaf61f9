//! Level-synchronized bottom-up inversion over a fixed leaf partition.
//!
//! The matrix is cut into a power-of-two count of leaf blocks. Every merge
//! combines two adjacent squares with the A-and-D form of the Schur identity:
//! for a parent `[[A, B], [C, D]]`,
//!
//! ```text
//! right = -A^-1 B                left = -D^-1 C
//! A'    = A + B left             D'    = D + C right
//! inv   = [[A'^-1, right D'^-1], [left A'^-1, D'^-1]]
//! ```
//!
//! All squares of one level move through the stage plan together, so each stage
//! is a flat batch of independent tasks run by the worker team. A parallel
//! iterator returns only after its last task finishes, which is the barrier
//! between stages.

mod mirror;
mod schedule;

pub use schedule::{Stage, stage_plan};

use crate::invert::InversionError;
use crate::leaf::{MAX_LEAF_ORDER, invert_buffer, invert_leaf};
use crate::partition::LeafPartition;
use mirror::{MirrorHierarchy, SharedBlock};
use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::ops::Range;
use std::sync::OnceLock;

/// Parallel inverter backed by a worker team of fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelBottomUpInverter {
    workers: usize,
}

impl ParallelBottomUpInverter {
    /// A team of `workers` threads; zero is treated as one.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn invert(&self, input: ArrayView2<'_, f64>) -> Result<Array2<f64>, InversionError> {
        let mut output = Array2::<f64>::zeros(input.dim());
        self.invert_into(input, output.view_mut())?;
        Ok(output)
    }

    /// Write the inverse of `input` into `output`.
    ///
    /// The worker pool and mirror hierarchy live only for the duration of the
    /// call. The first singular leaf found stops the plan at the next stage
    /// boundary and is returned.
    pub fn invert_into(
        &self,
        input: ArrayView2<'_, f64>,
        mut output: ArrayViewMut2<'_, f64>,
    ) -> Result<(), InversionError> {
        let (order, cols) = input.dim();
        if order != cols {
            return Err(InversionError::ShapeMismatch {
                order,
                rows: order,
                cols,
            });
        }
        if output.dim() != (order, order) {
            return Err(InversionError::ShapeMismatch {
                order,
                rows: output.nrows(),
                cols: output.ncols(),
            });
        }
        if order == 0 {
            return Err(InversionError::InvalidOrder(0));
        }
        if order <= MAX_LEAF_ORDER {
            return invert_leaf(input, output);
        }

        let partition = LeafPartition::new(order)?;
        let plan = stage_plan(partition.level_count());
        log::debug!(
            "Parallel inversion of order {order}: leaf sizes {:?}, {} merge levels, {} stages, {} workers",
            partition.sizes(),
            partition.level_count(),
            plan.len(),
            self.workers
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| InversionError::WorkerPool(e.to_string()))?;
        let mirror = MirrorHierarchy::new(partition, input);
        pool.install(|| run_plan(&mirror, &plan))?;

        let root = mirror.root();
        for ((i, j), v) in output.indexed_iter_mut() {
            *v = root.get(i, j);
        }
        Ok(())
    }
}

fn run_plan(mirror: &MirrorHierarchy, plan: &[Stage]) -> Result<(), InversionError> {
    let first_error = OnceLock::new();
    for (step, &stage) in plan.iter().enumerate() {
        run_stage(mirror, stage, &first_error);
        if let Some(err) = first_error.get() {
            log::debug!(
                "Stopping parallel plan after stage {} of {} ({stage:?})",
                step + 1,
                plan.len()
            );
            return Err(err.clone());
        }
    }
    Ok(())
}

fn run_stage(mirror: &MirrorHierarchy, stage: Stage, first_error: &OnceLock<InversionError>) {
    match stage {
        Stage::InvertLeaves => invert_leaves(mirror, first_error),
        Stage::Split(level) => split(mirror, level),
        Stage::ZeroPartners(level) => {
            let current = mirror.level(level);
            current
                .left
                .par_iter()
                .chain(current.right.par_iter())
                .for_each(SharedBlock::fill_zero);
        }
        Stage::ComputePartners(level) => compute_partners(mirror, level),
        Stage::AccumulateSchur(level) => accumulate_schur(mirror, level),
        Stage::Combine(level) => combine(mirror, level),
    }
}

/// Shifted window onto a shared block.
#[derive(Clone, Copy)]
struct Window<'a> {
    block: &'a SharedBlock,
    row_shift: usize,
    col_shift: usize,
}

impl<'a> Window<'a> {
    fn whole(block: &'a SharedBlock) -> Self {
        Self::shifted(block, 0, 0)
    }

    fn shifted(block: &'a SharedBlock, row_shift: usize, col_shift: usize) -> Self {
        Self {
            block,
            row_shift,
            col_shift,
        }
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> f64 {
        self.block.get(row + self.row_shift, col + self.col_shift)
    }
}

/// `dst[rows, cols] (+)= alpha * lhs[rows, inner] * rhs[inner, cols]`, one private
/// sum per destination cell.
fn leaf_product(
    dst: Window<'_>,
    lhs: Window<'_>,
    rhs: Window<'_>,
    (rows, cols, inner): (Range<usize>, Range<usize>, Range<usize>),
    alpha: f64,
    accumulate: bool,
) {
    for r in rows {
        for c in cols.clone() {
            let mut sum = 0.0;
            for x in inner.clone() {
                sum += lhs.get(r, x) * rhs.get(x, c);
            }
            let (row, col) = (r + dst.row_shift, c + dst.col_shift);
            if accumulate {
                dst.block.add(row, col, alpha * sum);
            } else {
                dst.block.set(row, col, alpha * sum);
            }
        }
    }
}

fn leaf_copy(dst: Window<'_>, src: Window<'_>, rows: Range<usize>, cols: Range<usize>) {
    for r in rows {
        for c in cols.clone() {
            dst.block
                .set(r + dst.row_shift, c + dst.col_shift, src.get(r, c));
        }
    }
}

/// A (pair, row leaf, column leaf, inner leaf) task of one pairwise stage,
/// decoded from a flat index. Leaves are counted from the start of each child.
struct PairTask {
    pair: usize,
    lower: bool,
    row: usize,
    col: usize,
    inner: usize,
}

impl PairTask {
    fn decode(index: usize, span: usize) -> Self {
        let inner = index % span;
        let col = (index / span) % span;
        let row = (index / (span * span)) % span;
        let rest = index / (span * span * span);
        Self {
            pair: rest / 2,
            lower: rest % 2 == 1,
            row,
            col,
            inner,
        }
    }
}

fn invert_leaves(mirror: &MirrorHierarchy, first_error: &OnceLock<InversionError>) {
    mirror.level(0).squares.par_iter().for_each(|square| {
        let order = square.rows();
        let packed = square.load_leaf(0..order, 0..order);
        match invert_buffer(order, &packed) {
            Ok(inverse) => square.store_leaf(0..order, 0..order, &inverse),
            Err(err) => {
                let _ = first_error.set(err);
            }
        }
    });
}

/// Reseed every square at `level` with the diagonal block of its parent.
fn split(mirror: &MirrorHierarchy, level: usize) {
    let children = &mirror.level(level).squares;
    let parents = &mirror.level(level + 1).squares;
    (0..mirror.partition().block_count())
        .into_par_iter()
        .for_each(|leaf| {
            let child = leaf >> level;
            let shift = if child % 2 == 1 {
                children[child - 1].rows()
            } else {
                0
            };
            let square = &children[child];
            leaf_copy(
                Window::whole(square),
                Window::shifted(&parents[child / 2], shift, shift),
                mirror.local_range(level, leaf),
                0..square.cols(),
            );
        });
}

fn compute_partners(mirror: &MirrorHierarchy, level: usize) {
    let current = mirror.level(level);
    let parents = &mirror.level(level + 1).squares;
    let span = 1usize << level;
    let tasks = current.right.len() * 2 * span * span * span;
    (0..tasks).into_par_iter().for_each(|index| {
        let task = PairTask::decode(index, span);
        let k = task.pair;
        let split_at = current.squares[2 * k].rows();
        // Upper: right[k] -= inv(A) B. Lower: left[k] -= inv(D) C.
        let (dst, inverse, coupling, own, other) = if task.lower {
            (
                &current.left[k],
                &current.squares[2 * k + 1],
                Window::shifted(&parents[k], split_at, 0),
                2 * k + 1,
                2 * k,
            )
        } else {
            (
                &current.right[k],
                &current.squares[2 * k],
                Window::shifted(&parents[k], 0, split_at),
                2 * k,
                2 * k + 1,
            )
        };
        let first = |child: usize| mirror.leaves(level, child).start;
        leaf_product(
            Window::whole(dst),
            Window::whole(inverse),
            coupling,
            (
                mirror.local_range(level, first(own) + task.row),
                mirror.local_range(level, first(other) + task.col),
                mirror.local_range(level, first(own) + task.inner),
            ),
            -1.0,
            true,
        );
    });
}

fn accumulate_schur(mirror: &MirrorHierarchy, level: usize) {
    let current = mirror.level(level);
    let parents = &mirror.level(level + 1).squares;
    let span = 1usize << level;
    let tasks = current.right.len() * 2 * span * span * span;
    (0..tasks).into_par_iter().for_each(|index| {
        let task = PairTask::decode(index, span);
        let k = task.pair;
        let split_at = current.squares[2 * k].rows();
        // Upper: square[2k] += B left[k]. Lower: square[2k + 1] += C right[k].
        let (dst, coupling, partner, own, other) = if task.lower {
            (
                &current.squares[2 * k + 1],
                Window::shifted(&parents[k], split_at, 0),
                &current.right[k],
                2 * k + 1,
                2 * k,
            )
        } else {
            (
                &current.squares[2 * k],
                Window::shifted(&parents[k], 0, split_at),
                &current.left[k],
                2 * k,
                2 * k + 1,
            )
        };
        let first = |child: usize| mirror.leaves(level, child).start;
        leaf_product(
            Window::whole(dst),
            coupling,
            Window::whole(partner),
            (
                mirror.local_range(level, first(own) + task.row),
                mirror.local_range(level, first(own) + task.col),
                mirror.local_range(level, first(other) + task.inner),
            ),
            1.0,
            true,
        );
    });
}

/// Write `[[A'^-1, right D'^-1], [left A'^-1, D'^-1]]` into every square at
/// `level` from the inverted halves one level below.
fn combine(mirror: &MirrorHierarchy, level: usize) {
    let below = level - 1;
    let halves = mirror.level(below);
    let parents = &mirror.level(level).squares;
    let span = 1usize << level;
    let half = span / 2;
    let tasks = parents.len() * span * span;
    (0..tasks).into_par_iter().for_each(|index| {
        let col = index % span;
        let row = (index / span) % span;
        let k = index / (span * span);
        let parent = &parents[k];
        let upper = &halves.squares[2 * k];
        let lower = &halves.squares[2 * k + 1];
        let split_at = upper.rows();
        let first = mirror.leaves(level, k).start;
        let rows = mirror.local_range(below, first + row);
        let cols = mirror.local_range(below, first + col);
        match (row < half, col < half) {
            (true, true) => leaf_copy(
                Window::whole(parent),
                Window::whole(upper),
                rows,
                cols,
            ),
            (false, false) => leaf_copy(
                Window::shifted(parent, split_at, split_at),
                Window::whole(lower),
                rows,
                cols,
            ),
            (true, false) => leaf_product(
                Window::shifted(parent, 0, split_at),
                Window::whole(&halves.right[k]),
                Window::whole(lower),
                (rows, cols, 0..lower.rows()),
                1.0,
                false,
            ),
            (false, true) => leaf_product(
                Window::shifted(parent, split_at, 0),
                Window::whole(&halves.left[k]),
                Window::whole(upper),
                (rows, cols, 0..split_at),
                1.0,
                false,
            ),
        }
    });
}

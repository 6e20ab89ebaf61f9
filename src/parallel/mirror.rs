//! Shared storage for the level-synchronized merge.
//!
//! Level `L` of the hierarchy holds `block_count >> L` squares; square `j` spans
//! the leaf blocks `j << L .. (j + 1) << L`. Below the root every level also holds
//! one left and one right partner block per pair of squares. Cells are atomic so
//! that tasks of one stage can read and accumulate into blocks shared by the
//! whole worker team.

use crate::partition::LeafPartition;
use ndarray::ArrayView2;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// `f64` cell with lock-free accumulation.
///
/// Stage barriers order every write before the next stage's reads, so relaxed
/// ordering is enough for the cells themselves.
#[derive(Debug, Default)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Atomically add `delta`, retrying on contention.
    #[inline]
    pub(crate) fn fetch_add(&self, delta: f64) -> f64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(prev) => return f64::from_bits(prev),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Dense row-major block of atomic cells.
#[derive(Debug)]
pub(crate) struct SharedBlock {
    rows: usize,
    cols: usize,
    cells: Vec<AtomicF64>,
}

impl SharedBlock {
    pub(crate) fn zeros(rows: usize, cols: usize) -> Self {
        let cells = (0..rows * cols).map(|_| AtomicF64::default()).collect();
        Self { rows, cols, cells }
    }

    pub(crate) fn from_view(view: ArrayView2<'_, f64>) -> Self {
        let (rows, cols) = view.dim();
        let cells = view.iter().map(|&v| AtomicF64::new(v)).collect();
        Self { rows, cols, cells }
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    pub(crate) fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn cell(&self, row: usize, col: usize) -> &AtomicF64 {
        debug_assert!(row < self.rows && col < self.cols);
        &self.cells[row * self.cols + col]
    }

    #[inline]
    pub(crate) fn get(&self, row: usize, col: usize) -> f64 {
        self.cell(row, col).load()
    }

    #[inline]
    pub(crate) fn set(&self, row: usize, col: usize, value: f64) {
        self.cell(row, col).store(value);
    }

    #[inline]
    pub(crate) fn add(&self, row: usize, col: usize, delta: f64) {
        self.cell(row, col).fetch_add(delta);
    }

    pub(crate) fn fill_zero(&self) {
        for cell in &self.cells {
            cell.store(0.0);
        }
    }

    /// Packed row-major copy of a sub-block of at most 4x4 entries.
    pub(crate) fn load_leaf(&self, rows: Range<usize>, cols: Range<usize>) -> [f64; 16] {
        let width = cols.len();
        let mut buf = [0.0; 16];
        for (i, r) in rows.enumerate() {
            for (j, c) in cols.clone().enumerate() {
                buf[i * width + j] = self.get(r, c);
            }
        }
        buf
    }

    pub(crate) fn store_leaf(&self, rows: Range<usize>, cols: Range<usize>, buf: &[f64; 16]) {
        let width = cols.len();
        for (i, r) in rows.enumerate() {
            for (j, c) in cols.clone().enumerate() {
                self.set(r, c, buf[i * width + j]);
            }
        }
    }
}

/// Squares and partner blocks of one merge level.
#[derive(Debug)]
pub(crate) struct MirrorLevel {
    pub(crate) squares: Vec<SharedBlock>,
    /// `-inv(square[2k + 1]) * C_k`, shaped like the bottom-left of parent `k`.
    pub(crate) left: Vec<SharedBlock>,
    /// `-inv(square[2k]) * B_k`, shaped like the top-right of parent `k`.
    pub(crate) right: Vec<SharedBlock>,
}

/// Every merge level of one parallel inversion, sized from its leaf partition.
#[derive(Debug)]
pub(crate) struct MirrorHierarchy {
    partition: LeafPartition,
    levels: Vec<MirrorLevel>,
}

impl MirrorHierarchy {
    /// Allocate all levels and load `input` into the root square.
    pub(crate) fn new(partition: LeafPartition, input: ArrayView2<'_, f64>) -> Self {
        let root = partition.level_count();
        let mut levels = Vec::with_capacity(root + 1);
        for level in 0..root {
            let count = partition.block_count() >> level;
            let order = |j: usize| partition.level_range(level, j).len();
            let squares = (0..count)
                .map(|j| SharedBlock::zeros(order(j), order(j)))
                .collect();
            let right = (0..count / 2)
                .map(|k| SharedBlock::zeros(order(2 * k), order(2 * k + 1)))
                .collect();
            let left = (0..count / 2)
                .map(|k| SharedBlock::zeros(order(2 * k + 1), order(2 * k)))
                .collect();
            levels.push(MirrorLevel {
                squares,
                left,
                right,
            });
        }
        levels.push(MirrorLevel {
            squares: vec![SharedBlock::from_view(input)],
            left: Vec::new(),
            right: Vec::new(),
        });
        Self { partition, levels }
    }

    pub(crate) fn partition(&self) -> &LeafPartition {
        &self.partition
    }

    pub(crate) fn root_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub(crate) fn level(&self, level: usize) -> &MirrorLevel {
        &self.levels[level]
    }

    pub(crate) fn root(&self) -> &SharedBlock {
        &self.levels[self.root_level()].squares[0]
    }

    /// Leaf blocks spanned by square `index` at `level`.
    pub(crate) fn leaves(&self, level: usize, index: usize) -> Range<usize> {
        (index << level)..((index + 1) << level)
    }

    /// Element range of `leaf` relative to the start of the square at `level`
    /// that contains it.
    pub(crate) fn local_range(&self, level: usize, leaf: usize) -> Range<usize> {
        let base = self.partition.offsets()[(leaf >> level) << level];
        let block = self.partition.block(leaf);
        block.start - base..block.end - base
    }
}

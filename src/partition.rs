use crate::invert::InversionError;
use crate::leaf::MAX_LEAF_ORDER;
use ndarray::{Ix2, SliceInfo, SliceInfoElem, s};
use std::ops::Range;

/// Rectangular region of a matrix, addressed by extent and offset.
///
/// Descriptors own no storage; the recursion passes them by value over one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockDescriptor {
    pub rows: usize,
    pub cols: usize,
    pub row_offset: usize,
    pub col_offset: usize,
}

impl BlockDescriptor {
    pub fn square(order: usize, row_offset: usize, col_offset: usize) -> Self {
        Self {
            rows: order,
            cols: order,
            row_offset,
            col_offset,
        }
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn row_range(&self) -> Range<usize> {
        self.row_offset..self.row_offset + self.rows
    }

    pub fn col_range(&self) -> Range<usize> {
        self.col_offset..self.col_offset + self.cols
    }

    /// Slice argument selecting this region from a 2-D array.
    pub fn slice_info(&self) -> SliceInfo<[SliceInfoElem; 2], Ix2, Ix2> {
        s![self.row_range(), self.col_range()]
    }

    /// The same region re-anchored at the origin of a private copy.
    pub fn at_origin(&self) -> Self {
        Self {
            row_offset: 0,
            col_offset: 0,
            ..*self
        }
    }
}

/// The four sub-blocks of one 2x2 split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quadrants {
    pub a: BlockDescriptor,
    pub b: BlockDescriptor,
    pub c: BlockDescriptor,
    pub d: BlockDescriptor,
}

impl Quadrants {
    pub fn ordera(&self) -> usize {
        self.a.rows
    }

    pub fn orderd(&self) -> usize {
        self.d.rows
    }
}

/// Split the square block of `order` at `(row, col)` into A, B, C, D.
///
/// `ordera = order / 2` and `orderd = order - ordera`, so D is never smaller than A.
pub fn split_quadrants(order: usize, row: usize, col: usize) -> Quadrants {
    let ordera = order / 2;
    let orderd = order - ordera;
    Quadrants {
        a: BlockDescriptor::square(ordera, row, col),
        b: BlockDescriptor {
            rows: ordera,
            cols: orderd,
            row_offset: row,
            col_offset: col + ordera,
        },
        c: BlockDescriptor {
            rows: orderd,
            cols: ordera,
            row_offset: row + ordera,
            col_offset: col,
        },
        d: BlockDescriptor::square(orderd, row + ordera, col + ordera),
    }
}

/// Decomposition of an order into a power-of-two count of adjacent leaf blocks
/// sized 2, 3 or 4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPartition {
    sizes: Vec<usize>,
    offsets: Vec<usize>,
}

impl LeafPartition {
    /// Leaf partition for `order >= 5`.
    ///
    /// With `blocksize = 2^(floor(log2 order) - 1)` blocks, the first
    /// `blocksize - order % blocksize` take the smaller size and the rest the larger
    /// one, where the pair is (2, 3) below `3 * blocksize` and (3, 4) otherwise.
    pub fn new(order: usize) -> Result<Self, InversionError> {
        if order <= MAX_LEAF_ORDER {
            return Err(InversionError::InvalidOrder(order));
        }
        let blocksize = 1usize << (order.ilog2() - 1);
        let small_count = blocksize - order % blocksize;
        let (small, large) = if order < 3 * blocksize {
            (2, 3)
        } else {
            (3, 4)
        };
        let sizes: Vec<usize> = (0..blocksize)
            .map(|j| if j < small_count { small } else { large })
            .collect();
        Self::from_sizes(sizes)
    }

    /// Partition from explicit leaf sizes. The count must be a power of two and
    /// every size a leaf order of at least 2.
    pub fn from_sizes(sizes: Vec<usize>) -> Result<Self, InversionError> {
        if !sizes.len().is_power_of_two() {
            return Err(InversionError::InvalidOrder(sizes.iter().sum()));
        }
        if let Some(&bad) = sizes.iter().find(|&&s| !(2..=MAX_LEAF_ORDER).contains(&s)) {
            return Err(InversionError::InvalidOrder(bad));
        }
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        let mut next = 0;
        offsets.push(next);
        for &size in &sizes {
            next += size;
            offsets.push(next);
        }
        Ok(Self { sizes, offsets })
    }

    pub fn order(&self) -> usize {
        self.offsets[self.sizes.len()]
    }

    pub fn block_count(&self) -> usize {
        self.sizes.len()
    }

    /// Number of merge levels below the root: `log2(block_count)`.
    pub fn level_count(&self) -> usize {
        self.sizes.len().trailing_zeros() as usize
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn block(&self, index: usize) -> Range<usize> {
        self.range(index, 1)
    }

    /// Element range covered by `count` leaf blocks starting at `first`.
    pub fn range(&self, first: usize, count: usize) -> Range<usize> {
        self.offsets[first]..self.offsets[first + count]
    }

    /// Element range of square `index` at merge `level`, which spans `2^level`
    /// consecutive leaf blocks.
    pub fn level_range(&self, level: usize, index: usize) -> Range<usize> {
        self.range(index << level, 1 << level)
    }
}

//! Splitting a block product into independent per-cell units of work.
//!
//! Output cell `(i, j)` needs row `i` of A and column `j` of B, nothing else:
//! `C[i][j] = sum over k of A[i][k] * B[k][j]`. Everything here is about
//! pairing those operands up and reducing their partial products.

use crate::block::{self, Block, BlockGrid};
use crate::error::Result;

/// Block kernel used to form each partial product.
///
/// Executors default to [`block::multiply`]. The kernel is a plain function
/// pointer so it can be handed to worker threads without boxing.
pub type Kernel = fn(&Block, &Block) -> Result<Block>;

/// One self-contained output cell: its coordinates plus owned copies of the
/// row of A and column of B it needs.
///
/// Owning the operands means a worker never reads the caller's grids, so
/// tasks can be shipped to any thread in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub row: usize,
    pub col: usize,
    pub a_row: Vec<Block>,
    pub b_col: Vec<Block>,
}

impl TaskDescriptor {
    /// Copy out the operands for cell `(i, j)` of `a * b`.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `j` is outside the grid.
    pub fn new(a: &BlockGrid, b: &BlockGrid, i: usize, j: usize) -> Self {
        Self {
            row: i,
            col: j,
            a_row: a.row(i).to_vec(),
            b_col: b.column(j).cloned().collect(),
        }
    }

    pub fn cell(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// Partial products `A[i][k] * B[k][j]` in increasing `k`, computed lazily.
    pub fn partial_products(&self, kernel: Kernel) -> impl Iterator<Item = Result<Block>> + '_ {
        self.a_row
            .iter()
            .zip(&self.b_col)
            .map(move |(a, b)| kernel(a, b))
    }

    /// Reduce this cell to its output block.
    ///
    /// # Errors
    ///
    /// Propagates the first kernel or shape error.
    pub fn compute(&self, kernel: Kernel) -> Result<Block> {
        let side = self.a_row.first().map_or(0, Block::side);
        accumulate(self.a_row.iter().zip(&self.b_col), side, kernel)
    }

    /// Consume the task and return its tagged result `(i, j, block)`.
    ///
    /// # Errors
    ///
    /// Same as [`TaskDescriptor::compute`].
    pub fn run(self, kernel: Kernel) -> Result<(usize, usize, Block)> {
        let block = self.compute(kernel)?;
        Ok((self.row, self.col, block))
    }
}

/// Every task for `a * b`, in row-major cell order.
pub fn tasks(a: &BlockGrid, b: &BlockGrid) -> Vec<TaskDescriptor> {
    let n = a.blocks_per_side();
    (0..n)
        .flat_map(|i| (0..n).map(move |j| (i, j)))
        .map(|(i, j)| TaskDescriptor::new(a, b, i, j))
        .collect()
}

/// Borrowed `(A[i][k], B[k][j])` pairs for cell `(i, j)`, in increasing `k`.
pub fn operand_pairs<'a>(
    a: &'a BlockGrid,
    b: &'a BlockGrid,
    i: usize,
    j: usize,
) -> impl Iterator<Item = (&'a Block, &'a Block)> + 'a {
    a.row(i).iter().zip(b.column(j))
}

/// Start from a zero block and add each partial product in turn.
///
/// # Errors
///
/// Propagates the first kernel or shape error.
pub fn accumulate<'a>(
    pairs: impl IntoIterator<Item = (&'a Block, &'a Block)>,
    side: usize,
    kernel: Kernel,
) -> Result<Block> {
    let mut acc = Block::zeros(side);
    for (a, b) in pairs {
        acc.add_assign(&kernel(a, b)?)?;
    }
    Ok(acc)
}

/// Sum already computed partial products. Order does not matter beyond
/// floating-point rounding.
///
/// # Errors
///
/// Returns [`crate::Error::ShapeMismatch`] if the partials differ in side.
pub fn reduce<'a>(partials: impl IntoIterator<Item = &'a Block>, side: usize) -> Result<Block> {
    partials
        .into_iter()
        .try_fold(Block::zeros(side), |acc, p| block::add(&acc, p))
}

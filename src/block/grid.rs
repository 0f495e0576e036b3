//! N×N grids of M×M blocks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Block;
use crate::error::{Error, Result};

/// One operand or result matrix in block form.
///
/// Cells are stored row-major: cell `(i, j)` lives at `i * n + j`. Every
/// block has the same side, and both `n` and the side are at least 1.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGrid {
    n: usize,
    m: usize,
    cells: Vec<Block>,
}

impl BlockGrid {
    /// Build a grid from nested rows of blocks.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDimensions`] if there are no rows or the blocks are 0×0.
    /// - [`Error::ShapeMismatch`] if the grid is not square or blocks differ in side.
    pub fn from_rows(rows: Vec<Vec<Block>>) -> Result<Self> {
        let n = rows.len();
        let m = rows.first().and_then(|r| r.first()).map_or(0, Block::side);
        if n == 0 || m == 0 {
            return Err(Error::InvalidDimensions { n, m });
        }

        let mut cells = Vec::with_capacity(n * n);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n {
                return Err(Error::ShapeMismatch {
                    expected: format!("{n} blocks in row {i}"),
                    found: format!("{} blocks", row.len()),
                });
            }
            for block in row {
                if block.side() != m {
                    return Err(Error::block_mismatch(m, block.side()));
                }
                cells.push(block);
            }
        }
        Ok(Self { n, m, cells })
    }

    /// Build a grid by calling `f(i, j)` for every cell.
    ///
    /// # Errors
    ///
    /// Same conditions as [`BlockGrid::from_rows`].
    pub fn from_fn(n: usize, m: usize, mut f: impl FnMut(usize, usize) -> Block) -> Result<Self> {
        if n == 0 || m == 0 {
            return Err(Error::InvalidDimensions { n, m });
        }
        let rows = (0..n).map(|i| (0..n).map(|j| f(i, j)).collect()).collect();
        Self::from_rows(rows)
    }

    /// Grid of zero blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`] if `n` or `m` is zero.
    pub fn zeros(n: usize, m: usize) -> Result<Self> {
        Self::from_fn(n, m, |_, _| Block::zeros(m))
    }

    /// Uniform `[0, 1)` entries drawn from `rng`, cell by cell.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`] if `n` or `m` is zero.
    pub fn random<R: Rng>(n: usize, m: usize, rng: &mut R) -> Result<Self> {
        Self::from_fn(n, m, |_, _| Block::from_fn(m, |_, _| rng.random::<f64>()))
    }

    /// [`BlockGrid::random`] driven by a `StdRng` seeded with `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`] if `n` or `m` is zero.
    pub fn seeded(n: usize, m: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::random(n, m, &mut rng)
    }

    /// Split a row-major `(n*m)×(n*m)` dense matrix into blocks.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDimensions`] if `n` or `m` is zero.
    /// - [`Error::ShapeMismatch`] if `dense` has the wrong length.
    pub fn from_dense(dense: &[f64], n: usize, m: usize) -> Result<Self> {
        let dim = n * m;
        if dense.len() != dim * dim {
            return Err(Error::ShapeMismatch {
                expected: format!("{} elements for a {dim}x{dim} matrix", dim * dim),
                found: format!("{} elements", dense.len()),
            });
        }
        Self::from_fn(n, m, |i, j| {
            Block::from_fn(m, |r, c| dense[(i * m + r) * dim + j * m + c])
        })
    }

    /// Assemble the full row-major matrix these blocks tile.
    pub fn to_dense(&self) -> Vec<f64> {
        let dim = self.dim();
        let mut out = vec![0.0; dim * dim];
        for i in 0..self.n {
            for j in 0..self.n {
                let block = self.block(i, j);
                for r in 0..self.m {
                    let dst = (i * self.m + r) * dim + j * self.m;
                    let src = &block.as_slice()[r * self.m..(r + 1) * self.m];
                    out[dst..dst + self.m].copy_from_slice(src);
                }
            }
        }
        out
    }

    /// Blocks per grid side (N).
    pub fn blocks_per_side(&self) -> usize {
        self.n
    }

    /// Side of every block (M).
    pub fn block_side(&self) -> usize {
        self.m
    }

    /// Side of the dense matrix, N·M.
    pub fn dim(&self) -> usize {
        self.n * self.m
    }

    /// Block at cell `(i, j)`.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `j` is not below N.
    pub fn block(&self, i: usize, j: usize) -> &Block {
        let n = self.n;
        assert!(i < n && j < n, "cell ({i}, {j}) outside {n}x{n} grid");
        &self.cells[i * n + j]
    }

    /// Blocks `(i, 0..N)`.
    pub fn row(&self, i: usize) -> &[Block] {
        &self.cells[i * self.n..(i + 1) * self.n]
    }

    /// Blocks `(0..N, j)`, top to bottom.
    pub fn column(&self, j: usize) -> impl Iterator<Item = &Block> + '_ {
        self.cells.iter().skip(j).step_by(self.n)
    }

    /// `Ok(())` if `other` has the same N and M, so `self * other` is defined.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] describing both shapes otherwise.
    pub fn check_conformable(&self, other: &BlockGrid) -> Result<()> {
        if self.n != other.n || self.m != other.m {
            return Err(Error::ShapeMismatch {
                expected: self.shape(),
                found: other.shape(),
            });
        }
        Ok(())
    }

    /// Elementwise closeness of the two grids, see [`crate::dense::allclose`].
    pub fn approx_eq(&self, other: &BlockGrid, rtol: f64, atol: f64) -> bool {
        self.n == other.n
            && self.m == other.m
            && self
                .cells
                .iter()
                .zip(&other.cells)
                .all(|(a, b)| crate::dense::allclose(a.as_slice(), b.as_slice(), rtol, atol))
    }

    fn shape(&self) -> String {
        format!("{0}x{0} grid of {1}x{1} blocks", self.n, self.m)
    }

    /// Assemble a grid from cells already in row-major order. Callers
    /// guarantee `cells.len() == n * n` and every block is `m`×`m`.
    pub(crate) fn from_cells(n: usize, m: usize, cells: Vec<Block>) -> Self {
        debug_assert_eq!(cells.len(), n * n);
        debug_assert!(cells.iter().all(|b| b.side() == m));
        Self { n, m, cells }
    }
}

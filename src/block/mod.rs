//! Square matrix blocks and the scalar arithmetic every executor runs.
//!
//! The multiply here is the textbook i-j-k triple loop on purpose. It is the
//! CPU-bound unit of work the executors parallelize, so it stays scalar: no
//! loop reordering, no SIMD, no FMA.

pub mod grid;

pub use grid::BlockGrid;

use crate::error::{Error, Result};

/// An M×M block of `f64`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    side: usize,
    data: Vec<f64>,
}

impl Block {
    /// All-zero block with `side` rows and columns.
    pub fn zeros(side: usize) -> Self {
        Self {
            side,
            data: vec![0.0; side * side],
        }
    }

    /// Wrap row-major data as a `side`×`side` block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if `data.len() != side * side`.
    pub fn from_vec(side: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != side * side {
            return Err(Error::ShapeMismatch {
                expected: format!("{} elements for a {side}x{side} block", side * side),
                found: format!("{} elements", data.len()),
            });
        }
        Ok(Self { side, data })
    }

    /// Build a block by evaluating `f(row, col)` for every element.
    pub fn from_fn(side: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(side * side);
        for r in 0..side {
            for c in 0..side {
                data.push(f(r, c));
            }
        }
        Self { side, data }
    }

    /// Rows (and columns) in this block.
    pub fn side(&self) -> usize {
        self.side
    }

    /// Element at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        assert!(
            row < self.side && col < self.side,
            "index ({row}, {col}) out of range for {}x{} block",
            self.side,
            self.side
        );
        self.data[row * self.side + col]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// In-place `self += other`. Reductions accumulate with this so a cell
    /// never allocates more than one output block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the sides differ.
    pub fn add_assign(&mut self, other: &Block) -> Result<()> {
        if self.side != other.side {
            return Err(Error::block_mismatch(self.side, other.side));
        }
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            *dst += *src;
        }
        Ok(())
    }
}

/// Block product `A * B` using the i-j-k loop order.
///
/// Each output element is accumulated in a local before being stored, which
/// keeps the innermost loop striding down a column of B. That stride is what
/// makes this slow; it is the workload, not a bug.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the blocks have different sides.
pub fn multiply(a: &Block, b: &Block) -> Result<Block> {
    if a.side != b.side {
        return Err(Error::block_mismatch(a.side, b.side));
    }
    let m = a.side;
    let mut c = vec![0.0; m * m];
    for i in 0..m {
        for j in 0..m {
            let mut acc = 0.0;
            for p in 0..m {
                acc += a.data[i * m + p] * b.data[p * m + j];
            }
            c[i * m + j] = acc;
        }
    }
    Ok(Block { side: m, data: c })
}

/// Elementwise sum `A + B`.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the blocks have different sides.
pub fn add(a: &Block, b: &Block) -> Result<Block> {
    let mut c = a.clone();
    c.add_assign(b)?;
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_2x2_multiply() {
        let a = Block::from_vec(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Block::from_vec(2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();

        let c = multiply(&a, &b).unwrap();

        assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_identity_is_neutral() {
        let a = Block::from_fn(3, |r, c| (r * 3 + c) as f64);
        let id = Block::from_fn(3, |r, c| if r == c { 1.0 } else { 0.0 });

        assert_eq!(multiply(&a, &id).unwrap(), a);
        assert_eq!(multiply(&id, &a).unwrap(), a);
    }

    #[test]
    fn test_add_elementwise() {
        let a = Block::from_vec(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Block::from_vec(2, vec![0.5, 0.5, -3.0, 6.0]).unwrap();

        let c = add(&a, &b).unwrap();

        assert_eq!(c.as_slice(), &[1.5, 2.5, 0.0, 10.0]);
        // operands untouched
        assert_eq!(a.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_1x1_is_scalar_product() {
        let a = Block::from_vec(1, vec![3.0]).unwrap();
        let b = Block::from_vec(1, vec![-2.5]).unwrap();
        assert_eq!(multiply(&a, &b).unwrap().get(0, 0), -7.5);
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let a = Block::zeros(2);
        let b = Block::zeros(3);

        assert!(matches!(multiply(&a, &b), Err(Error::ShapeMismatch { .. })));
        assert!(matches!(add(&a, &b), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = Block::from_vec(2, vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_from_fn_is_row_major() {
        let b = Block::from_fn(2, |r, c| (10 * r + c) as f64);
        assert_eq!(b.as_slice(), &[0.0, 1.0, 10.0, 11.0]);
        assert_eq!(b.get(1, 0), 10.0);
    }
}

//! Dense reference product and approximate comparison.
//!
//! Block executors are checked against these: assemble both operands into
//! full matrices, multiply them here, and compare with [`allclose`].

use crate::block::BlockGrid;

/// Relative tolerance used by [`grid_matches_reference`].
pub const DEFAULT_RTOL: f64 = 1e-5;
/// Absolute tolerance used by [`grid_matches_reference`].
pub const DEFAULT_ATOL: f64 = 1e-8;

/// Square dense product `C = A * B`, all `dim`×`dim` and row-major.
///
/// Uses the i-k-j loop order so the inner loop walks B and C sequentially.
/// This is the oracle, so it is written independently of the block kernel.
///
/// # Panics
///
/// Panics if either slice is not `dim * dim` long.
pub fn reference_product(a: &[f64], b: &[f64], dim: usize) -> Vec<f64> {
    let len = dim * dim;
    assert_eq!(a.len(), len, "A: expected {dim}x{dim}={len} elements");
    assert_eq!(b.len(), len, "B: expected {dim}x{dim}={len} elements");

    let mut c = vec![0.0; len];
    for i in 0..dim {
        for p in 0..dim {
            let a_ip = a[i * dim + p];
            for j in 0..dim {
                c[i * dim + j] += a_ip * b[p * dim + j];
            }
        }
    }
    c
}

/// `true` if every pair satisfies `|actual - expected| <= atol + rtol * |expected|`.
///
/// Slices of different length are never close.
pub fn allclose(actual: &[f64], expected: &[f64], rtol: f64, atol: f64) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(x, y)| (x - y).abs() <= atol + rtol * y.abs())
}

/// Check a block product against the dense product of its operands.
pub fn grid_matches_reference(a: &BlockGrid, b: &BlockGrid, c: &BlockGrid) -> bool {
    if a.dim() != c.dim() || b.dim() != c.dim() {
        return false;
    }
    let expected = reference_product(&a.to_dense(), &b.to_dense(), a.dim());
    allclose(&c.to_dense(), &expected, DEFAULT_RTOL, DEFAULT_ATOL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_2x2() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        assert_eq!(reference_product(&a, &b, 2), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_allclose_tolerances() {
        assert!(allclose(&[1.0, 2.0], &[1.0, 2.0], 0.0, 0.0));
        assert!(allclose(&[1.0 + 1e-9], &[1.0], DEFAULT_RTOL, DEFAULT_ATOL));
        assert!(allclose(&[1000.001], &[1000.0], DEFAULT_RTOL, DEFAULT_ATOL));
        assert!(!allclose(&[1.001], &[1.0], DEFAULT_RTOL, DEFAULT_ATOL));
        assert!(!allclose(&[1.0], &[1.0, 1.0], DEFAULT_RTOL, DEFAULT_ATOL));
    }

    #[test]
    fn test_grid_matches_reference_detects_corruption() {
        let a = BlockGrid::seeded(2, 3, 1).unwrap();
        let b = BlockGrid::seeded(2, 3, 2).unwrap();
        let dense = reference_product(&a.to_dense(), &b.to_dense(), a.dim());

        let good = BlockGrid::from_dense(&dense, 2, 3).unwrap();
        assert!(grid_matches_reference(&a, &b, &good));

        let mut bad = dense;
        bad[7] += 0.5;
        let bad = BlockGrid::from_dense(&bad, 2, 3).unwrap();
        assert!(!grid_matches_reference(&a, &b, &bad));
    }
}

use crate::error::MinimizerError;
use ndarray::prelude::*;

const PIVOT_TOL: f64 = 1e-12;

/// Solve `a * x = b` by Gaussian elimination with partial pivoting.
///
/// Systems here are small (at most 2m x 2m for history depth m), so dense
/// elimination is adequate.
pub(crate) fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, MinimizerError> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(MinimizerError::DimensionMismatch(format!(
            "system is {}x{} with rhs of length {}",
            a.nrows(),
            a.ncols(),
            b.len()
        )));
    }
    if n == 0 {
        return Ok(Array1::zeros(0));
    }

    let mut ax = a.clone();
    let mut bx = b.clone();

    // Forward elimination with partial pivoting
    for k in 0..n {
        let mut max_row = k;
        for i in k + 1..n {
            if ax[[i, k]].abs() > ax[[max_row, k]].abs() {
                max_row = i;
            }
        }
        if ax[[max_row, k]].abs() < PIVOT_TOL {
            return Err(MinimizerError::LinearSystemSingular);
        }
        if max_row != k {
            for j in 0..n {
                ax.swap((k, j), (max_row, j));
            }
            bx.swap(k, max_row);
        }

        for i in k + 1..n {
            let factor = ax[[i, k]] / ax[[k, k]];
            for j in k..n {
                ax[[i, j]] -= factor * ax[[k, j]];
            }
            bx[i] -= factor * bx[k];
        }
    }

    // Back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = bx[i];
        for j in i + 1..n {
            sum -= ax[[i, j]] * x[j];
        }
        x[i] = sum / ax[[i, i]];
    }
    Ok(x)
}

/// Invert a small square matrix by Gauss-Jordan elimination on `[a | I]`.
pub(crate) fn invert(a: &Array2<f64>) -> Result<Array2<f64>, MinimizerError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(MinimizerError::DimensionMismatch(format!(
            "matrix is {}x{}",
            a.nrows(),
            a.ncols()
        )));
    }
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }

    let mut aug = Array2::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = a[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for k in 0..n {
        let mut max_row = k;
        for i in k + 1..n {
            if aug[[i, k]].abs() > aug[[max_row, k]].abs() {
                max_row = i;
            }
        }
        if aug[[max_row, k]].abs() < PIVOT_TOL {
            return Err(MinimizerError::LinearSystemSingular);
        }
        if max_row != k {
            for j in 0..2 * n {
                aug.swap((k, j), (max_row, j));
            }
        }

        let pivot = aug[[k, k]];
        for j in 0..2 * n {
            aug[[k, j]] /= pivot;
        }
        for i in 0..n {
            if i == k {
                continue;
            }
            let factor = aug[[i, k]];
            if factor != 0.0 {
                for j in 0..2 * n {
                    aug[[i, j]] -= factor * aug[[k, j]];
                }
            }
        }
    }

    Ok(aug.slice(s![.., n..]).to_owned())
}

#[cfg(test)]
mod minimize_linalg_tests {
    use super::*;
    use float_cmp::{approx_eq, F64Margin};

    const MARGIN: F64Margin = F64Margin {
        epsilon: 1e-10,
        ulps: 4,
    };

    #[test]
    fn test_solve_2x2() {
        let a = array![[3.0, 1.0], [1.0, 2.0]];
        let b = array![9.0, 8.0];
        let x = solve(&a, &b).unwrap();
        assert!(approx_eq!(f64, x[0], 2.0, MARGIN), "x[0] = {}", x[0]);
        assert!(approx_eq!(f64, x[1], 3.0, MARGIN), "x[1] = {}", x[1]);
    }

    #[test]
    fn test_solve_requires_pivoting() {
        // Zero leading pivot forces a row swap
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let b = array![2.0, 5.0];
        let x = solve(&a, &b).unwrap();
        assert!(approx_eq!(f64, x[0], 5.0, MARGIN));
        assert!(approx_eq!(f64, x[1], 2.0, MARGIN));
    }

    #[test]
    fn test_solve_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let b = array![1.0, 2.0];
        assert_eq!(solve(&a, &b), Err(MinimizerError::LinearSystemSingular));
    }

    #[test]
    fn test_solve_empty_system() {
        let a = Array2::<f64>::zeros((0, 0));
        let b = Array1::<f64>::zeros(0);
        assert_eq!(solve(&a, &b).unwrap().len(), 0);
    }

    #[test]
    fn test_invert_roundtrip() {
        let a = array![[4.0, 7.0], [2.0, 6.0]];
        let inv = invert(&a).unwrap();
        let id = a.dot(&inv);
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    approx_eq!(f64, id[[i, j]], expected, MARGIN),
                    "(a * inv(a))[{},{}] = {}",
                    i,
                    j,
                    id[[i, j]]
                );
            }
        }
    }
}

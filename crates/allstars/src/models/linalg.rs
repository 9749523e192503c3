//! Small dense solvers for symmetric positive definite systems.

use ndarray::{Array1, Array2};

use crate::error::{AllstarsError, Result};

/// Lower-triangular Cholesky factor `L` with `a = L Lᵀ`.
pub fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(AllstarsError::ShapeMismatch {
            expected: n,
            actual: a.ncols(),
        });
    }
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let dot: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let d = a[[i, i]] - dot;
                if d <= 0.0 || !d.is_finite() {
                    return Err(AllstarsError::Estimator("matrix is not positive definite".into()));
                }
                l[[i, j]] = d.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - dot) / l[[j, j]];
            }
        }
    }
    Ok(l)
}

/// Solve `L Lᵀ x = b` given the Cholesky factor.
pub fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let dot: f64 = (0..i).map(|k| l[[i, k]] * z[k]).sum();
        z[i] = (b[i] - dot) / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let dot: f64 = (i + 1..n).map(|k| l[[k, i]] * x[k]).sum();
        x[i] = (z[i] - dot) / l[[i, i]];
    }
    x
}

/// `log |a|` from its Cholesky factor.
pub fn log_det(l: &Array2<f64>) -> f64 {
    2.0 * l.diag().iter().map(|d| d.ln()).sum::<f64>()
}

/// Add `eps * mean(diag)` to the diagonal so near-singular covariances stay solvable.
pub fn regularize(a: &mut Array2<f64>, eps: f64) {
    let n = a.nrows();
    let mean_diag = if n > 0 { a.diag().sum() / n as f64 } else { 0.0 };
    let shift = eps * mean_diag.abs().max(1.0);
    for i in 0..n {
        a[[i, i]] += shift;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn solves_a_small_spd_system() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(&a).unwrap();
        let x = cholesky_solve(&l, &array![2.0, 1.0]);
        let back = a.dot(&x);
        assert!((back[0] - 2.0).abs() < 1e-12 && (back[1] - 1.0).abs() < 1e-12);
        assert!((log_det(&l) - 8f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn rejects_indefinite_matrices() {
        assert!(cholesky(&array![[1.0, 2.0], [2.0, 1.0]]).is_err());
    }
}

//! Small linear solvers used by the fitting code.

use spectro_core::{SpectroError, SpectroResult};

/// Symmetric positive-definite matrix with two off-diagonals.
///
/// `diag[i] = A[i][i]`, `off1[i] = A[i][i+1]`, `off2[i] = A[i][i+2]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pentadiagonal {
    pub diag: Vec<f64>,
    pub off1: Vec<f64>,
    pub off2: Vec<f64>,
}

impl Pentadiagonal {
    /// `lambda * DᵀD` for the second-difference operator `D` on `n` points.
    pub fn second_difference_penalty(n: usize, lambda: f64) -> Self {
        const STENCIL: [f64; 3] = [1.0, -2.0, 1.0];
        let mut m = Self {
            diag: vec![0.0; n],
            off1: vec![0.0; n.saturating_sub(1)],
            off2: vec![0.0; n.saturating_sub(2)],
        };
        for k in 0..n.saturating_sub(2) {
            for a in 0..3 {
                for b in a..3 {
                    let v = lambda * STENCIL[a] * STENCIL[b];
                    match b - a {
                        0 => m.diag[k + a] += v,
                        1 => m.off1[k + a] += v,
                        _ => m.off2[k + a] += v,
                    }
                }
            }
        }
        m
    }

    pub fn len(&self) -> usize {
        self.diag.len()
    }

    /// Solve `(self + diag(extra)) x = rhs` by banded Cholesky.
    pub fn solve_with_diagonal(&self, extra: &[f64], rhs: &[f64]) -> SpectroResult<Vec<f64>> {
        let n = self.len();
        if extra.len() != n || rhs.len() != n {
            return Err(SpectroError::Numeric(format!(
                "banded solve: matrix {} vs diagonal {} vs rhs {}",
                n,
                extra.len(),
                rhs.len()
            )));
        }

        // L is lower triangular with bandwidth 2: l0 diagonal, l1 first
        // subdiagonal (row i, col i-1), l2 second subdiagonal (row i, col i-2).
        let mut l0 = vec![0.0; n];
        let mut l1 = vec![0.0; n];
        let mut l2 = vec![0.0; n];
        for i in 0..n {
            if i >= 2 {
                l2[i] = self.off2[i - 2] / l0[i - 2];
            }
            if i >= 1 {
                l1[i] = (self.off1[i - 1] - l2[i] * l1[i - 1]) / l0[i - 1];
            }
            let d = self.diag[i] + extra[i] - l1[i] * l1[i] - l2[i] * l2[i];
            if !(d > 0.0) || !d.is_finite() {
                return Err(SpectroError::Numeric(format!(
                    "banded system is not positive definite at row {}",
                    i
                )));
            }
            l0[i] = d.sqrt();
        }

        let mut u = vec![0.0; n];
        for i in 0..n {
            let mut acc = rhs[i];
            if i >= 1 {
                acc -= l1[i] * u[i - 1];
            }
            if i >= 2 {
                acc -= l2[i] * u[i - 2];
            }
            u[i] = acc / l0[i];
        }

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut acc = u[i];
            if i + 1 < n {
                acc -= l1[i + 1] * x[i + 1];
            }
            if i + 2 < n {
                acc -= l2[i + 2] * x[i + 2];
            }
            x[i] = acc / l0[i];
        }
        Ok(x)
    }
}

/// Solve a dense square system by Gaussian elimination with partial pivoting.
///
/// `a` is row-major `n x n`.
pub(crate) fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> SpectroResult<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(SpectroError::Numeric("dense solve: matrix is not square".into()));
    }

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(SpectroError::Numeric(format!(
                "singular normal equations at column {}",
                col
            )));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Least-squares polynomial coefficients (constant term first).
pub(crate) fn polyfit(x: &[f64], y: &[f64], degree: usize) -> SpectroResult<Vec<f64>> {
    let m = degree + 1;
    if x.len() != y.len() || x.len() < m {
        return Err(SpectroError::Numeric(format!(
            "degree {} fit needs at least {} points, got {}",
            degree,
            m,
            x.len()
        )));
    }
    let mut ata = vec![vec![0.0; m]; m];
    let mut aty = vec![0.0; m];
    for (&xi, &yi) in x.iter().zip(y) {
        let mut powers = vec![1.0; m];
        for k in 1..m {
            powers[k] = powers[k - 1] * xi;
        }
        for r in 0..m {
            aty[r] += powers[r] * yi;
            for c in 0..m {
                ata[r][c] += powers[r] * powers[c];
            }
        }
    }
    solve_dense(ata, aty)
}

/// Horner evaluation, constant term first.
pub(crate) fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

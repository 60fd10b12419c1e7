//! Inversion and validation of covariance matrices.

use nalgebra::{Cholesky, SymmetricEigen};

use crate::error::{Error, NumericalErrorKind, Result, Stage};
use crate::types::Matrix;

/// Invert a symmetric positive definite matrix through its Cholesky factor.
///
/// The matrix is declared singular when the factorisation fails or when some
/// squared pivot `L_ii²`, relative to its own diagonal element `V_ii`, falls
/// below `tolerance`. The ratio is the fraction of variable i not explained
/// by the preceding ones, so the test does not depend on the units of the
/// rows. There is deliberately no pseudo-inverse fallback: a rank-deficient
/// covariance is an input problem.
pub fn invert_spd(matrix: &Matrix, tolerance: f64, stage: Stage, subject: &str) -> Result<Matrix> {
    let fail = |kind| Error::numerical(stage, subject, kind);

    if matrix.iter().any(|x| !x.is_finite()) {
        return Err(fail(NumericalErrorKind::NonFinite));
    }
    if matrix.nrows() == 0 || !matrix.is_square() || matrix.diagonal().iter().any(|d| *d <= 0.0) {
        return Err(fail(NumericalErrorKind::Singular));
    }

    let chol = Cholesky::new(matrix.clone()).ok_or_else(|| fail(NumericalErrorKind::Singular))?;
    let min_ratio = chol
        .l_dirty()
        .diagonal()
        .iter()
        .zip(matrix.diagonal().iter())
        .map(|(l, v)| l * l / v)
        .fold(f64::INFINITY, f64::min);
    if min_ratio < tolerance {
        return Err(fail(NumericalErrorKind::Singular));
    }

    let inverse = chol.inverse();
    // Cholesky inverse is symmetric up to rounding; make it exact.
    Ok((&inverse + inverse.transpose()) * 0.5)
}

/// Check that a matrix is usable as a covariance: finite entries,
/// non-negative variances and no eigenvalue below `-tolerance · max(diag)`.
pub fn check_covariance(matrix: &Matrix, tolerance: f64, stage: Stage, subject: &str) -> Result<()> {
    let fail = |kind| Error::numerical(stage, subject, kind);

    if matrix.iter().any(|x| !x.is_finite()) {
        return Err(fail(NumericalErrorKind::NonFinite));
    }
    if let Some((index, &value)) = matrix.diagonal().iter().enumerate().find(|(_, v)| **v < 0.0) {
        return Err(fail(NumericalErrorKind::NegativeVariance { index, value }));
    }
    if matrix.nrows() == 0 {
        return Ok(());
    }

    let scale = max_diagonal(matrix).max(f64::MIN_POSITIVE);
    let eigen = SymmetricEigen::new(matrix.clone());
    let min_eigenvalue = eigen.eigenvalues.min();
    if min_eigenvalue < -tolerance * scale {
        return Err(fail(NumericalErrorKind::NotPositiveSemiDefinite { min_eigenvalue }));
    }
    Ok(())
}

/// Correlation matrix `c_ij = v_ij / sqrt(v_ii · v_jj)`.
///
/// Rows and columns with zero variance get zero correlation (and a zero
/// diagonal).
pub fn correlation_matrix(covariance: &Matrix) -> Matrix {
    let n = covariance.nrows();
    Matrix::from_fn(n, n, |i, j| {
        let denominator = (covariance[(i, i)] * covariance[(j, j)]).sqrt();
        if denominator > 0.0 {
            covariance[(i, j)] / denominator
        } else {
            0.0
        }
    })
}

fn max_diagonal(matrix: &Matrix) -> f64 {
    matrix.diagonal().iter().fold(0.0_f64, |acc, &d| acc.max(d.abs()))
}

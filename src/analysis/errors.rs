//! Error decomposition: each source's covariance propagated through the
//! weights.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::combination::Blue;
use crate::config::Config;
use crate::covariance::CovarianceSet;
use crate::model::SourceKey;
use crate::statistics::correlation_matrix;
use crate::types::{Matrix, Vector};

/// k×k error matrices of the combined estimates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBreakdown {
    per_source: BTreeMap<SourceKey, Matrix>,
    syst: Matrix,
    syst_cov: Matrix,
    total_from_sources: Matrix,
    total: Matrix,
    scaled_total: Matrix,
}

impl ErrorBreakdown {
    /// Propagate every source: `W · C_s · Wᵀ`.
    ///
    /// Sources whose name contains the configured statistical marker are left
    /// out of the systematic sums.
    pub fn compute(blue: &Blue, covariances: &CovarianceSet, config: &Config) -> Self {
        let w = blue.weights();
        let wt = w.transpose();
        let k = w.nrows();
        let n = w.ncols();

        let mut per_source = BTreeMap::new();
        let mut syst = Matrix::zeros(k, k);
        let mut total_from_sources = Matrix::zeros(k, k);
        let mut syst_input = Matrix::zeros(n, n);
        for (key, entry) in covariances.iter() {
            let result = w * &entry.covariance * &wt;
            total_from_sources += &result;
            if !config.is_statistical(key.name()) {
                syst += &result;
                syst_input += &entry.covariance;
            }
            per_source.insert(key.clone(), result);
        }

        Self {
            per_source,
            syst,
            syst_cov: w * syst_input * &wt,
            total_from_sources,
            total: w * covariances.sum_of_sources() * &wt,
            scaled_total: w * covariances.total() * &wt,
        }
    }

    /// Error matrix of one source.
    pub fn source(&self, key: &str) -> Option<&Matrix> {
        self.per_source.get(key)
    }

    /// Per-group errors of one source (square root of the diagonal).
    pub fn source_errors(&self, key: &str) -> Option<Vector> {
        self.per_source.get(key).map(diagonal_errors)
    }

    /// Error matrices in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&SourceKey, &Matrix)> {
        self.per_source.iter()
    }

    /// Sum of the non-statistical per-source matrices.
    pub fn syst(&self) -> &Matrix {
        &self.syst
    }

    /// Per-group systematic errors.
    pub fn syst_errors(&self) -> Vector {
        diagonal_errors(&self.syst)
    }

    /// `W · (Σ_syst C_s) · Wᵀ`. Agrees with [`syst`](Self::syst) up to rounding.
    pub fn syst_cov(&self) -> &Matrix {
        &self.syst_cov
    }

    /// Sum of all per-source matrices.
    pub fn total_from_sources(&self) -> &Matrix {
        &self.total_from_sources
    }

    /// `W · (Σ_s C_s) · Wᵀ` as a single product. Agrees with
    /// [`total_from_sources`](Self::total_from_sources) up to rounding.
    pub fn total(&self) -> &Matrix {
        &self.total
    }

    /// `W · V · Wᵀ`, with V the total covariance used by the combination.
    ///
    /// Differs from [`total`](Self::total) only when the model sets a
    /// correlation factor.
    pub fn scaled_total(&self) -> &Matrix {
        &self.scaled_total
    }

    /// Per-group total errors.
    pub fn total_errors(&self) -> Vector {
        diagonal_errors(&self.total)
    }

    /// Correlations between the combined estimates.
    pub fn correlations(&self) -> Matrix {
        correlation_matrix(&self.total)
    }
}

fn diagonal_errors(matrix: &Matrix) -> Vector {
    matrix.diagonal().map(|v| v.max(0.0).sqrt())
}

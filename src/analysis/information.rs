//! Information analysis and precision shares.
//!
//! Diagnostics only: nothing here feeds back into the estimate.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::combination::Blue;
use crate::covariance::CovarianceSet;
use crate::model::{DataModel, SourceKey};
use crate::types::{Matrix, Vector};

use super::errors::ErrorBreakdown;

/// Pairwise information contributions of each source to a single average.
///
/// With weights w and total information `I = 1 / (w · ΣC_s · wᵀ)`, the
/// contribution of source s to pair (i, j) is `−2 · I · w_i · w_j · C_s[i,j]`.
/// The diagonal uses the same formula; summed over every element and source
/// the contributions give −2.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InformationAnalysis {
    information: f64,
    per_source: BTreeMap<SourceKey, Matrix>,
    offdiagonal_sums: BTreeMap<SourceKey, f64>,
    total: Matrix,
}

impl InformationAnalysis {
    /// Returns `None` when more than one average is combined.
    pub fn compute(blue: &Blue, covariances: &CovarianceSet) -> Option<Self> {
        let weights = blue.weights();
        if weights.nrows() != 1 {
            return None;
        }
        let w = weights.row(0);
        let n = w.len();
        let variance = (w * covariances.sum_of_sources() * w.transpose())[(0, 0)];
        let information = 1.0 / variance;

        let mut per_source = BTreeMap::new();
        let mut offdiagonal_sums = BTreeMap::new();
        let mut total = Matrix::zeros(n, n);
        for (key, entry) in covariances.iter() {
            let info = Matrix::from_fn(n, n, |i, j| -2.0 * information * w[i] * w[j] * entry.covariance[(i, j)]);
            let sum: f64 = (0..n).flat_map(|i| ((i + 1)..n).map(move |j| (i, j))).map(|ij| info[ij]).sum();
            total += &info;
            offdiagonal_sums.insert(key.clone(), sum);
            per_source.insert(key.clone(), info);
        }

        Some(Self {
            information,
            per_source,
            offdiagonal_sums,
            total,
        })
    }

    /// Total information `1 / σ²`.
    pub fn information(&self) -> f64 {
        self.information
    }

    /// Pairwise contributions of one source.
    pub fn source(&self, key: &str) -> Option<&Matrix> {
        self.per_source.get(key)
    }

    /// Sum over pairs i < j for one source.
    pub fn offdiagonal_sum(&self, key: &str) -> Option<f64> {
        self.offdiagonal_sums.get(key).copied()
    }

    /// Off-diagonal sums of all sources in key order.
    pub fn offdiagonal_sums(&self) -> &BTreeMap<SourceKey, f64> {
        &self.offdiagonal_sums
    }

    /// Sum of the per-source matrices.
    pub fn total(&self) -> &Matrix {
        &self.total
    }
}

/// Intrinsic precision share of each measurement in each average:
/// `σ²_a / totalError_i²`, with the remainder `1 − Σ_i` per average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecisionShares {
    shares: Matrix,
    remainder: Vector,
}

impl PrecisionShares {
    /// Shares from the combined total error matrix.
    pub fn compute(model: &DataModel, breakdown: &ErrorBreakdown) -> Self {
        let total = breakdown.total();
        let errors = model.total_errors();
        let k = total.nrows();
        let shares = Matrix::from_fn(k, errors.len(), |a, i| total[(a, a)] / (errors[i] * errors[i]));
        let remainder = Vector::from_iterator(k, shares.row_iter().map(|row| 1.0 - row.sum()));
        Self { shares, remainder }
    }

    /// k×n share matrix.
    pub fn shares(&self) -> &Matrix {
        &self.shares
    }

    /// Share of measurement `i` in average `a`.
    pub fn share(&self, a: usize, i: usize) -> f64 {
        self.shares[(a, i)]
    }

    /// `1 − Σ_i share` per average; negative when correlations help.
    pub fn remainder(&self) -> &Vector {
        &self.remainder
    }
}

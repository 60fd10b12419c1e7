//! Combination Engine: generalised least squares over the total covariance.
//!
//! Given the total covariance V, the group matrix G and the values v:
//!
//! ```text
//! W  = (Gᵀ V⁻¹ G)⁻¹ Gᵀ V⁻¹
//! a  = W v
//! χ² = (v − G a)ᵀ V⁻¹ (v − G a),   ndof = n − k
//! ```

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::covariance::CovarianceSet;
use crate::error::{Result, Stage};
use crate::model::DataModel;
use crate::statistics::{chi2_probability, invert_spd};
use crate::types::{Matrix, Vector};

/// GLS weight matrix and the inverse of `covariance`.
///
/// Both inversions go through Cholesky; a singular input fails with a
/// numerical error for `subject` at `stage`. No pseudo-inverse is tried.
pub(crate) fn gls_weights(
    covariance: &Matrix,
    groups: &Matrix,
    tolerance: f64,
    stage: Stage,
    subject: &str,
) -> Result<(Matrix, Matrix)> {
    let inverse = invert_spd(covariance, tolerance, stage, subject)?;
    let gt_vinv = groups.transpose() * &inverse;
    let fisher = &gt_vinv * groups;
    let fisher_inv = invert_spd(&fisher, tolerance, stage, subject)?;
    Ok((fisher_inv * gt_vinv, inverse))
}

/// Result of a BLUE combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Blue {
    weights: Matrix,
    averages: Vector,
    residuals: Vector,
    pulls: Vector,
    chisq: f64,
    ndof: usize,
    #[serde(skip)]
    inverse_covariance: Matrix,
}

impl Blue {
    /// Combine the model's values with the set's total covariance.
    ///
    /// The total is validated (finite, non-negative variances, positive
    /// semi-definite) before inversion.
    pub fn compute(model: &DataModel, covariances: &CovarianceSet, config: &Config) -> Result<Self> {
        covariances.validate(config)?;

        let groups = model.group_matrix().matrix();
        let values = model.values();
        let (weights, inverse_covariance) = gls_weights(
            covariances.total(),
            groups,
            config.singularity_tolerance,
            Stage::Combine,
            "total covariance",
        )?;

        let averages = &weights * values;
        let residuals = values - groups * &averages;
        let chisq = residuals.dot(&(&inverse_covariance * &residuals));
        let ndof = model.len().saturating_sub(groups.ncols());
        let pulls = residuals.component_div(model.total_errors());

        info!(
            averages = ?averages.as_slice(),
            chisq,
            ndof,
            "combined {} measurements",
            model.len()
        );

        Ok(Self {
            weights,
            averages,
            residuals,
            pulls,
            chisq,
            ndof,
            inverse_covariance,
        })
    }

    /// k×n weight matrix.
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    /// Weight of measurement `i` in average `a`.
    pub fn weight(&self, a: usize, i: usize) -> f64 {
        self.weights[(a, i)]
    }

    /// Combined estimates, one per group in label order.
    pub fn averages(&self) -> &Vector {
        &self.averages
    }

    /// `v − G a`.
    pub fn residuals(&self) -> &Vector {
        &self.residuals
    }

    /// Residuals divided by each measurement's quadrature total error.
    pub fn pulls(&self) -> &Vector {
        &self.pulls
    }

    /// Chi-square of the combination.
    pub fn chisq(&self) -> f64 {
        self.chisq
    }

    /// Degrees of freedom, n − k.
    pub fn ndof(&self) -> usize {
        self.ndof
    }

    /// Probability of a chi-square at least as large; `None` with no degrees
    /// of freedom.
    pub fn chisq_probability(&self) -> Option<f64> {
        (self.ndof > 0).then(|| chi2_probability(self.chisq, self.ndof))
    }

    /// Inverse of the total covariance.
    pub fn inverse_covariance(&self) -> &Matrix {
        &self.inverse_covariance
    }
}

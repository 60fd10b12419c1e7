//! Linear least squares with explicit pseudo-parameters for correlated
//! systematics.
//!
//! Each correlated component becomes a unit-Gaussian nuisance parameter p_s
//! that shifts the measurements by its systematic error vector:
//!
//! ```text
//! χ²(a, p) = (v − G a + S p)ᵀ R⁻¹ (v − G a + S p) + pᵀ p
//! ```
//!
//! with R the reduced total covariance. The problem is linear, so it is
//! solved in closed form through the normal equations of `X = [G | −S]`.

use tracing::debug;

use crate::config::Config;
use crate::covariance::rules::correlated_row_patterns;
use crate::covariance::CovarianceSet;
use crate::error::{ConfigErrorKind, Error, Result, Stage};
use crate::model::{ConstraintForm, Correlation, DataModel};
use crate::statistics::invert_spd;
use crate::types::{Matrix, Vector};

use super::Solver;

/// Solution of a pseudo-parameter fit.
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoFit {
    names: Vec<String>,
    values: Vector,
    covariance: Matrix,
    weights: Matrix,
    chisq: f64,
    n_averages: usize,
}

impl PseudoFit {
    /// Fitted averages.
    pub fn averages(&self) -> Vector {
        self.values.rows(0, self.n_averages).into_owned()
    }

    /// Fitted pseudo-parameters, in source key order.
    pub fn pseudo_parameters(&self) -> Vector {
        let m = self.values.len() - self.n_averages;
        self.values.rows(self.n_averages, m).into_owned()
    }

    /// Covariance of all parameters.
    pub fn covariance(&self) -> &Matrix {
        &self.covariance
    }

    /// k×n linear weights of the averages in the measurements.
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }
}

/// Pseudo-parameter backend.
///
/// Only additive constraints are supported; a multiplicative source needs a
/// nonlinear minimiser. The global correlation factor is not applied, since
/// the fit works on the reduced covariance and explicit systematics.
#[derive(Debug, Clone)]
pub struct PseudoParameterFit<'a> {
    model: &'a DataModel,
    covariances: &'a CovarianceSet,
    config: &'a Config,
    fit: Option<PseudoFit>,
}

impl<'a> PseudoParameterFit<'a> {
    /// Fit over a model and its covariance snapshot.
    pub fn new(model: &'a DataModel, covariances: &'a CovarianceSet, config: &'a Config) -> Self {
        Self {
            model,
            covariances,
            config,
            fit: None,
        }
    }

    /// The solution, once solved.
    pub fn fit(&self) -> Option<&PseudoFit> {
        self.fit.as_ref()
    }

    /// Names and n-vectors of the pseudo-parameter shifts.
    ///
    /// One column per source with a systematic vector. A per-cell source gets
    /// one column per distinct pattern of correlated cells.
    fn shifts(&self) -> Result<Vec<(String, Vector)>> {
        let n = self.model.len();
        let mut shifts = Vec::new();
        for source in self.model.sources() {
            if source.constraint_form() == ConstraintForm::Multiplicative {
                return Err(Error::config(
                    source.key().as_str(),
                    ConfigErrorKind::UnsupportedConstraintForm,
                ));
            }
            let Some(systematic) = self.covariances.systematic_errors(source.key().as_str()) else {
                continue;
            };

            match source.correlation() {
                Correlation::PerCell { cells } => {
                    let (assignment, count) = correlated_row_patterns(cells);
                    for pattern in 0..count {
                        let column = Vector::from_iterator(
                            n,
                            (0..n).map(|i| {
                                if assignment[i] == Some(pattern) {
                                    systematic[i]
                                } else {
                                    0.0
                                }
                            }),
                        );
                        let name = if count == 1 {
                            source.name().to_string()
                        } else {
                            format!("{}_{}", source.name(), pattern + 1)
                        };
                        shifts.push((name, column));
                    }
                }
                _ => shifts.push((source.name().to_string(), systematic.clone())),
            }
        }
        Ok(shifts)
    }
}

impl Solver for PseudoParameterFit<'_> {
    fn solve(&mut self) -> Result<()> {
        let groups = self.model.group_matrix().matrix();
        let (n, k) = groups.shape();
        let shifts = self.shifts()?;
        let m = shifts.len();
        let tolerance = self.config.singularity_tolerance;

        let mut design = Matrix::zeros(n, k + m);
        design.columns_mut(0, k).copy_from(groups);
        for (s, (_, column)) in shifts.iter().enumerate() {
            design.set_column(k + s, &(-column));
        }

        let reduced_inv = invert_spd(
            self.covariances.reduced_total(),
            tolerance,
            Stage::Combine,
            "reduced covariance",
        )?;
        let xt_rinv = design.transpose() * &reduced_inv;
        let mut hessian = &xt_rinv * &design;
        for s in 0..m {
            hessian[(k + s, k + s)] += 1.0;
        }
        let covariance = invert_spd(&hessian, tolerance, Stage::Combine, "pseudo-parameter fit")?;

        let linear = &covariance * &xt_rinv;
        let values = &linear * self.model.values();
        let residuals = self.model.values() - &design * &values;
        let pulls = values.rows(k, m);
        let chisq = residuals.dot(&(&reduced_inv * &residuals)) + pulls.dot(&pulls);

        debug!(pseudo_parameters = m, chisq, "pseudo-parameter fit solved");

        let mut names = self.model.group_matrix().labels().to_vec();
        names.extend(shifts.into_iter().map(|(name, _)| name));
        self.fit = Some(PseudoFit {
            names,
            weights: linear.rows(0, k).into_owned(),
            values,
            covariance,
            chisq,
            n_averages: k,
        });
        Ok(())
    }

    fn parameter_names(&self) -> Vec<String> {
        match &self.fit {
            Some(fit) => fit.names.clone(),
            None => self.model.group_matrix().labels().to_vec(),
        }
    }

    fn parameters(&self) -> Option<Vector> {
        self.fit.as_ref().map(|fit| fit.values.clone())
    }

    fn parameter_errors(&self) -> Option<Vector> {
        self.fit
            .as_ref()
            .map(|fit| fit.covariance.diagonal().map(|v| v.max(0.0).sqrt()))
    }

    fn chisq(&self) -> Option<f64> {
        self.fit.as_ref().map(|fit| fit.chisq)
    }

    fn ndof(&self) -> usize {
        self.model.len().saturating_sub(self.model.group_matrix().n_groups())
    }
}

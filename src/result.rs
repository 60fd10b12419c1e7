//! Combination result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Complete, serialisable result of one combination.
///
/// Values and errors are in working space: when the model was combined in
/// log space, `averages` are logarithms and errors are relative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Measurement names in input order.
    pub measurements: Vec<String>,

    /// Group labels, one per average.
    pub groups: Vec<String>,

    /// Combined estimates.
    pub averages: Vec<f64>,

    /// Total error of each average, from `W · V · Wᵀ`.
    pub total_errors: Vec<f64>,

    /// Systematic error of each average (statistical sources excluded).
    pub syst_errors: Vec<f64>,

    /// Error of each average by source key.
    pub source_errors: BTreeMap<String, Vec<f64>>,

    /// Correlations between the averages (k×k, row-major rows).
    pub correlations: Vec<Vec<f64>>,

    /// Weight of each measurement in each average (k rows of n).
    pub weights: Vec<Vec<f64>>,

    /// Chi-square of the combination.
    pub chisq: f64,

    /// Degrees of freedom, measurements minus averages.
    pub ndof: usize,

    /// Probability of a larger chi-square; absent without degrees of freedom.
    pub chisq_probability: Option<f64>,

    /// Residual over total error, per measurement.
    pub pulls: Vec<f64>,

    /// Information analysis; only for a single average.
    pub information: Option<InformationSummary>,

    /// Intrinsic precision share of each measurement (k rows of n).
    pub precision_shares: Vec<Vec<f64>>,

    /// One minus the sum of the precision shares, per average.
    pub precision_remainder: Vec<f64>,

    /// Whether the combination ran in log space.
    pub log_transform: bool,
}

impl Summary {
    /// Averages transformed back to the measured scale.
    pub fn physical_averages(&self) -> Vec<f64> {
        if self.log_transform {
            self.averages.iter().map(|a| a.exp()).collect()
        } else {
            self.averages.clone()
        }
    }

    /// Total errors on the measured scale.
    pub fn physical_errors(&self) -> Vec<f64> {
        if self.log_transform {
            self.physical_averages()
                .iter()
                .zip(&self.total_errors)
                .map(|(a, e)| a * e)
                .collect()
        } else {
            self.total_errors.clone()
        }
    }
}

/// Serialisable part of an information analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InformationSummary {
    /// Total information, one over the combined variance.
    pub information: f64,

    /// Sum of pairwise information contributions, by source key.
    pub offdiagonal_sums: BTreeMap<String, f64>,

    /// Pairwise contributions summed over sources (n×n rows).
    pub total: Vec<Vec<f64>>,
}

/// One point of a correlation scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    /// Interpolation step: 0 for the minimum rule, 1 for full correlation.
    pub step: f64,

    /// Combined estimates at this step.
    pub averages: Vec<f64>,

    /// Total errors at this step.
    pub total_errors: Vec<f64>,

    /// Chi-square at this step.
    pub chisq: f64,
}

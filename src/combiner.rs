//! Main `Combiner` entry point.

use tracing::info;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::analysis::{ErrorBreakdown, InformationAnalysis, PrecisionShares};
use crate::combination::Blue;
use crate::config::Config;
use crate::covariance::CovarianceSet;
use crate::error::Result;
use crate::model::{Correlation, DataModel};
use crate::result::{InformationSummary, ScanPoint, Summary};
use crate::types::Matrix;

/// Main entry point: build covariances, combine and analyse.
///
/// # Example
///
/// ```
/// use blue_average::{Combiner, Correlation, DataModel, ErrorSource};
///
/// let model = DataModel::builder()
///     .measurement("A", 10.0)
///     .measurement("B", 13.0)
///     .source(ErrorSource::new("00stat", vec![1.0, 2.0], Correlation::Uncorrelated))
///     .build()?;
///
/// let summary = Combiner::new().combine(&model)?;
/// assert!((summary.averages[0] - 10.6).abs() < 1e-12);
/// # Ok::<(), blue_average::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Combiner {
    config: Config,
}

/// Every intermediate result of one combination.
#[derive(Debug, Clone)]
pub struct Combination {
    /// Covariance snapshot the combination used.
    pub covariances: CovarianceSet,
    /// Weights, averages and goodness of fit.
    pub blue: Blue,
    /// Error decomposition.
    pub errors: ErrorBreakdown,
    /// Information analysis, for a single average.
    pub information: Option<InformationAnalysis>,
    /// Precision shares.
    pub shares: PrecisionShares,
}

impl Combiner {
    /// Combiner with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Combiner with an explicit configuration.
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Tight tolerances.
    pub fn strict() -> Self {
        Self::with_config(Config::strict())
    }

    /// Loose tolerances for nearly degenerate inputs.
    pub fn lenient() -> Self {
        Self::with_config(Config::lenient())
    }

    /// Substring marking statistical sources.
    pub fn stat_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.stat_marker = marker.into();
        self
    }

    /// Relative pivot below which a matrix counts as singular.
    pub fn singularity_tolerance(mut self, tolerance: f64) -> Self {
        self.config.singularity_tolerance = tolerance;
        self
    }

    /// Relative eigenvalue below which the total is not positive semi-definite.
    pub fn psd_tolerance(mut self, tolerance: f64) -> Self {
        self.config.psd_tolerance = tolerance;
        self
    }

    /// Allowed asymmetry of explicit matrices.
    pub fn symmetry_tolerance(mut self, tolerance: f64) -> Self {
        self.config.symmetry_tolerance = tolerance;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the covariance snapshot of a model.
    pub fn covariances(&self, model: &DataModel) -> Result<CovarianceSet> {
        CovarianceSet::build(model, &self.config)
    }

    /// Run every stage and keep the intermediate results.
    pub fn run(&self, model: &DataModel) -> Result<Combination> {
        let covariances = self.covariances(model)?;
        self.run_with(model, covariances)
    }

    /// Combine with a given covariance snapshot.
    pub fn run_with(&self, model: &DataModel, covariances: CovarianceSet) -> Result<Combination> {
        let blue = Blue::compute(model, &covariances, &self.config)?;
        let errors = ErrorBreakdown::compute(&blue, &covariances, &self.config);
        let information = InformationAnalysis::compute(&blue, &covariances);
        let shares = PrecisionShares::compute(model, &errors);
        Ok(Combination {
            covariances,
            blue,
            errors,
            information,
            shares,
        })
    }

    /// Combine a model and summarise the result.
    pub fn combine(&self, model: &DataModel) -> Result<Summary> {
        let combination = self.run(model)?;
        Ok(combination.summary(model))
    }

    /// Combine with one source re-declared, leaving the model as it is.
    pub fn what_if(&self, model: &DataModel, key: &str, correlation: Correlation) -> Result<Summary> {
        let base = self.covariances(model)?;
        let altered = base.what_if(model, key, correlation, &self.config)?;
        Ok(self.run_with(model, altered)?.summary(model))
    }

    /// Combine at each step between the minimum rule and full correlation
    /// for every fully or partially correlated component.
    pub fn scan_correlations(&self, model: &DataModel, steps: &[f64]) -> Result<Vec<ScanPoint>> {
        let base = self.covariances(model)?;
        info!(points = steps.len(), "scanning correlations");

        let point = |&step: &f64| -> Result<ScanPoint> {
            let scanned = base.scan_partial_to_full(model, step)?;
            let blue = Blue::compute(model, &scanned, &self.config)?;
            let errors = ErrorBreakdown::compute(&blue, &scanned, &self.config);
            Ok(ScanPoint {
                step,
                averages: blue.averages().iter().copied().collect(),
                total_errors: errors.total_errors().iter().copied().collect(),
                chisq: blue.chisq(),
            })
        };

        #[cfg(feature = "parallel")]
        let points = steps.par_iter().map(point).collect();
        #[cfg(not(feature = "parallel"))]
        let points = steps.iter().map(point).collect();
        points
    }
}

impl Combination {
    /// Serialisable summary.
    pub fn summary(&self, model: &DataModel) -> Summary {
        let errors = &self.errors;
        Summary {
            measurements: model.names().into_iter().map(str::to_string).collect(),
            groups: model.group_matrix().labels().to_vec(),
            averages: self.blue.averages().iter().copied().collect(),
            total_errors: errors.total_errors().iter().copied().collect(),
            syst_errors: errors.syst_errors().iter().copied().collect(),
            source_errors: errors
                .iter()
                .map(|(key, m)| (key.to_string(), m.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect()))
                .collect(),
            correlations: rows(&errors.correlations()),
            weights: rows(self.blue.weights()),
            chisq: self.blue.chisq(),
            ndof: self.blue.ndof(),
            chisq_probability: self.blue.chisq_probability(),
            pulls: self.blue.pulls().iter().copied().collect(),
            information: self.information.as_ref().map(|info| InformationSummary {
                information: info.information(),
                offdiagonal_sums: info
                    .offdiagonal_sums()
                    .iter()
                    .map(|(key, sum)| (key.to_string(), *sum))
                    .collect(),
                total: rows(info.total()),
            }),
            precision_shares: rows(self.shares.shares()),
            precision_remainder: self.shares.remainder().iter().copied().collect(),
            log_transform: model.globals().log_transform,
        }
    }
}

fn rows(matrix: &Matrix) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

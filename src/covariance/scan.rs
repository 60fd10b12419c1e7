//! Sensitivity studies on covariance snapshots.
//!
//! Every operation here takes the canonical set by shared reference, copies
//! its per-source map, changes the copy and re-aggregates.

use tracing::debug;

use crate::config::Config;
use crate::error::{ConfigErrorKind, Error, Result};
use crate::model::{CellCorrelation, Correlation, DataModel};
use crate::types::Vector;

use super::set::{apply_reweights, build_entry, CovarianceSet};

impl CovarianceSet {
    /// Interpolate every fully and partially correlated component between the
    /// minimum rule (`step = 0`) and full correlation (`step = 1`).
    ///
    /// Off-diagonal elements of `f` / `p` sources and of `f` / `p` cells of
    /// per-cell sources become `min(e_i,e_j)² + (e_i·e_j − min(e_i,e_j)²)·step`.
    /// All other elements keep their value. Reduced parts follow the original
    /// rule: zero for fully correlated, equal to the covariance for partial.
    pub fn scan_partial_to_full(&self, model: &DataModel, step: f64) -> Result<CovarianceSet> {
        if !step.is_finite() {
            return Err(Error::config("scan", ConfigErrorKind::InvalidScanStep(step)));
        }

        let mut sources = self.entries().clone();
        let n = model.len();
        for source in model.sources() {
            let key = source.key();
            let Some(entry) = sources.get_mut(key.as_str()) else {
                continue;
            };
            let errors = match (&entry.systematic, source.correlation()) {
                // fq sources scan around their corrected errors.
                (Some(corrected), Correlation::FullyCorrelated { reweight: true }) => corrected.clone(),
                _ => model
                    .errors(key.as_str())
                    .cloned()
                    .ok_or_else(|| Error::config(key.as_str(), ConfigErrorKind::UnknownSource))?,
            };

            let rule_at = |i: usize, j: usize| -> Option<CellCorrelation> {
                match source.correlation() {
                    Correlation::PerCell { cells } => Some(cells[(i, j)]),
                    other => other.as_cell(),
                }
            };

            let mut touched = false;
            for i in 0..n {
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let rule = rule_at(i, j);
                    if !matches!(
                        rule,
                        Some(CellCorrelation::FullyCorrelated | CellCorrelation::PartiallyCorrelated)
                    ) {
                        continue;
                    }
                    let value = interpolate(&errors, i, j, step);
                    entry.covariance[(i, j)] = value;
                    entry.reduced[(i, j)] = if rule == Some(CellCorrelation::PartiallyCorrelated) {
                        value
                    } else {
                        0.0
                    };
                    touched = true;
                }
            }
            if touched {
                debug!(source = %key, step, "scanned source correlation");
            }
        }

        Ok(CovarianceSet::aggregate(model, sources))
    }

    /// Rebuild the set with one source declared under a different
    /// correlation. The receiver is left untouched.
    pub fn what_if(
        &self,
        model: &DataModel,
        key: &str,
        correlation: Correlation,
        config: &Config,
    ) -> Result<CovarianceSet> {
        let altered = model.with_correlation(key, correlation)?;
        let source = altered
            .source(key)
            .ok_or_else(|| Error::config(key, ConfigErrorKind::UnknownSource))?;

        let mut sources = self.entries().clone();
        sources.insert(source.key().clone(), build_entry(&altered, source, config)?);
        apply_reweights(&altered, &mut sources, config)?;
        debug!(source = key, rule = %source.correlation().code(), "what-if covariance built");
        Ok(CovarianceSet::aggregate(&altered, sources))
    }
}

fn interpolate(errors: &Vector, i: usize, j: usize, step: f64) -> f64 {
    let min = errors[i].min(errors[j]);
    let min_sq = min * min;
    min_sq + (errors[i] * errors[j] - min_sq) * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ErrorSource;
    use crate::types::Matrix;

    fn model() -> DataModel {
        DataModel::builder()
            .measurement("A", 10.0)
            .measurement("B", 11.0)
            .source(ErrorSource::new("00stat", vec![0.5, 0.5], Correlation::Uncorrelated))
            .source(ErrorSource::new("01syst", vec![1.0, 2.0], Correlation::PartiallyCorrelated))
            .build()
            .unwrap()
    }

    #[test]
    fn test_scan_endpoints() {
        let model = model();
        let set = CovarianceSet::build(&model, &Config::default()).unwrap();

        let partial = set.scan_partial_to_full(&model, 0.0).unwrap();
        assert_eq!(partial.covariance("01syst"), set.covariance("01syst"));

        let full = set.scan_partial_to_full(&model, 1.0).unwrap();
        assert!((full.covariance("01syst").unwrap()[(0, 1)] - 2.0).abs() < 1e-12);
        assert!((full.total()[(0, 1)] - 2.0).abs() < 1e-12);
        // Diagonal and uncorrelated sources untouched.
        assert_eq!(full.covariance("00stat"), set.covariance("00stat"));
        assert_eq!(full.total()[(1, 1)], set.total()[(1, 1)]);

        let half = set.scan_partial_to_full(&model, 0.5).unwrap();
        assert!((half.covariance("01syst").unwrap()[(1, 0)] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_scan_leaves_receiver_untouched() {
        let model = model();
        let set = CovarianceSet::build(&model, &Config::default()).unwrap();
        let before = set.clone();
        let _ = set.scan_partial_to_full(&model, 1.0).unwrap();
        assert_eq!(set, before);
    }

    #[test]
    fn test_scan_rejects_non_finite_step() {
        let model = model();
        let set = CovarianceSet::build(&model, &Config::default()).unwrap();
        assert!(set.scan_partial_to_full(&model, f64::NAN).is_err());
    }

    #[test]
    fn test_what_if_replaces_one_source() {
        let model = model();
        let config = Config::default();
        let set = CovarianceSet::build(&model, &config).unwrap();
        let changed = set.what_if(&model, "01syst", Correlation::fully(), &config).unwrap();

        assert!((changed.covariance("01syst").unwrap()[(0, 1)] - 2.0).abs() < 1e-12);
        assert_eq!(changed.reduced("01syst"), Some(&Matrix::zeros(2, 2)));
        assert_eq!(changed.covariance("00stat"), set.covariance("00stat"));
        assert!((set.covariance("01syst").unwrap()[(0, 1)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_what_if_unknown_source() {
        let model = model();
        let config = Config::default();
        let set = CovarianceSet::build(&model, &config).unwrap();
        let err = set.what_if(&model, "09none", Correlation::fully(), &config).unwrap_err();
        assert_eq!(err, Error::config("09none", ConfigErrorKind::UnknownSource));
    }
}

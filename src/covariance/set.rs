//! Aggregated covariance matrices for a whole data model.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ConfigErrorKind, Error, Result, Stage};
use crate::model::{Correlation, DataModel, ErrorSource, SourceKey};
use crate::statistics::check_covariance;
use crate::types::{Matrix, Vector};

use super::reweight;
use super::rules;

/// Covariance contribution of one error source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCovariance {
    /// Full n×n covariance of the source.
    pub covariance: Matrix,
    /// The part not carried by a fully correlated component.
    pub reduced: Matrix,
    /// Per-measurement error treated as fully correlated, if the rule has one.
    pub systematic: Option<Vector>,
    /// Whether an fq reweight replaced the covariance.
    pub reweighted: bool,
}

/// Per-source, total and reduced-total covariances.
///
/// A set is never modified after construction. Scans and what-if studies
/// return a new set built from a copy of the per-source map.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceSet {
    sources: BTreeMap<SourceKey, SourceCovariance>,
    total: Matrix,
    reduced_total: Matrix,
}

impl CovarianceSet {
    /// Build every source's covariance and aggregate them.
    pub fn build(model: &DataModel, config: &Config) -> Result<Self> {
        let mut sources = BTreeMap::new();
        for source in model.sources() {
            let entry = build_entry(model, source, config)?;
            sources.insert(source.key().clone(), entry);
        }
        apply_reweights(model, &mut sources, config)?;
        Ok(Self::aggregate(model, sources))
    }

    /// Sum per-source matrices into the totals. The global correlation factor
    /// scales the off-diagonal elements of the total only.
    pub(super) fn aggregate(model: &DataModel, sources: BTreeMap<SourceKey, SourceCovariance>) -> Self {
        let n = model.len();
        let mut total = Matrix::zeros(n, n);
        let mut reduced_total = Matrix::zeros(n, n);
        for entry in sources.values() {
            total += &entry.covariance;
            reduced_total += &entry.reduced;
        }

        if let Some(factor) = model.globals().correlation_factor {
            debug!(factor, "scaling off-diagonal total covariance");
            for i in 0..n {
                for j in 0..n {
                    if i != j {
                        total[(i, j)] *= factor;
                    }
                }
            }
        }

        Self {
            sources,
            total,
            reduced_total,
        }
    }

    pub(super) fn entries(&self) -> &BTreeMap<SourceKey, SourceCovariance> {
        &self.sources
    }

    /// Contribution of one source.
    pub fn source(&self, key: &str) -> Option<&SourceCovariance> {
        self.sources.get(key)
    }

    /// Full covariance of one source.
    pub fn covariance(&self, key: &str) -> Option<&Matrix> {
        self.sources.get(key).map(|entry| &entry.covariance)
    }

    /// Reduced covariance of one source.
    pub fn reduced(&self, key: &str) -> Option<&Matrix> {
        self.sources.get(key).map(|entry| &entry.reduced)
    }

    /// Sources in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&SourceKey, &SourceCovariance)> {
        self.sources.iter()
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the set has no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Total covariance used by the combination.
    pub fn total(&self) -> &Matrix {
        &self.total
    }

    /// Sum of all reduced covariances.
    pub fn reduced_total(&self) -> &Matrix {
        &self.reduced_total
    }

    /// Plain sum of per-source covariances, before any correlation factor.
    pub fn sum_of_sources(&self) -> Matrix {
        let n = self.total.nrows();
        self.sources
            .values()
            .fold(Matrix::zeros(n, n), |acc, entry| acc + &entry.covariance)
    }

    /// Systematic error vector of one source.
    pub fn systematic_errors(&self, key: &str) -> Option<&Vector> {
        self.sources.get(key).and_then(|entry| entry.systematic.as_ref())
    }

    /// Systematic error vectors of every source that has one.
    pub fn systematic_error_vectors(&self) -> BTreeMap<&SourceKey, &Vector> {
        self.sources
            .iter()
            .filter_map(|(key, entry)| entry.systematic.as_ref().map(|s| (key, s)))
            .collect()
    }

    /// Check the total is finite, has non-negative variances and is
    /// positive semi-definite.
    pub fn validate(&self, config: &Config) -> Result<()> {
        check_covariance(&self.total, config.psd_tolerance, Stage::Combine, "total covariance")
    }
}

/// Rule matrices for one source, before any reweighting.
pub(super) fn build_entry(model: &DataModel, source: &ErrorSource, config: &Config) -> Result<SourceCovariance> {
    let key = source.key();
    check_symmetry(key, source.correlation(), config.symmetry_tolerance)?;

    let errors = model
        .errors(key.as_str())
        .ok_or_else(|| Error::config(key.as_str(), ConfigErrorKind::UnknownSource))?;
    let output = rules::build(source.correlation(), errors, model.values());

    if output.capped_pairs > 0 {
        warn!(source = %key, pairs = output.capped_pairs, "onionisation capped covariance elements");
    }
    if output.clamped > 0 {
        warn!(source = %key, count = output.clamped, "negative global-partial residual clamped to zero");
    }
    debug!(source = %key, rule = %source.correlation().code(), "built source covariance");

    Ok(SourceCovariance {
        covariance: output.covariance,
        reduced: output.reduced,
        systematic: output.systematic,
        reweighted: false,
    })
}

/// Replace the covariance of every `fq` source by the outer product of its
/// errors rescaled to a provisional average.
pub(super) fn apply_reweights(
    model: &DataModel,
    sources: &mut BTreeMap<SourceKey, SourceCovariance>,
    config: &Config,
) -> Result<()> {
    let reweighted: Vec<&ErrorSource> = model
        .sources()
        .filter(|s| matches!(s.correlation(), Correlation::FullyCorrelated { reweight: true }))
        .collect();
    if reweighted.is_empty() {
        return Ok(());
    }

    let n = model.len();
    let reduced_total = sources
        .values()
        .fold(Matrix::zeros(n, n), |acc, entry| acc + &entry.reduced);

    for source in reweighted {
        let key = source.key();
        let projected = reweight::provisional_projection(model, &reduced_total, config, key.as_str())?;
        let errors = model
            .errors(key.as_str())
            .ok_or_else(|| Error::config(key.as_str(), ConfigErrorKind::UnknownSource))?;
        let corrected = reweight::corrected_errors(key.as_str(), errors, model.values(), &projected)?;

        warn!(source = %key, "fq reweight replaced source covariance");
        sources.insert(
            key.clone(),
            SourceCovariance {
                covariance: &corrected * corrected.transpose(),
                reduced: Matrix::zeros(n, n),
                systematic: Some(corrected),
                reweighted: true,
            },
        );
    }
    Ok(())
}

fn check_symmetry(key: &SourceKey, correlation: &Correlation, tolerance: f64) -> Result<()> {
    let symmetric = match correlation {
        Correlation::Explicit { matrix, .. } => (matrix - matrix.transpose()).abs().max() <= tolerance,
        Correlation::PerCell { cells } => *cells == cells.transpose(),
        _ => true,
    };
    if symmetric {
        Ok(())
    } else {
        Err(Error::config(key.as_str(), ConfigErrorKind::AsymmetricMatrix))
    }
}

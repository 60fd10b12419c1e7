//! The immutable data model: measurements, error sources and groups.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigErrorKind, Error, Result};
use crate::types::Vector;

use super::declaration::{Correlation, Units};
use super::group::GroupMatrix;
use super::source::{ErrorSource, SourceKey};

/// Label of the implicit group used when no labels are given.
pub const DEFAULT_GROUP: &str = "Average";

/// One input measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Display name.
    pub name: String,
    /// Measured value, as given.
    pub value: f64,
    /// Label of the quantity this measurement estimates.
    pub group: String,
}

/// Options that apply to the whole input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Globals {
    /// Combine natural logs of the values, with relative errors.
    pub log_transform: bool,
    /// Scale every off-diagonal element of the total covariance by this factor.
    pub correlation_factor: Option<f64>,
}

/// Validated, immutable input to the covariance builder.
///
/// Besides the inputs as given, the model holds the *working* values and
/// errors every downstream stage uses: percentage magnitudes converted to
/// absolute ones and, in log-transform mode, values replaced by their
/// logarithm and errors by relative errors.
#[derive(Debug, Clone, PartialEq)]
pub struct DataModel {
    measurements: Vec<Measurement>,
    sources: BTreeMap<SourceKey, ErrorSource>,
    errors: BTreeMap<SourceKey, Vector>,
    values: Vector,
    total_errors: Vector,
    groups: GroupMatrix,
    globals: Globals,
}

impl DataModel {
    /// Start building a data model.
    pub fn builder() -> DataModelBuilder {
        DataModelBuilder::default()
    }

    /// Number of measurements.
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    /// Whether there are no measurements. Always false for a built model.
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Measurements in input order.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Measurement names in input order.
    pub fn names(&self) -> Vec<&str> {
        self.measurements.iter().map(|m| m.name.as_str()).collect()
    }

    /// Working values (log-transformed in log mode).
    pub fn values(&self) -> &Vector {
        &self.values
    }

    /// Error sources ordered by key.
    pub fn sources(&self) -> impl Iterator<Item = &ErrorSource> {
        self.sources.values()
    }

    /// Look up one source.
    pub fn source(&self, key: &str) -> Option<&ErrorSource> {
        self.sources.get(key)
    }

    /// Source keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &SourceKey> {
        self.sources.keys()
    }

    /// Working errors of one source: absolute, or relative in log mode.
    pub fn errors(&self, key: &str) -> Option<&Vector> {
        self.errors.get(key)
    }

    /// Per-measurement quadrature sum of all working errors.
    pub fn total_errors(&self) -> &Vector {
        &self.total_errors
    }

    /// Group assignment.
    pub fn group_matrix(&self) -> &GroupMatrix {
        &self.groups
    }

    /// Global options.
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Correlation declaration of every source, by key.
    pub fn correlations(&self) -> BTreeMap<&SourceKey, &Correlation> {
        self.sources
            .iter()
            .map(|(key, source)| (key, source.correlation()))
            .collect()
    }

    /// Relative uncertainties declared for sources, by key.
    pub fn relative_uncertainties(&self) -> BTreeMap<&SourceKey, f64> {
        self.sources
            .iter()
            .filter_map(|(key, source)| source.relative_uncertainty().map(|r| (key, r)))
            .collect()
    }

    /// Copy of this model with one source's declaration replaced.
    pub(crate) fn with_correlation(&self, key: &str, correlation: Correlation) -> Result<Self> {
        let source = self
            .sources
            .get(key)
            .ok_or_else(|| Error::config(key, ConfigErrorKind::UnknownSource))?;
        check_matrix_shape(source.key(), &correlation, self.len())?;

        let mut model = self.clone();
        let replaced = source.with_correlation(correlation);
        model.sources.insert(replaced.key().clone(), replaced);
        Ok(model)
    }
}

/// Method-chaining builder for [`DataModel`].
///
/// All validation happens in [`build`](Self::build); the chaining methods
/// never fail.
#[derive(Debug, Clone, Default)]
pub struct DataModelBuilder {
    measurements: Vec<Measurement>,
    sources: Vec<ErrorSource>,
    globals: Globals,
}

impl DataModelBuilder {
    /// Add a measurement in the implicit default group.
    pub fn measurement(self, name: impl Into<String>, value: f64) -> Self {
        self.grouped_measurement(name, value, DEFAULT_GROUP)
    }

    /// Add a measurement of the quantity labelled `group`.
    pub fn grouped_measurement(
        mut self,
        name: impl Into<String>,
        value: f64,
        group: impl Into<String>,
    ) -> Self {
        self.measurements.push(Measurement {
            name: name.into(),
            value,
            group: group.into(),
        });
        self
    }

    /// Add an error source.
    pub fn source(mut self, source: ErrorSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Combine in log space.
    pub fn log_transform(mut self, enabled: bool) -> Self {
        self.globals.log_transform = enabled;
        self
    }

    /// Global correlation factor applied to the total covariance.
    pub fn correlation_factor(mut self, factor: f64) -> Self {
        self.globals.correlation_factor = Some(factor);
        self
    }

    /// Replace all global options.
    pub fn globals(mut self, globals: Globals) -> Self {
        self.globals = globals;
        self
    }

    /// Validate and freeze the model.
    pub fn build(self) -> Result<DataModel> {
        let n = self.measurements.len();
        if n == 0 {
            return Err(Error::config("measurements", ConfigErrorKind::NoMeasurements));
        }

        let mut seen = BTreeSet::new();
        for m in &self.measurements {
            if !seen.insert(m.name.as_str()) {
                return Err(Error::config(&m.name, ConfigErrorKind::DuplicateKey));
            }
            if !m.value.is_finite() {
                return Err(Error::config(&m.name, ConfigErrorKind::InvalidValue { value: m.value }));
            }
            if self.globals.log_transform && m.value <= 0.0 {
                return Err(Error::config(
                    &m.name,
                    ConfigErrorKind::NonPositiveValue { value: m.value },
                ));
            }
        }

        if let Some(factor) = self.globals.correlation_factor {
            if !factor.is_finite() {
                return Err(Error::config(
                    "globals",
                    ConfigErrorKind::InvalidCorrelationFactor(factor),
                ));
            }
        }

        let raw_values: Vec<f64> = self.measurements.iter().map(|m| m.value).collect();

        let mut sources = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for source in self.sources {
            validate_source(&source, n)?;
            if self.globals.log_transform
                && matches!(source.correlation(), Correlation::FullyCorrelated { reweight: true })
            {
                return Err(Error::config(source.key().as_str(), ConfigErrorKind::ReweightInLogMode));
            }
            let working = working_errors(&source, &raw_values, self.globals.log_transform);
            let key = source.key().clone();
            if sources.insert(key.clone(), source).is_some() {
                return Err(Error::config(key.as_str(), ConfigErrorKind::DuplicateKey));
            }
            errors.insert(key, working);
        }

        let values = if self.globals.log_transform {
            Vector::from_iterator(n, raw_values.iter().map(|v| v.ln()))
        } else {
            Vector::from_vec(raw_values)
        };

        let total_errors = errors
            .values()
            .fold(Vector::zeros(n), |acc, e| acc + e.component_mul(e))
            .map(f64::sqrt);

        let labels: Vec<&str> = self.measurements.iter().map(|m| m.group.as_str()).collect();
        let groups = GroupMatrix::from_labels(&labels);

        Ok(DataModel {
            measurements: self.measurements,
            sources,
            errors,
            values,
            total_errors,
            groups,
            globals: self.globals,
        })
    }
}

fn validate_source(source: &ErrorSource, n: usize) -> Result<()> {
    let key = source.key().as_str();
    let magnitudes = source.magnitudes();
    if magnitudes.len() != n {
        return Err(Error::config(
            key,
            ConfigErrorKind::MagnitudeCount {
                found: magnitudes.len(),
                expected: n,
            },
        ));
    }
    if let Some((index, &value)) = magnitudes
        .iter()
        .enumerate()
        .find(|(_, e)| !e.is_finite() || **e < 0.0)
    {
        return Err(Error::config(key, ConfigErrorKind::InvalidMagnitude { index, value }));
    }
    check_matrix_shape(source.key(), source.correlation(), n)
}

fn check_matrix_shape(key: &SourceKey, correlation: &Correlation, n: usize) -> Result<()> {
    match correlation.matrix_dim() {
        Some((rows, cols)) if rows != n || cols != n => Err(Error::config(
            key.as_str(),
            ConfigErrorKind::MatrixShape {
                found: rows * cols,
                expected: n * n,
            },
        )),
        _ => Ok(()),
    }
}

fn working_errors(source: &ErrorSource, values: &[f64], log_transform: bool) -> Vector {
    let n = values.len();
    Vector::from_iterator(
        n,
        source.magnitudes().iter().zip(values).map(|(&e, &v)| {
            let absolute = match source.unit() {
                Units::Absolute => e,
                Units::Percent => e * v.abs() / 100.0,
            };
            if log_transform {
                absolute / v
            } else {
                absolute
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_measurements() -> DataModelBuilder {
        DataModel::builder()
            .measurement("A", 10.0)
            .measurement("B", 20.0)
    }

    #[test]
    fn test_total_errors_quadrature() {
        let model = two_measurements()
            .source(ErrorSource::new("00stat", vec![3.0, 1.0], Correlation::Uncorrelated))
            .source(ErrorSource::new("01syst", vec![4.0, 1.0], Correlation::fully()))
            .build()
            .unwrap();
        assert!((model.total_errors()[0] - 5.0).abs() < 1e-12);
        assert!((model.total_errors()[1] - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_percentage_magnitudes() {
        let model = two_measurements()
            .source(ErrorSource::new("00a", vec![10.0, 5.0], Correlation::Uncorrelated).percentage())
            .build()
            .unwrap();
        let errors = model.errors("00a").unwrap();
        assert!((errors[0] - 1.0).abs() < 1e-12);
        assert!((errors[1] - 1.0).abs() < 1e-12);
        // Raw magnitudes are kept as given.
        assert_eq!(model.source("00a").unwrap().magnitudes(), &[10.0, 5.0]);
    }

    #[test]
    fn test_log_transform() {
        let model = two_measurements()
            .log_transform(true)
            .source(ErrorSource::new("00a", vec![1.0, 4.0], Correlation::Uncorrelated))
            .build()
            .unwrap();
        assert!((model.values()[0] - 10f64.ln()).abs() < 1e-12);
        let errors = model.errors("00a").unwrap();
        assert!((errors[0] - 0.1).abs() < 1e-12);
        assert!((errors[1] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_log_transform_rejects_non_positive() {
        let err = DataModel::builder()
            .log_transform(true)
            .measurement("A", -1.0)
            .build()
            .unwrap_err();
        assert_eq!(err.key(), "A");
    }

    #[test]
    fn test_log_transform_rejects_reweight() {
        let err = two_measurements()
            .log_transform(true)
            .source(ErrorSource::new("01lumi", vec![0.5, 0.5], Correlation::FullyCorrelated { reweight: true }))
            .build()
            .unwrap_err();
        assert_eq!(err, Error::config("01lumi", ConfigErrorKind::ReweightInLogMode));
    }

    #[test]
    fn test_magnitude_count_checked() {
        let err = two_measurements()
            .source(ErrorSource::new("03err3", vec![1.0], Correlation::PartiallyCorrelated))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            Error::config("03err3", ConfigErrorKind::MagnitudeCount { found: 1, expected: 2 })
        );
    }

    #[test]
    fn test_negative_magnitude_rejected() {
        let err = two_measurements()
            .source(ErrorSource::new("00a", vec![1.0, -1.0], Correlation::Uncorrelated))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration { kind: ConfigErrorKind::InvalidMagnitude { index: 1, .. }, .. }
        ));
    }

    #[test]
    fn test_explicit_matrix_shape_checked() {
        let err = two_measurements()
            .source(ErrorSource::new(
                "00stat",
                vec![1.0, 1.0],
                Correlation::explicit(crate::types::Matrix::identity(3, 3)),
            ))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            Error::config("00stat", ConfigErrorKind::MatrixShape { found: 9, expected: 4 })
        );
    }

    #[test]
    fn test_duplicate_source_key() {
        let err = two_measurements()
            .source(ErrorSource::new("00a", vec![1.0, 1.0], Correlation::Uncorrelated))
            .source(ErrorSource::new("00a", vec![1.0, 1.0], Correlation::fully()))
            .build()
            .unwrap_err();
        assert_eq!(err, Error::config("00a", ConfigErrorKind::DuplicateKey));
    }

    #[test]
    fn test_no_measurements() {
        let err = DataModel::builder().build().unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration { kind: ConfigErrorKind::NoMeasurements, .. }
        ));
    }
}

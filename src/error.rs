//! Error types for model construction and combination.
//!
//! Every failure is fatal: no partial result is returned. Errors carry the
//! stage at which they occurred and the key of the offending source (or the
//! name of the offending measurement / matrix).

use std::fmt;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by every fallible operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Invalid or inconsistent input, detected while building the data model
    /// or the covariance set.
    #[error("configuration error for '{key}': {kind}")]
    Configuration {
        /// Source key, measurement name or input section that failed.
        key: String,
        /// What was wrong with it.
        kind: ConfigErrorKind,
    },

    /// A matrix that must be inverted (or be a valid covariance) is not.
    #[error("numerical error while {stage} ({subject}): {kind}")]
    Numerical {
        /// Pipeline stage that detected the problem.
        stage: Stage,
        /// Matrix or source the problem belongs to.
        subject: String,
        /// What went wrong.
        kind: NumericalErrorKind,
    },
}

impl Error {
    pub(crate) fn config(key: impl Into<String>, kind: ConfigErrorKind) -> Self {
        Error::Configuration {
            key: key.into(),
            kind,
        }
    }

    pub(crate) fn numerical(stage: Stage, subject: impl Into<String>, kind: NumericalErrorKind) -> Self {
        Error::Numerical {
            stage,
            subject: subject.into(),
            kind,
        }
    }

    /// Stage at which the error was raised.
    pub fn stage(&self) -> Stage {
        match self {
            Error::Configuration { .. } => Stage::Build,
            Error::Numerical { stage, .. } => *stage,
        }
    }

    /// Key or subject the error refers to.
    pub fn key(&self) -> &str {
        match self {
            Error::Configuration { key, .. } => key,
            Error::Numerical { subject, .. } => subject,
        }
    }
}

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Data model and covariance construction.
    Build,
    /// Weight computation and combination.
    Combine,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Build => write!(f, "building covariances"),
            Stage::Combine => write!(f, "combining"),
        }
    }
}

/// Reasons for [`Error::Configuration`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigErrorKind {
    /// The correlation code is empty.
    #[error("empty correlation code")]
    EmptyCode,
    /// The correlation code is not part of the grammar.
    #[error("unknown correlation code '{0}'")]
    UnknownCode(String),
    /// A modifier was attached to a rule it does not apply to.
    #[error("modifier '{modifier}' is not valid for correlation code '{code}'")]
    InvalidModifier {
        /// The offending modifier character.
        modifier: char,
        /// The full code it appeared in.
        code: String,
    },
    /// An explicit or per-cell source has no matrix.
    #[error("correlation matrix required but not given")]
    MissingMatrix,
    /// Matrix entry count is not the square of the measurement count.
    #[error("matrix has {found} entries, expected {expected}")]
    MatrixShape {
        /// Number of entries supplied.
        found: usize,
        /// Number of entries required (n²).
        expected: usize,
    },
    /// Matrix is not symmetric.
    #[error("matrix is not symmetric")]
    AsymmetricMatrix,
    /// A matrix token could not be interpreted.
    #[error("invalid matrix entry '{0}'")]
    InvalidMatrixEntry(String),
    /// Magnitude list length differs from the measurement count.
    #[error("{found} magnitudes given, expected {expected}")]
    MagnitudeCount {
        /// Number of magnitudes supplied.
        found: usize,
        /// Number of measurements.
        expected: usize,
    },
    /// A magnitude is negative or not finite.
    #[error("invalid magnitude {value} at position {index}")]
    InvalidMagnitude {
        /// Position in the magnitude list.
        index: usize,
        /// The rejected value.
        value: f64,
    },
    /// A measurement value is not finite.
    #[error("invalid value {value}")]
    InvalidValue {
        /// The rejected value.
        value: f64,
    },
    /// Log-transform mode requires strictly positive values.
    #[error("value {value} cannot be log-transformed")]
    NonPositiveValue {
        /// The rejected value.
        value: f64,
    },
    /// The fq reweight is meaningless in log-transform mode, where errors are
    /// already relative.
    #[error("fq reweight cannot be combined with log-transform mode")]
    ReweightInLogMode,
    /// No measurements were supplied.
    #[error("no measurements")]
    NoMeasurements,
    /// Two sources or measurements share a key.
    #[error("duplicate key")]
    DuplicateKey,
    /// Group label count differs from the measurement count.
    #[error("{found} group labels given, expected {expected}")]
    GroupCount {
        /// Number of labels supplied.
        found: usize,
        /// Number of measurements.
        expected: usize,
    },
    /// Correlation factor is not finite.
    #[error("invalid correlation factor {0}")]
    InvalidCorrelationFactor(f64),
    /// Scan step is not finite.
    #[error("invalid scan step {0}")]
    InvalidScanStep(f64),
    /// A referenced source does not exist.
    #[error("unknown error source")]
    UnknownSource,
    /// The solver cannot express this source's constraint form.
    #[error("constraint form not supported by this solver")]
    UnsupportedConstraintForm,
}

/// Reasons for [`Error::Numerical`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalErrorKind {
    /// Matrix is singular (or numerically indistinguishable from singular).
    #[error("matrix is not invertible")]
    Singular,
    /// Matrix has a significantly negative eigenvalue.
    #[error("matrix is not positive semi-definite (min eigenvalue {min_eigenvalue:.3e})")]
    NotPositiveSemiDefinite {
        /// Smallest eigenvalue found.
        min_eigenvalue: f64,
    },
    /// A diagonal element is negative.
    #[error("negative variance {value} at index {index}")]
    NegativeVariance {
        /// Diagonal index.
        index: usize,
        /// The negative variance.
        value: f64,
    },
    /// Matrix contains NaN or infinity.
    #[error("matrix contains non-finite entries")]
    NonFinite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_names_key() {
        let err = Error::config("03err3", ConfigErrorKind::UnknownCode("x".into()));
        assert_eq!(err.stage(), Stage::Build);
        assert_eq!(err.key(), "03err3");
        assert!(err.to_string().contains("03err3"));
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn test_numerical_error_display() {
        let err = Error::numerical(Stage::Combine, "total covariance", NumericalErrorKind::Singular);
        assert_eq!(err.stage(), Stage::Combine);
        assert_eq!(
            err.to_string(),
            "numerical error while combining (total covariance): matrix is not invertible"
        );
    }
}

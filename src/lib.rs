//! # blue-average
//!
//! Combine correlated measurements with the Best Linear Unbiased Estimator.
//!
//! Each measurement carries several named error sources. Every source
//! declares how it is correlated across measurements (uncorrelated, fully,
//! anti, partially with the minimum rule, globally partial, an explicit
//! coefficient matrix, or one rule per matrix cell). From these the crate
//! builds per-source covariance matrices and combines the measurements by
//! generalised least squares, outputting:
//! - The combined estimate of each group of measurements
//! - Each source's contribution to the combined uncertainty
//! - Chi-square, its probability and per-measurement pulls
//! - Information and precision-share diagnostics
//!
//! ## Quick Start
//!
//! ```
//! use blue_average::{Combiner, Correlation, DataModel, ErrorSource};
//!
//! let model = DataModel::builder()
//!     .measurement("Val1", 171.5)
//!     .measurement("Val2", 173.1)
//!     .source(ErrorSource::new("00stat", vec![0.3, 0.33], Correlation::Uncorrelated))
//!     .source(ErrorSource::new("01jes", vec![1.4, 2.9], Correlation::fully()))
//!     .build()?;
//!
//! let summary = Combiner::new().combine(&model)?;
//! println!("{:.3} ± {:.3}", summary.averages[0], summary.total_errors[0]);
//! # Ok::<(), blue_average::Error>(())
//! ```
//!
//! ## Pipeline
//!
//! [`DataModel`] → [`CovarianceSet`] → [`Blue`] → [`ErrorBreakdown`] /
//! [`InformationAnalysis`]. [`Combiner`] runs all of it. Sensitivity studies
//! ([`CovarianceSet::scan_partial_to_full`], [`CovarianceSet::what_if`])
//! always return a new snapshot.
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod combiner;
mod config;
mod error;
mod result;
mod types;

// Functional modules
pub mod analysis;
pub mod combination;
pub mod covariance;
pub mod model;
pub mod output;
pub mod solver;
pub mod statistics;

// Re-exports for public API
pub use analysis::{ErrorBreakdown, InformationAnalysis, PrecisionShares};
pub use combination::Blue;
pub use combiner::{Combination, Combiner};
pub use config::Config;
pub use covariance::{CovarianceSet, SourceCovariance};
pub use error::{ConfigErrorKind, Error, NumericalErrorKind, Result, Stage};
pub use model::{
    CellCorrelation, ConstraintForm, Correlation, DataModel, DataModelBuilder, ErrorSource, Globals,
    GroupMatrix, Measurement, RawInput, RawSource, SourceKey, Units,
};
pub use result::{InformationSummary, ScanPoint, Summary};
pub use solver::{BlueSolver, PseudoFit, PseudoParameterFit, Solver};
pub use types::{Matrix, Vector};

/// Combine a model with the default configuration.
pub fn combine(model: &DataModel) -> Result<Summary> {
    Combiner::new().combine(model)
}

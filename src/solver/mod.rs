//! Interchangeable combination backends.
//!
//! Every backend reads the same covariance snapshot and reports its fitted
//! parameters through [`Solver`], so callers do not depend on how a backend
//! parameterises the problem.

mod blue;
mod pseudo;

pub use blue::BlueSolver;
pub use pseudo::{PseudoFit, PseudoParameterFit};

use crate::error::Result;
use crate::types::Vector;

/// A backend that fits combined estimates.
///
/// Accessors return `None` until [`solve`](Solver::solve) has succeeded.
pub trait Solver {
    /// Run the fit.
    fn solve(&mut self) -> Result<()>;

    /// Names of all fitted parameters, averages first.
    fn parameter_names(&self) -> Vec<String>;

    /// Fitted parameter values, in the order of
    /// [`parameter_names`](Solver::parameter_names).
    fn parameters(&self) -> Option<Vector>;

    /// One-sigma errors of the fitted parameters.
    fn parameter_errors(&self) -> Option<Vector>;

    /// Chi-square at the minimum.
    fn chisq(&self) -> Option<f64>;

    /// Degrees of freedom.
    fn ndof(&self) -> usize;
}

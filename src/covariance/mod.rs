//! Covariance Builder: translate correlation declarations into matrices.

mod reweight;
pub(crate) mod rules;
mod scan;
mod set;

pub use set::{CovarianceSet, SourceCovariance};

//! Numerical building blocks shared by the combination stages.
//!
//! - Cholesky-based inversion of symmetric positive definite matrices, with
//!   explicit singularity detection (no pseudo-inverse fallback)
//! - Covariance validity checks (finite, non-negative variances, PSD)
//! - Correlation matrices from covariance matrices
//! - Chi-square tail probability

mod chisq;
mod linalg;

pub use chisq::{chi2_probability, ln_gamma, regularized_gamma_q};
pub use linalg::{check_covariance, correlation_matrix, invert_spd};

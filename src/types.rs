//! Type aliases and common types.

use nalgebra::{DMatrix, DVector};

/// Dense matrix used for covariances, weights and group assignment.
pub type Matrix = DMatrix<f64>;

/// Dense column vector (values, errors, pulls).
pub type Vector = DVector<f64>;

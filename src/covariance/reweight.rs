//! The fq (Neudecker / Böhm-Zech) correction for fully correlated
//! normalisation-type errors.
//!
//! A single pass: provisional weights come from the reduced total, and the
//! provisional averages are projected back onto the measurements. There is
//! no iteration to a fixed point.

use crate::combination::gls_weights;
use crate::config::Config;
use crate::error::{ConfigErrorKind, Error, Result, Stage};
use crate::model::DataModel;
use crate::types::{Matrix, Vector};

/// Provisional average of each measurement's group, `G · W_red · v`.
pub(super) fn provisional_projection(
    model: &DataModel,
    reduced_total: &Matrix,
    config: &Config,
    key: &str,
) -> Result<Vector> {
    let groups = model.group_matrix().matrix();
    let (weights, _) = gls_weights(reduced_total, groups, config.singularity_tolerance, Stage::Build, key)?;
    let averages = &weights * model.values();
    Ok(groups * averages)
}

/// Relative errors `e_i / v_i` scaled to the projected averages.
pub(super) fn corrected_errors(key: &str, errors: &Vector, values: &Vector, projected: &Vector) -> Result<Vector> {
    if let Some(&value) = values.iter().find(|v| **v == 0.0) {
        return Err(Error::config(key, ConfigErrorKind::InvalidValue { value }));
    }
    Ok(Vector::from_iterator(
        errors.len(),
        (0..errors.len()).map(|i| errors[i] / values[i] * projected[i]),
    ))
}

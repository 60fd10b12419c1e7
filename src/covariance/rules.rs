//! Per-declaration construction rules.
//!
//! | Rule | cov\[i,j\] (i≠j) | cov\[i,i\] | reduced |
//! |---|---|---|---|
//! | `u` | 0 | e_i² | = cov |
//! | `f` | e_i·e_j | e_i² | 0 |
//! | `a` | −e_i·e_j | e_i² | = cov |
//! | `p` | min(e_i,e_j)² | e_i² | = cov |
//! | `gp` | m² | e_i² | diag e_i² − m², off-diag 0 |
//! | `gpr` | r²·v_i·v_j | e_i² | diag e_i² − (r·v_i)², off-diag 0 |
//! | `c` | ρ_ij·e_i·e_j | ρ_ii·e_i² | = cov |
//! | `m` | rule of cell (i,j) | rule of cell (i,i) | per cell |
//!
//! m and r are the smallest absolute and relative non-zero errors. The
//! global-partial correlated part only links measurements with non-zero
//! errors, and its reduced diagonal is clamped at zero.

use nalgebra::DMatrix;

use crate::model::{CellCorrelation, Correlation};
use crate::types::{Matrix, Vector};

/// Matrices built for one source before any reweighting.
#[derive(Debug, Clone)]
pub(crate) struct RuleOutput {
    pub covariance: Matrix,
    pub reduced: Matrix,
    pub systematic: Option<Vector>,
    /// Off-diagonal pairs capped by onionisation.
    pub capped_pairs: usize,
    /// Diagonal elements where the global-partial residual went negative.
    pub clamped: usize,
}

/// Smallest non-zero absolute and relative errors of a source.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Minima {
    pub absolute: f64,
    pub relative: f64,
}

impl Minima {
    pub fn of(errors: &Vector, values: &Vector) -> Self {
        let absolute = errors
            .iter()
            .copied()
            .filter(|&e| e > 0.0)
            .fold(f64::INFINITY, f64::min);
        let relative = errors
            .iter()
            .zip(values.iter())
            .filter(|(&e, &v)| e > 0.0 && v != 0.0)
            .map(|(&e, &v)| e / v.abs())
            .fold(f64::INFINITY, f64::min);
        Self {
            absolute: if absolute.is_finite() { absolute } else { 0.0 },
            relative: if relative.is_finite() { relative } else { 0.0 },
        }
    }

    /// Fully correlated share of measurement `i` under a global-partial rule.
    pub fn share(&self, relative: bool, e: f64, v: f64) -> f64 {
        if e <= 0.0 {
            0.0
        } else if relative {
            self.relative * v
        } else {
            self.absolute
        }
    }
}

/// Covariance and reduced-covariance element of one scalar rule.
pub(crate) fn cell_entry(
    rule: CellCorrelation,
    i: usize,
    j: usize,
    errors: &Vector,
    values: &Vector,
    minima: &Minima,
) -> (f64, f64) {
    let (ei, ej) = (errors[i], errors[j]);
    match rule {
        CellCorrelation::Uncorrelated => {
            let x = if i == j { ei * ei } else { 0.0 };
            (x, x)
        }
        CellCorrelation::FullyCorrelated => (ei * ej, 0.0),
        CellCorrelation::AntiCorrelated => {
            let x = if i == j { ei * ei } else { -ei * ej };
            (x, x)
        }
        CellCorrelation::PartiallyCorrelated => {
            let m = ei.min(ej);
            (m * m, m * m)
        }
        CellCorrelation::GlobalPartial { relative } => {
            let si = minima.share(relative, ei, values[i]);
            if i == j {
                (ei * ei, ei * ei - si * si)
            } else {
                let sj = minima.share(relative, ej, values[j]);
                (si * sj, 0.0)
            }
        }
    }
}

/// Build covariance, reduced covariance and systematic error vector for one
/// declaration.
pub(crate) fn build(correlation: &Correlation, errors: &Vector, values: &Vector) -> RuleOutput {
    let n = errors.len();
    let minima = Minima::of(errors, values);

    match correlation {
        Correlation::Explicit { matrix, onionise } => explicit(matrix, *onionise, errors),
        Correlation::PerCell { cells } => {
            let mut output = from_cells(n, |i, j| cells[(i, j)], errors, values, &minima);
            output.systematic = per_cell_systematic(cells, errors, values, &minima);
            output
        }
        scalar => {
            // Every remaining declaration has a scalar rule.
            let rule = scalar.as_cell().unwrap_or(CellCorrelation::Uncorrelated);
            let mut output = from_cells(n, |_, _| rule, errors, values, &minima);
            output.systematic = match rule {
                CellCorrelation::FullyCorrelated => Some(errors.clone()),
                CellCorrelation::GlobalPartial { relative } => Some(Vector::from_iterator(
                    n,
                    (0..n).map(|i| minima.share(relative, errors[i], values[i])),
                )),
                _ => None,
            };
            output
        }
    }
}

fn from_cells<F>(n: usize, rule_at: F, errors: &Vector, values: &Vector, minima: &Minima) -> RuleOutput
where
    F: Fn(usize, usize) -> CellCorrelation,
{
    let mut covariance = Matrix::zeros(n, n);
    let mut reduced = Matrix::zeros(n, n);
    let mut clamped = 0;
    for i in 0..n {
        for j in 0..n {
            let (cov, mut red) = cell_entry(rule_at(i, j), i, j, errors, values, minima);
            if i == j && red < 0.0 {
                red = 0.0;
                clamped += 1;
            }
            covariance[(i, j)] = cov;
            reduced[(i, j)] = red;
        }
    }
    RuleOutput {
        covariance,
        reduced,
        systematic: None,
        capped_pairs: 0,
        clamped,
    }
}

fn explicit(coefficients: &Matrix, onionise: bool, errors: &Vector) -> RuleOutput {
    let n = errors.len();
    let mut covariance = Matrix::from_fn(n, n, |i, j| coefficients[(i, j)] * errors[i] * errors[j]);
    let mut capped_pairs = 0;

    if onionise {
        for i in 0..n {
            for j in (i + 1)..n {
                let (ei, ej) = (errors[i], errors[j]);
                if ei <= 0.0 || ej <= 0.0 {
                    continue;
                }
                let cap = ei.min(ej).powi(2);
                if covariance[(i, j)].abs() > cap {
                    let capped = cap.copysign(covariance[(i, j)]);
                    covariance[(i, j)] = capped;
                    covariance[(j, i)] = capped;
                    capped_pairs += 1;
                }
            }
        }
    }

    RuleOutput {
        reduced: covariance.clone(),
        covariance,
        systematic: None,
        capped_pairs,
        clamped: 0,
    }
}

/// Row i carries e_i if any of its cells is fully correlated, otherwise its
/// global-partial share if any cell is global-partial, otherwise nothing.
fn per_cell_systematic(
    cells: &DMatrix<CellCorrelation>,
    errors: &Vector,
    values: &Vector,
    minima: &Minima,
) -> Option<Vector> {
    let n = errors.len();
    let mut any = false;
    let systematic = Vector::from_iterator(
        n,
        (0..n).map(|i| {
            let row = cells.row(i);
            if row.iter().any(|c| *c == CellCorrelation::FullyCorrelated) {
                any = true;
                errors[i]
            } else if let Some(CellCorrelation::GlobalPartial { relative }) =
                row.iter().find(|c| matches!(c, CellCorrelation::GlobalPartial { .. }))
            {
                any = true;
                minima.share(*relative, errors[i], values[i])
            } else {
                0.0
            }
        }),
    );
    any.then_some(systematic)
}

/// Row patterns of correlated cells in a per-cell matrix.
///
/// Returns, for each measurement, the index of its pattern (or `None` if the
/// row has no correlated cell), plus the number of distinct patterns. Rows
/// with identical patterns share one pseudo-parameter in a solver.
pub(crate) fn correlated_row_patterns(cells: &DMatrix<CellCorrelation>) -> (Vec<Option<usize>>, usize) {
    let n = cells.nrows();
    let mut patterns: Vec<Vec<bool>> = Vec::new();
    let assignment = (0..n)
        .map(|i| {
            let pattern: Vec<bool> = cells.row(i).iter().map(|c| c.has_correlated_component()).collect();
            if !pattern.iter().any(|&p| p) {
                return None;
            }
            match patterns.iter().position(|p| *p == pattern) {
                Some(idx) => Some(idx),
                None => {
                    patterns.push(pattern);
                    Some(patterns.len() - 1)
                }
            }
        })
        .collect();
    (assignment, patterns.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec(values: &[f64]) -> Vector {
        Vector::from_row_slice(values)
    }

    #[test]
    fn test_uncorrelated_is_diagonal() {
        let e = vec(&[0.3, 0.33, 0.4]);
        let out = build(&Correlation::Uncorrelated, &e, &vec(&[1.0, 1.0, 1.0]));
        assert_eq!(out.covariance, Matrix::from_diagonal(&e.component_mul(&e)));
        assert_eq!(out.reduced, out.covariance);
        assert!(out.systematic.is_none());
    }

    #[test]
    fn test_fully_correlated_is_outer_product() {
        let e = vec(&[1.4, 2.9, 3.3]);
        let out = build(&Correlation::fully(), &e, &vec(&[1.0, 1.0, 1.0]));
        assert_eq!(out.covariance, &e * e.transpose());
        assert_eq!(out.reduced, Matrix::zeros(3, 3));
        assert_eq!(out.systematic, Some(e));
    }

    #[test]
    fn test_anti_correlated() {
        let e = vec(&[1.0, 2.0]);
        let out = build(&Correlation::AntiCorrelated, &e, &vec(&[1.0, 1.0]));
        assert_eq!(out.covariance[(0, 1)], -2.0);
        assert_eq!(out.covariance[(1, 1)], 4.0);
        assert_eq!(out.reduced, out.covariance);
    }

    #[test]
    fn test_partially_correlated_min_rule() {
        let e = vec(&[2.4, 3.1, 3.5]);
        let out = build(&Correlation::PartiallyCorrelated, &e, &vec(&[1.0, 1.0, 1.0]));
        for i in 0..3 {
            for j in 0..3 {
                let m = e[i].min(e[j]);
                assert_eq!(out.covariance[(i, j)], m * m);
            }
        }
        assert_eq!(out.reduced, out.covariance);
    }

    #[test]
    fn test_global_partial_absolute_skips_zero_errors() {
        let e = vec(&[0.0, 2.0, 3.0]);
        let out = build(
            &Correlation::GlobalPartial { relative: false },
            &e,
            &vec(&[1.0, 1.0, 1.0]),
        );
        // Minimum over non-zero errors is 2.
        assert_eq!(out.covariance[(1, 2)], 4.0);
        assert_eq!(out.covariance[(0, 1)], 0.0);
        assert_eq!(out.covariance[(2, 2)], 9.0);
        assert_eq!(out.reduced[(2, 2)], 5.0);
        assert_eq!(out.reduced[(1, 1)], 0.0);
        assert_eq!(out.reduced[(1, 2)], 0.0);
        assert_eq!(out.systematic, Some(vec(&[0.0, 2.0, 2.0])));
        // covariance = reduced + s·sᵀ
        let s = out.systematic.unwrap();
        assert!((&out.reduced + &s * s.transpose() - &out.covariance).abs().max() < 1e-12);
    }

    #[test]
    fn test_global_partial_relative() {
        let e = vec(&[1.0, 4.0]);
        let v = vec(&[10.0, 20.0]);
        let out = build(&Correlation::GlobalPartial { relative: true }, &e, &v);
        // Smallest relative error 0.1.
        assert!((out.covariance[(0, 1)] - 0.01 * 200.0).abs() < 1e-12);
        assert!((out.reduced[(0, 0)] - 0.0).abs() < 1e-12);
        assert!((out.reduced[(1, 1)] - (16.0 - 4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_and_onionisation() {
        let e = vec(&[1.0, 3.0]);
        let rho = Matrix::from_row_slice(2, 2, &[1.0, 0.8, 0.8, 1.0]);
        let out = build(&Correlation::explicit(rho.clone()), &e, &vec(&[1.0, 1.0]));
        assert!((out.covariance[(0, 1)] - 2.4).abs() < 1e-12);
        assert_eq!(out.reduced, out.covariance);
        assert_eq!(out.capped_pairs, 0);

        let out = build(
            &Correlation::Explicit { matrix: rho, onionise: true },
            &e,
            &vec(&[1.0, 1.0]),
        );
        assert_eq!(out.covariance[(0, 1)], 1.0);
        assert_eq!(out.covariance[(1, 0)], 1.0);
        assert_eq!(out.covariance[(1, 1)], 9.0);
        assert_eq!(out.capped_pairs, 1);
    }

    #[test]
    fn test_onionisation_keeps_sign() {
        let e = vec(&[1.0, 3.0]);
        let rho = Matrix::from_row_slice(2, 2, &[1.0, -0.8, -0.8, 1.0]);
        let out = build(&Correlation::Explicit { matrix: rho, onionise: true }, &e, &vec(&[1.0, 1.0]));
        assert_eq!(out.covariance[(0, 1)], -1.0);
    }

    #[test]
    fn test_per_cell_recurses_into_rules() {
        let e = vec(&[1.1, 1.3, 1.5]);
        let v = vec(&[1.0, 1.0, 1.0]);
        let all_p = Correlation::per_cell(3, &["p"; 9]).unwrap();
        let all_f = Correlation::per_cell(3, &["f"; 9]).unwrap();
        assert_eq!(
            build(&all_p, &e, &v).covariance,
            build(&Correlation::PartiallyCorrelated, &e, &v).covariance
        );
        let full = build(&all_f, &e, &v);
        assert_eq!(full.covariance, build(&Correlation::fully(), &e, &v).covariance);
        assert_eq!(full.reduced, Matrix::zeros(3, 3));
        assert_eq!(full.systematic, Some(e.clone()));

        let mixed = Correlation::per_cell(3, &["f", "f", "u", "f", "f", "u", "u", "u", "u"]).unwrap();
        let out = build(&mixed, &e, &v);
        assert!((out.covariance[(0, 1)] - 1.1 * 1.3).abs() < 1e-12);
        assert_eq!(out.covariance[(0, 2)], 0.0);
        assert!((out.reduced[(2, 2)] - 2.25).abs() < 1e-12);
        assert_eq!(out.systematic, Some(vec(&[1.1, 1.3, 0.0])));
    }

    #[test]
    fn test_row_patterns() {
        let cells = match Correlation::per_cell(3, &["f", "f", "u", "f", "f", "u", "u", "u", "f"]).unwrap() {
            Correlation::PerCell { cells } => cells,
            _ => unreachable!(),
        };
        let (assignment, count) = correlated_row_patterns(&cells);
        assert_eq!(count, 2);
        assert_eq!(assignment, vec![Some(0), Some(0), Some(1)]);
    }
}

//! Correlation declarations.
//!
//! A correlation code such as `"f"`, `"gpr%"` or `"co"` is parsed exactly once,
//! when the data model is built, into a [`Correlation`] value. Nothing
//! downstream ever looks at the code string again.
//!
//! Grammar: one base code (`u`, `f`, `a`, `p`, `gp`, `gpr`, `c`, `m`) plus any
//! number of modifiers in any position:
//!
//! | Modifier | Meaning | Valid with |
//! |---|---|---|
//! | `%` | magnitudes are percent of the measured value | any |
//! | `o` | onionise the explicit covariance | `c` |
//! | `q` | fq reweight of a fully correlated source | `f` |
//! | `R` | multiplicative constraint form for nonlinear solvers | any |

use std::fmt;
use std::str::FromStr;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::ConfigErrorKind;
use crate::types::Matrix;

/// Scalar correlation rule, usable for a whole source or for a single cell of
/// a per-cell option matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellCorrelation {
    /// `u`: no correlation between measurements.
    Uncorrelated,
    /// `f`: cov = e_i·e_j.
    FullyCorrelated,
    /// `a`: cov = −e_i·e_j off the diagonal.
    AntiCorrelated,
    /// `p`: cov = min(e_i, e_j)².
    PartiallyCorrelated,
    /// `gp` / `gpr`: common correlated part set by the smallest (relative) error.
    GlobalPartial {
        /// Use the smallest relative error (`gpr`) instead of the smallest
        /// absolute error (`gp`).
        relative: bool,
    },
}

impl CellCorrelation {
    /// The code this rule is written as.
    pub fn code(&self) -> &'static str {
        match self {
            CellCorrelation::Uncorrelated => "u",
            CellCorrelation::FullyCorrelated => "f",
            CellCorrelation::AntiCorrelated => "a",
            CellCorrelation::PartiallyCorrelated => "p",
            CellCorrelation::GlobalPartial { relative: false } => "gp",
            CellCorrelation::GlobalPartial { relative: true } => "gpr",
        }
    }

    /// Whether the rule splits off a fully correlated component that a
    /// pseudo-parameter solver represents explicitly.
    pub fn has_correlated_component(&self) -> bool {
        matches!(
            self,
            CellCorrelation::FullyCorrelated | CellCorrelation::GlobalPartial { .. }
        )
    }
}

impl FromStr for CellCorrelation {
    type Err = ConfigErrorKind;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code.trim() {
            "" => Err(ConfigErrorKind::EmptyCode),
            "u" => Ok(CellCorrelation::Uncorrelated),
            "f" => Ok(CellCorrelation::FullyCorrelated),
            "a" => Ok(CellCorrelation::AntiCorrelated),
            "p" => Ok(CellCorrelation::PartiallyCorrelated),
            "gp" => Ok(CellCorrelation::GlobalPartial { relative: false }),
            "gpr" => Ok(CellCorrelation::GlobalPartial { relative: true }),
            other => Err(ConfigErrorKind::UnknownCode(other.to_string())),
        }
    }
}

impl fmt::Display for CellCorrelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// How one error source is correlated across measurements.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// `u`
    Uncorrelated,
    /// `f`, or `fq` with the Neudecker / Böhm-Zech reweight.
    FullyCorrelated {
        /// Replace the covariance by the outer product of errors rescaled to
        /// a provisional average (`q` modifier).
        reweight: bool,
    },
    /// `a`
    AntiCorrelated,
    /// `p`
    PartiallyCorrelated,
    /// `gp` / `gpr`
    GlobalPartial {
        /// Relative (`gpr`) rather than absolute (`gp`) minimum error.
        relative: bool,
    },
    /// `c`: explicit n×n correlation coefficients.
    Explicit {
        /// Correlation coefficients, row i / column j.
        matrix: Matrix,
        /// Cap off-diagonal covariance at min(e_i, e_j)² (`o` modifier).
        onionise: bool,
    },
    /// `m`: one scalar rule per matrix cell.
    PerCell {
        /// Rule for each (i, j) pair.
        cells: DMatrix<CellCorrelation>,
    },
}

impl Correlation {
    /// Fully correlated source without reweighting.
    pub fn fully() -> Self {
        Correlation::FullyCorrelated { reweight: false }
    }

    /// Explicit correlation matrix without onionisation.
    pub fn explicit(matrix: Matrix) -> Self {
        Correlation::Explicit {
            matrix,
            onionise: false,
        }
    }

    /// Per-cell rules from a row-major list of codes.
    pub fn per_cell(n: usize, codes: &[&str]) -> Result<Self, ConfigErrorKind> {
        if codes.len() != n * n {
            return Err(ConfigErrorKind::MatrixShape {
                found: codes.len(),
                expected: n * n,
            });
        }
        let parsed = codes
            .iter()
            .map(|code| code.parse::<CellCorrelation>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Correlation::PerCell {
            cells: DMatrix::from_row_slice(n, n, &parsed),
        })
    }

    /// Short code for logs.
    pub fn code(&self) -> String {
        match self {
            Correlation::Uncorrelated => "u".into(),
            Correlation::FullyCorrelated { reweight: false } => "f".into(),
            Correlation::FullyCorrelated { reweight: true } => "fq".into(),
            Correlation::AntiCorrelated => "a".into(),
            Correlation::PartiallyCorrelated => "p".into(),
            Correlation::GlobalPartial { relative: false } => "gp".into(),
            Correlation::GlobalPartial { relative: true } => "gpr".into(),
            Correlation::Explicit { onionise: false, .. } => "c".into(),
            Correlation::Explicit { onionise: true, .. } => "co".into(),
            Correlation::PerCell { .. } => "m".into(),
        }
    }

    /// The scalar rule, for declarations that have one.
    pub fn as_cell(&self) -> Option<CellCorrelation> {
        match self {
            Correlation::Uncorrelated => Some(CellCorrelation::Uncorrelated),
            Correlation::FullyCorrelated { .. } => Some(CellCorrelation::FullyCorrelated),
            Correlation::AntiCorrelated => Some(CellCorrelation::AntiCorrelated),
            Correlation::PartiallyCorrelated => Some(CellCorrelation::PartiallyCorrelated),
            Correlation::GlobalPartial { relative } => {
                Some(CellCorrelation::GlobalPartial { relative: *relative })
            }
            Correlation::Explicit { .. } | Correlation::PerCell { .. } => None,
        }
    }

    /// Side length of the attached matrix, if any.
    pub(crate) fn matrix_dim(&self) -> Option<(usize, usize)> {
        match self {
            Correlation::Explicit { matrix, .. } => Some(matrix.shape()),
            Correlation::PerCell { cells } => Some(cells.shape()),
            _ => None,
        }
    }
}

/// Unit of the magnitudes of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    /// Same unit as the measured values.
    #[default]
    Absolute,
    /// Percent of the measured value (`%` modifier).
    Percent,
}

/// How a nonlinear solver attaches a correlated systematic to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintForm {
    /// value − average + pseudo-parameter · error
    #[default]
    Additive,
    /// value scaled by (1 + pseudo-parameter · error / value) (`R` modifier).
    Multiplicative,
}

/// Base rule of a correlation code, before any matrix data is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseCode {
    /// `u`
    Uncorrelated,
    /// `f`
    FullyCorrelated,
    /// `a`
    AntiCorrelated,
    /// `p`
    PartiallyCorrelated,
    /// `gp`
    GlobalPartial,
    /// `gpr`
    GlobalPartialRelative,
    /// `c`
    Explicit,
    /// `m`
    PerCell,
}

/// A parsed correlation code: base rule plus modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationCode {
    /// Base rule.
    pub base: BaseCode,
    /// Magnitude units (`%`).
    pub units: Units,
    /// Onionisation (`o`).
    pub onionise: bool,
    /// fq reweight (`q`).
    pub reweight: bool,
    /// Constraint form (`R`).
    pub constraint: ConstraintForm,
}

impl CorrelationCode {
    /// Whether the base rule needs a matrix section.
    pub fn needs_matrix(&self) -> bool {
        matches!(self.base, BaseCode::Explicit | BaseCode::PerCell)
    }

    /// Attach matrix tokens (row-major, n² of them) and produce the declaration.
    pub fn into_correlation(
        self,
        n: usize,
        tokens: Option<&[String]>,
    ) -> Result<Correlation, ConfigErrorKind> {
        let correlation = match self.base {
            BaseCode::Uncorrelated => Correlation::Uncorrelated,
            BaseCode::FullyCorrelated => Correlation::FullyCorrelated {
                reweight: self.reweight,
            },
            BaseCode::AntiCorrelated => Correlation::AntiCorrelated,
            BaseCode::PartiallyCorrelated => Correlation::PartiallyCorrelated,
            BaseCode::GlobalPartial => Correlation::GlobalPartial { relative: false },
            BaseCode::GlobalPartialRelative => Correlation::GlobalPartial { relative: true },
            BaseCode::Explicit => {
                let tokens = square_tokens(n, tokens)?;
                let coefficients = tokens
                    .iter()
                    .map(|token| {
                        token
                            .trim()
                            .parse::<f64>()
                            .ok()
                            .filter(|c| c.is_finite())
                            .ok_or_else(|| ConfigErrorKind::InvalidMatrixEntry(token.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Correlation::Explicit {
                    matrix: Matrix::from_row_slice(n, n, &coefficients),
                    onionise: self.onionise,
                }
            }
            BaseCode::PerCell => {
                let tokens = square_tokens(n, tokens)?;
                let codes: Vec<&str> = tokens.iter().map(String::as_str).collect();
                Correlation::per_cell(n, &codes)?
            }
        };
        Ok(correlation)
    }
}

fn square_tokens(n: usize, tokens: Option<&[String]>) -> Result<&[String], ConfigErrorKind> {
    let tokens = tokens.ok_or(ConfigErrorKind::MissingMatrix)?;
    if tokens.len() != n * n {
        return Err(ConfigErrorKind::MatrixShape {
            found: tokens.len(),
            expected: n * n,
        });
    }
    Ok(tokens)
}

impl FromStr for CorrelationCode {
    type Err = ConfigErrorKind;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ConfigErrorKind::EmptyCode);
        }

        let mut units = Units::Absolute;
        let mut onionise = false;
        let mut reweight = false;
        let mut constraint = ConstraintForm::Additive;
        let mut base = String::with_capacity(code.len());
        for ch in code.chars() {
            match ch {
                '%' => units = Units::Percent,
                'o' => onionise = true,
                'q' => reweight = true,
                'R' => constraint = ConstraintForm::Multiplicative,
                other => base.push(other),
            }
        }

        let base = match base.as_str() {
            "u" => BaseCode::Uncorrelated,
            "f" => BaseCode::FullyCorrelated,
            "a" => BaseCode::AntiCorrelated,
            "p" => BaseCode::PartiallyCorrelated,
            "gp" => BaseCode::GlobalPartial,
            "gpr" => BaseCode::GlobalPartialRelative,
            "c" => BaseCode::Explicit,
            "m" => BaseCode::PerCell,
            _ => return Err(ConfigErrorKind::UnknownCode(code.to_string())),
        };

        if onionise && base != BaseCode::Explicit {
            return Err(ConfigErrorKind::InvalidModifier {
                modifier: 'o',
                code: code.to_string(),
            });
        }
        if reweight && base != BaseCode::FullyCorrelated {
            return Err(ConfigErrorKind::InvalidModifier {
                modifier: 'q',
                code: code.to_string(),
            });
        }

        Ok(CorrelationCode {
            base,
            units,
            onionise,
            reweight,
            constraint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_codes() {
        let cases = [
            ("u", BaseCode::Uncorrelated),
            ("f", BaseCode::FullyCorrelated),
            ("a", BaseCode::AntiCorrelated),
            ("p", BaseCode::PartiallyCorrelated),
            ("gp", BaseCode::GlobalPartial),
            ("gpr", BaseCode::GlobalPartialRelative),
            ("c", BaseCode::Explicit),
            ("m", BaseCode::PerCell),
        ];
        for (code, base) in cases {
            let parsed: CorrelationCode = code.parse().unwrap();
            assert_eq!(parsed.base, base, "code {code}");
            assert_eq!(parsed.units, Units::Absolute);
            assert_eq!(parsed.constraint, ConstraintForm::Additive);
        }
    }

    #[test]
    fn test_parse_modifiers_any_position() {
        let parsed: CorrelationCode = "%gpr".parse().unwrap();
        assert_eq!(parsed.base, BaseCode::GlobalPartialRelative);
        assert_eq!(parsed.units, Units::Percent);

        let parsed: CorrelationCode = "fqR".parse().unwrap();
        assert!(parsed.reweight);
        assert_eq!(parsed.constraint, ConstraintForm::Multiplicative);

        let parsed: CorrelationCode = "oc".parse().unwrap();
        assert!(parsed.onionise);
    }

    #[test]
    fn test_parse_rejects_bad_codes() {
        assert_eq!("".parse::<CorrelationCode>(), Err(ConfigErrorKind::EmptyCode));
        assert_eq!("  ".parse::<CorrelationCode>(), Err(ConfigErrorKind::EmptyCode));
        assert_eq!(
            "x".parse::<CorrelationCode>(),
            Err(ConfigErrorKind::UnknownCode("x".into()))
        );
        assert_eq!(
            "%".parse::<CorrelationCode>(),
            Err(ConfigErrorKind::UnknownCode("%".into()))
        );
        assert!(matches!(
            "po".parse::<CorrelationCode>(),
            Err(ConfigErrorKind::InvalidModifier { modifier: 'o', .. })
        ));
        assert!(matches!(
            "pq".parse::<CorrelationCode>(),
            Err(ConfigErrorKind::InvalidModifier { modifier: 'q', .. })
        ));
    }

    #[test]
    fn test_explicit_needs_square_matrix() {
        let code: CorrelationCode = "c".parse().unwrap();
        assert_eq!(code.into_correlation(2, None), Err(ConfigErrorKind::MissingMatrix));

        let tokens: Vec<String> = ["1", "0", "0"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            code.into_correlation(2, Some(&tokens)),
            Err(ConfigErrorKind::MatrixShape { found: 3, expected: 4 })
        );

        let tokens: Vec<String> = ["1", "0.5", "0.5", "1"].iter().map(|s| s.to_string()).collect();
        match code.into_correlation(2, Some(&tokens)).unwrap() {
            Correlation::Explicit { matrix, onionise } => {
                assert!(!onionise);
                assert_eq!(matrix[(0, 1)], 0.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_per_cell_codes() {
        let correlation = Correlation::per_cell(2, &["f", "u", "u", "gp"]).unwrap();
        match correlation {
            Correlation::PerCell { cells } => {
                assert_eq!(cells[(0, 0)], CellCorrelation::FullyCorrelated);
                assert_eq!(cells[(1, 1)], CellCorrelation::GlobalPartial { relative: false });
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            Correlation::per_cell(2, &["f", "c", "u", "f"]),
            Err(ConfigErrorKind::UnknownCode("c".into()))
        );
    }
}

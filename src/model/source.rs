//! Error sources and their keys.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::declaration::{ConstraintForm, Correlation, Units};

/// Key of an error source: a sort-order prefix of digits followed by the
/// semantic name, e.g. `"03err3"`.
///
/// Keys order by their full text, so the prefix fixes the report order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKey(String);

impl SourceKey {
    /// Wrap a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Full key including the order prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Semantic name: the key without its leading digits.
    ///
    /// A key made only of digits is returned unchanged.
    pub fn name(&self) -> &str {
        let stripped = self.0.trim_start_matches(|c: char| c.is_ascii_digit());
        if stripped.is_empty() {
            &self.0
        } else {
            stripped
        }
    }

    /// Leading digits of the key (possibly empty).
    pub fn order_prefix(&self) -> &str {
        let name_len = self.name().len();
        if name_len == self.0.len() {
            ""
        } else {
            &self.0[..self.0.len() - name_len]
        }
    }
}

impl Borrow<str> for SourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for SourceKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// One named error source with a magnitude per measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorSource {
    key: SourceKey,
    magnitudes: Vec<f64>,
    correlation: Correlation,
    units: Units,
    constraint: ConstraintForm,
    r_value: Option<f64>,
}

impl ErrorSource {
    /// Source with absolute magnitudes and additive constraint form.
    pub fn new(key: impl Into<SourceKey>, magnitudes: Vec<f64>, correlation: Correlation) -> Self {
        Self {
            key: key.into(),
            magnitudes,
            correlation,
            units: Units::Absolute,
            constraint: ConstraintForm::Additive,
            r_value: None,
        }
    }

    /// Interpret magnitudes as percent of the measured value.
    pub fn percentage(self) -> Self {
        self.units(Units::Percent)
    }

    /// Set the magnitude units.
    pub fn units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    /// Use the multiplicative constraint form in nonlinear solvers.
    pub fn multiplicative(self) -> Self {
        self.constraint(ConstraintForm::Multiplicative)
    }

    /// Set the constraint form.
    pub fn constraint(mut self, constraint: ConstraintForm) -> Self {
        self.constraint = constraint;
        self
    }

    /// Attach a relative uncertainty on the error itself, for solvers that
    /// model uncertain uncertainties.
    pub fn r_value(mut self, r_value: f64) -> Self {
        self.r_value = Some(r_value);
        self
    }

    /// Source key.
    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    /// Semantic name (key without order prefix).
    pub fn name(&self) -> &str {
        self.key.name()
    }

    /// Magnitudes as given, before unit conversion or log transform.
    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }

    /// Correlation declaration.
    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    /// Magnitude units.
    pub fn unit(&self) -> Units {
        self.units
    }

    /// Constraint form for nonlinear solvers.
    pub fn constraint_form(&self) -> ConstraintForm {
        self.constraint
    }

    /// Relative uncertainty of this source's errors, if declared.
    pub fn relative_uncertainty(&self) -> Option<f64> {
        self.r_value
    }

    pub(crate) fn with_correlation(&self, correlation: Correlation) -> Self {
        Self {
            correlation,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_name_strips_order_prefix() {
        let key = SourceKey::new("01abc1");
        assert_eq!(key.name(), "abc1");
        assert_eq!(key.order_prefix(), "01");

        let key = SourceKey::new("stat");
        assert_eq!(key.name(), "stat");
        assert_eq!(key.order_prefix(), "");

        let key = SourceKey::new("42");
        assert_eq!(key.name(), "42");
    }

    #[test]
    fn test_keys_order_by_prefix() {
        let mut keys = vec![SourceKey::new("02b"), SourceKey::new("00z"), SourceKey::new("01a")];
        keys.sort();
        let names: Vec<&str> = keys.iter().map(|k| k.name()).collect();
        assert_eq!(names, ["z", "a", "b"]);
    }

    #[test]
    fn test_source_builder_flags() {
        let source = ErrorSource::new("05jes", vec![1.0, 2.0], Correlation::fully())
            .percentage()
            .multiplicative()
            .r_value(0.3);
        assert_eq!(source.name(), "jes");
        assert_eq!(source.unit(), Units::Percent);
        assert_eq!(source.constraint_form(), ConstraintForm::Multiplicative);
        assert_eq!(source.relative_uncertainty(), Some(0.3));
    }
}

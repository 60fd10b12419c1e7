//! The parsed-input structure handed over by a text parser.
//!
//! Parsing the text format itself is not this crate's job; any parser (or a
//! JSON document, via serde) that fills a [`RawInput`] can feed the model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigErrorKind, Error, Result};

use super::data::{DataModel, Globals, DEFAULT_GROUP};
use super::declaration::CorrelationCode;
use super::source::ErrorSource;

/// Magnitudes and correlation code of one error source, as read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSource {
    /// One magnitude per measurement.
    pub magnitudes: Vec<f64>,
    /// Correlation code, e.g. `"f"`, `"gpr%"`, `"co"`.
    pub code: String,
}

/// Already-parsed input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawInput {
    /// Measurement names.
    pub names: Vec<String>,
    /// Measurement values.
    pub values: Vec<f64>,
    /// Group label per measurement; all measurements share one group if absent.
    pub groups: Option<Vec<String>>,
    /// Error sources by key.
    pub sources: BTreeMap<String, RawSource>,
    /// Row-major matrix tokens for `c` (coefficients) and `m` (cell codes)
    /// sources, by key.
    pub matrices: BTreeMap<String, Vec<String>>,
    /// Relative uncertainty of the errors, by source key.
    pub r_values: BTreeMap<String, f64>,
    /// Global options.
    pub globals: Globals,
}

impl DataModel {
    /// Build a model from parsed input, interpreting every correlation code.
    pub fn from_input(input: &RawInput) -> Result<Self> {
        let n = input.names.len();
        if input.values.len() != n {
            return Err(Error::config(
                "values",
                ConfigErrorKind::MagnitudeCount {
                    found: input.values.len(),
                    expected: n,
                },
            ));
        }

        let mut builder = DataModel::builder().globals(input.globals.clone());
        match &input.groups {
            Some(groups) => {
                if groups.len() != n {
                    return Err(Error::config(
                        "groups",
                        ConfigErrorKind::GroupCount {
                            found: groups.len(),
                            expected: n,
                        },
                    ));
                }
                for ((name, &value), group) in input.names.iter().zip(&input.values).zip(groups) {
                    builder = builder.grouped_measurement(name, value, group);
                }
            }
            None => {
                for (name, &value) in input.names.iter().zip(&input.values) {
                    builder = builder.grouped_measurement(name, value, DEFAULT_GROUP);
                }
            }
        }

        for (key, raw) in &input.sources {
            let code: CorrelationCode = raw
                .code
                .parse()
                .map_err(|kind| Error::config(key, kind))?;
            let tokens = input.matrices.get(key).map(Vec::as_slice);
            let correlation = code
                .into_correlation(n, tokens)
                .map_err(|kind| Error::config(key, kind))?;

            let mut source = ErrorSource::new(key.as_str(), raw.magnitudes.clone(), correlation)
                .units(code.units)
                .constraint(code.constraint);
            if let Some(&r) = input.r_values.get(key) {
                source = source.r_value(r);
            }
            builder = builder.source(source);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::declaration::{ConstraintForm, Correlation, Units};

    fn input() -> RawInput {
        RawInput {
            names: vec!["A".into(), "B".into()],
            values: vec![1.0, 2.0],
            sources: [
                ("00stat".to_string(), RawSource { magnitudes: vec![0.1, 0.2], code: "c".into() }),
                ("01scale".to_string(), RawSource { magnitudes: vec![1.0, 2.0], code: "f%R".into() }),
            ]
            .into_iter()
            .collect(),
            matrices: [(
                "00stat".to_string(),
                vec!["1".into(), "0".into(), "0".into(), "1".into()],
            )]
            .into_iter()
            .collect(),
            r_values: [("01scale".to_string(), 0.5)].into_iter().collect(),
            ..RawInput::default()
        }
    }

    #[test]
    fn test_from_input() {
        let model = DataModel::from_input(&input()).unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.group_matrix().labels(), [DEFAULT_GROUP]);

        let scale = model.source("01scale").unwrap();
        assert_eq!(scale.correlation(), &Correlation::fully());
        assert_eq!(scale.unit(), Units::Percent);
        assert_eq!(scale.constraint_form(), ConstraintForm::Multiplicative);
        assert_eq!(scale.relative_uncertainty(), Some(0.5));
    }

    #[test]
    fn test_unknown_code_names_key() {
        let mut raw = input();
        raw.sources.get_mut("01scale").unwrap().code = "zz".into();
        let err = DataModel::from_input(&raw).unwrap_err();
        assert_eq!(err, Error::config("01scale", ConfigErrorKind::UnknownCode("zz".into())));
    }

    #[test]
    fn test_missing_matrix() {
        let mut raw = input();
        raw.matrices.clear();
        let err = DataModel::from_input(&raw).unwrap_err();
        assert_eq!(err, Error::config("00stat", ConfigErrorKind::MissingMatrix));
    }

    #[test]
    fn test_matrix_not_square_of_n() {
        let mut raw = input();
        raw.matrices.insert("00stat".into(), vec!["1".into(); 5]);
        let err = DataModel::from_input(&raw).unwrap_err();
        assert_eq!(
            err,
            Error::config("00stat", ConfigErrorKind::MatrixShape { found: 5, expected: 4 })
        );
    }

    #[test]
    fn test_group_count_checked() {
        let mut raw = input();
        raw.groups = Some(vec!["x".into()]);
        let err = DataModel::from_input(&raw).unwrap_err();
        assert_eq!(err.key(), "groups");
    }

    #[test]
    fn test_raw_input_from_json() {
        let json = r#"{
            "names": ["A", "B"],
            "values": [1.0, 2.0],
            "sources": { "00stat": { "magnitudes": [0.1, 0.1], "code": "u" } },
            "globals": { "correlation_factor": 0.5 }
        }"#;
        let raw: RawInput = serde_json::from_str(json).unwrap();
        let model = DataModel::from_input(&raw).unwrap();
        assert_eq!(model.globals().correlation_factor, Some(0.5));
        assert!(!model.globals().log_transform);
    }
}

//! Failure modes: every error names its stage and the offending key.

use blue_average::{
    Combiner, ConfigErrorKind, Correlation, DataModel, Error, ErrorSource, Matrix,
    NumericalErrorKind, RawInput, RawSource, Stage,
};

fn two_measurements() -> blue_average::DataModelBuilder {
    DataModel::builder().measurement("A", 10.0).measurement("B", 12.0)
}

#[test]
fn unknown_code_is_configuration_error() {
    let mut raw = RawInput {
        names: vec!["A".into(), "B".into()],
        values: vec![1.0, 2.0],
        ..RawInput::default()
    };
    raw.sources.insert(
        "03err3".into(),
        RawSource {
            magnitudes: vec![1.0, 1.0],
            code: "x".into(),
        },
    );
    let err = DataModel::from_input(&raw).unwrap_err();
    assert_eq!(err.stage(), Stage::Build);
    assert_eq!(err.key(), "03err3");
    assert!(matches!(
        err,
        Error::Configuration { kind: ConfigErrorKind::UnknownCode(_), .. }
    ));
}

#[test]
fn empty_code_is_configuration_error() {
    let mut raw = RawInput {
        names: vec!["A".into()],
        values: vec![1.0],
        ..RawInput::default()
    };
    raw.sources.insert(
        "00stat".into(),
        RawSource {
            magnitudes: vec![1.0],
            code: String::new(),
        },
    );
    let err = DataModel::from_input(&raw).unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration { kind: ConfigErrorKind::EmptyCode, .. }
    ));
}

#[test]
fn per_cell_matrix_must_match_measurements() {
    let err = Correlation::per_cell(2, &["f"; 5]).unwrap_err();
    assert_eq!(err, ConfigErrorKind::MatrixShape { found: 5, expected: 4 });
}

#[test]
fn rank_deficient_total_is_numerical_error() {
    let model = two_measurements()
        .source(ErrorSource::new("01lumi", vec![1.4, 2.9], Correlation::fully()))
        .build()
        .unwrap();
    let err = Combiner::new().combine(&model).unwrap_err();
    assert!(matches!(
        err,
        Error::Numerical { stage: Stage::Combine, kind: NumericalErrorKind::Singular, .. }
    ));
    assert_eq!(err.key(), "total covariance");
}

#[test]
fn indefinite_total_is_numerical_error() {
    let rho = Matrix::from_row_slice(2, 2, &[1.0, -1.8, -1.8, 1.0]);
    let model = two_measurements()
        .source(ErrorSource::new("00stat", vec![1.0, 1.0], Correlation::explicit(rho)))
        .build()
        .unwrap();
    let err = Combiner::new().combine(&model).unwrap_err();
    assert!(matches!(
        err,
        Error::Numerical { kind: NumericalErrorKind::NotPositiveSemiDefinite { .. }, .. }
    ));
}

#[test]
fn onionisation_repairs_indefinite_total() {
    let rho = Matrix::from_row_slice(2, 2, &[1.0, -1.8, -1.8, 1.0]);
    let model = two_measurements()
        .source(ErrorSource::new("00stat", vec![1.0, 2.0], Correlation::Uncorrelated))
        .source(ErrorSource::new(
            "01syst",
            vec![1.0, 1.0],
            Correlation::Explicit { matrix: rho, onionise: true },
        ))
        .build()
        .unwrap();
    assert!(Combiner::new().combine(&model).is_ok());
}

#[test]
fn errors_display_stage_and_key() {
    let model = two_measurements()
        .source(ErrorSource::new("01lumi", vec![1.0, 1.0], Correlation::fully()))
        .build()
        .unwrap();
    let message = Combiner::new().combine(&model).unwrap_err().to_string();
    assert!(message.contains("combining"));
    assert!(message.contains("total covariance"));
}

#[test]
fn what_if_unknown_source() {
    let model = two_measurements()
        .source(ErrorSource::new("00stat", vec![1.0, 1.0], Correlation::Uncorrelated))
        .build()
        .unwrap();
    let err = Combiner::new()
        .what_if(&model, "07missing", Correlation::fully())
        .unwrap_err();
    assert_eq!(err, Error::Configuration {
        key: "07missing".into(),
        kind: ConfigErrorKind::UnknownSource,
    });
}

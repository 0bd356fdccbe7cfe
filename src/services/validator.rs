//! Validator: domain, range and size checks on a parsed frame. Produces a
//! pass/fail verdict with structured reasons; never silently drops rows.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use crate::artifact::ParsedFrame;
use crate::domain::Variable;

/// Physically plausible bounds per variable, in SI units. A value outside its
/// variable's bound is a validation failure, not a silent clamp.
pub fn plausible_range(variable: Variable) -> (f64, f64) {
    match variable {
        Variable::Streamflow => (0.0, 300_000.0),
        Variable::Velocity => (0.0, 15.0),
        Variable::Nudge => (-5_000.0, 5_000.0),
        Variable::QSurface => (0.0, 300_000.0),
        Variable::QSubsurface => (0.0, 300_000.0),
        Variable::QGroundwater => (0.0, 300_000.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    DomainMismatch,
    OutOfRange,
    ShortRead,
    UnknownMissingSentinel,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind:?}{variable:?}{count:?}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub variable: Option<Variable>,
    pub count: Option<usize>,
    pub message: String,
}

impl ValidationError {
    fn domain_mismatch(count: usize) -> Self {
        ValidationError {
            kind: ValidationErrorKind::DomainMismatch,
            variable: None,
            count: Some(count),
            message: format!("{count} feature_id(s) fell outside the declared domain"),
        }
    }

    fn out_of_range(variable: Variable, count: usize) -> Self {
        ValidationError {
            kind: ValidationErrorKind::OutOfRange,
            variable: Some(variable),
            count: Some(count),
            message: format!("{count} value(s) for {} outside plausible bounds", variable.as_str()),
        }
    }

    fn short_read(expected: usize, actual: usize) -> Self {
        ValidationError {
            kind: ValidationErrorKind::ShortRead,
            variable: None,
            count: Some(actual),
            message: format!("expected ~{expected} records, got {actual}"),
        }
    }

    fn unknown_missing_sentinel(count: usize) -> Self {
        ValidationError {
            kind: ValidationErrorKind::UnknownMissingSentinel,
            variable: None,
            count: Some(count),
            message: format!("{count} value(s) used an unrecognized missing-value convention"),
        }
    }
}

/// Parsed+validated frame: identical rows to the input, with out-of-range
/// values already verified in bounds. Validation does not mutate values other
/// than trusting the Parser's own missing-sentinel conversion.
#[derive(Debug, Clone)]
pub struct ValidatedFrame {
    pub frame: ParsedFrame,
}

pub struct ValidatorConfig {
    /// Every `feature_id` in the declared domain. A real deployment loads this
    /// from the `Flowline` reference table; tests construct it directly.
    pub domain_feature_ids: HashSet<i64>,
    /// Expected record count for the product; `tolerance` is a fraction, e.g. 0.05.
    pub expected_record_count: usize,
    pub size_tolerance: f64,
}

pub fn validate(frame: ParsedFrame, config: &ValidatorConfig) -> Result<ValidatedFrame, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let out_of_domain =
        frame.rows.iter().filter(|r| !config.domain_feature_ids.contains(&r.feature_id)).count();
    if out_of_domain > 0 {
        errors.push(ValidationError::domain_mismatch(out_of_domain));
    }

    let unrecognized_sentinels = frame.rows.iter().filter(|r| r.unrecognized_sentinel).count();
    if unrecognized_sentinels > 0 {
        errors.push(ValidationError::unknown_missing_sentinel(unrecognized_sentinels));
    }

    for variable in [
        Variable::Streamflow,
        Variable::Velocity,
        Variable::Nudge,
        Variable::QSurface,
        Variable::QSubsurface,
        Variable::QGroundwater,
    ] {
        let (lo, hi) = plausible_range(variable);
        let bad = frame
            .rows
            .iter()
            .filter(|r| r.variable == variable)
            .filter(|r| matches!(r.value, Some(v) if v < lo || v > hi))
            .count();
        if bad > 0 {
            errors.push(ValidationError::out_of_range(variable, bad));
        }
    }

    let lower = (config.expected_record_count as f64 * (1.0 - config.size_tolerance)).floor() as usize;
    let upper = (config.expected_record_count as f64 * (1.0 + config.size_tolerance)).ceil() as usize;
    if frame.rows.len() < lower || frame.rows.len() > upper {
        errors.push(ValidationError::short_read(config.expected_record_count, frame.rows.len()));
    }

    if errors.is_empty() {
        Ok(ValidatedFrame { frame })
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ParsedRow;
    use std::collections::HashMap;

    fn frame_with(rows: Vec<ParsedRow>) -> ParsedFrame {
        ParsedFrame { domain: "test".into(), variable_units: HashMap::new(), rows }
    }

    fn config(domain_ids: &[i64], expected: usize) -> ValidatorConfig {
        ValidatorConfig {
            domain_feature_ids: domain_ids.iter().copied().collect(),
            expected_record_count: expected,
            size_tolerance: 0.1,
        }
    }

    #[test]
    fn passes_clean_frame() {
        let frame = frame_with(vec![
            ParsedRow { feature_id: 1, variable: Variable::Streamflow, value: Some(10.0), unrecognized_sentinel: false },
            ParsedRow { feature_id: 1, variable: Variable::Velocity, value: Some(0.5), unrecognized_sentinel: false },
        ]);
        assert!(validate(frame, &config(&[1], 2)).is_ok());
    }

    #[test]
    fn flags_domain_mismatch() {
        let frame = frame_with(vec![ParsedRow {
            feature_id: 999,
            variable: Variable::Streamflow,
            value: Some(10.0),
            unrecognized_sentinel: false,
        }]);
        let errs = validate(frame, &config(&[1], 1)).unwrap_err();
        assert!(errs.iter().any(|e| e.kind == ValidationErrorKind::DomainMismatch));
    }

    #[test]
    fn flags_out_of_range_value() {
        let frame = frame_with(vec![ParsedRow {
            feature_id: 1,
            variable: Variable::Velocity,
            value: Some(50.0),
            unrecognized_sentinel: false,
        }]);
        let errs = validate(frame, &config(&[1], 1)).unwrap_err();
        assert!(errs
            .iter()
            .any(|e| e.kind == ValidationErrorKind::OutOfRange && e.variable == Some(Variable::Velocity)));
    }

    #[test]
    fn flags_short_read() {
        let frame = frame_with(vec![ParsedRow {
            feature_id: 1,
            variable: Variable::Streamflow,
            value: Some(10.0),
            unrecognized_sentinel: false,
        }]);
        let errs = validate(frame, &config(&[1], 100)).unwrap_err();
        assert!(errs.iter().any(|e| e.kind == ValidationErrorKind::ShortRead));
    }

    #[test]
    fn missing_value_none_never_flagged_out_of_range() {
        let frame = frame_with(vec![ParsedRow {
            feature_id: 1,
            variable: Variable::Streamflow,
            value: None,
            unrecognized_sentinel: false,
        }]);
        assert!(validate(frame, &config(&[1], 1)).is_ok());
    }

    #[test]
    fn flags_unknown_missing_sentinel() {
        let frame = frame_with(vec![ParsedRow {
            feature_id: 1,
            variable: Variable::Streamflow,
            value: None,
            unrecognized_sentinel: true,
        }]);
        let errs = validate(frame, &config(&[1], 1)).unwrap_err();
        assert!(errs.iter().any(|e| e.kind == ValidationErrorKind::UnknownMissingSentinel));
    }
}

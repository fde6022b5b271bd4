use fabricate_core::{Constraints, ScalarKind, Value};
use regex::Regex;

use crate::errors::GenerationError;

/// Length window for one text, binary or container value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LengthRange {
    pub min: usize,
    pub max: usize,
}

impl LengthRange {
    pub fn contains(&self, len: usize) -> bool {
        len >= self.min && len <= self.max
    }
}

/// Combine declared length constraints with a default window.
///
/// A lone `min_length` above the default maximum stretches the window up to
/// it; a lone `max_length` below the default minimum shrinks it.
pub fn length_range(
    constraints: &Constraints,
    default_min: usize,
    default_max: usize,
    path: &str,
) -> Result<LengthRange, GenerationError> {
    let (min, max) = match (constraints.min_length, constraints.max_length) {
        (Some(min), Some(max)) => (min, max),
        (Some(min), None) => (min, default_max.max(min)),
        (None, Some(max)) => (default_min.min(max), max),
        (None, None) => (default_min, default_max),
    };
    if min > max {
        return Err(GenerationError::unsatisfiable(
            path,
            format!("min_length {min} is greater than max_length {max}"),
        ));
    }
    Ok(LengthRange { min, max })
}

pub fn compile_pattern(pattern: &str, path: &str) -> Result<Regex, GenerationError> {
    Regex::new(pattern)
        .map_err(|err| GenerationError::unsatisfiable(path, format!("invalid pattern: {err}")))
}

/// Whether `value` is of the shape a provider for `kind` must return.
pub fn kind_matches(kind: ScalarKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (ScalarKind::Bool, Value::Bool(_))
            | (ScalarKind::Int, Value::Int(_))
            | (ScalarKind::Float, Value::Float(_))
            | (ScalarKind::Text, Value::Text(_))
            | (ScalarKind::Bytes, Value::Bytes(_))
            | (ScalarKind::Uuid, Value::Uuid(_))
            | (ScalarKind::Date, Value::Date(_))
            | (ScalarKind::Time, Value::Time(_))
            | (ScalarKind::DateTime, Value::DateTime(_))
    )
}

/// First declared bound, length or pattern that `value` breaks.
///
/// Choices are not checked here; callers filter them separately.
pub fn violation(value: &Value, constraints: &Constraints) -> Option<String> {
    if let Some(number) = value.as_f64() {
        if let Some(minimum) = constraints.minimum
            && number < minimum
        {
            return Some(format!("{number} is below minimum {minimum}"));
        }
        if let Some(maximum) = constraints.maximum
            && number > maximum
        {
            return Some(format!("{number} is above maximum {maximum}"));
        }
    }

    if let Some(len) = value.length() {
        if let Some(min_length) = constraints.min_length
            && len < min_length
        {
            return Some(format!("length {len} is below min_length {min_length}"));
        }
        if let Some(max_length) = constraints.max_length
            && len > max_length
        {
            return Some(format!("length {len} is above max_length {max_length}"));
        }
    }

    if let (Some(pattern), Value::Text(text)) = (&constraints.pattern, value) {
        match Regex::new(pattern) {
            Ok(regex) if regex.is_match(text) => {}
            Ok(_) => return Some(format!("'{text}' does not match pattern '{pattern}'")),
            Err(err) => return Some(format!("invalid pattern: {err}")),
        }
    }

    None
}

pub fn satisfies(value: &Value, constraints: &Constraints) -> bool {
    violation(value, constraints).is_none()
}

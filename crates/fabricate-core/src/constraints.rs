use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Structurally representable restrictions on a field or element.
///
/// Every option is independent; an empty set means "unconstrained".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Constraints {
    /// Inclusive lower bound for numeric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numeric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Minimum length (characters, bytes, items or entries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum length (characters, bytes, items or entries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Regular expression text values must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Closed set of allowed values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.minimum.is_none()
            && self.maximum.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.pattern.is_none()
            && self.choices.is_none()
    }

    pub fn has_numeric_bounds(&self) -> bool {
        self.minimum.is_some() || self.maximum.is_some()
    }

    pub fn has_length_bounds(&self) -> bool {
        self.min_length.is_some() || self.max_length.is_some()
    }

    pub fn between(minimum: f64, maximum: f64) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: Some(maximum),
            ..Self::default()
        }
    }

    pub fn max_length(max_length: usize) -> Self {
        Self {
            max_length: Some(max_length),
            ..Self::default()
        }
    }

    pub fn one_of(choices: impl IntoIterator<Item = Value>) -> Self {
        Self {
            choices: Some(choices.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Layer `other` on top of `self`; options set in `other` win.
    pub fn merged(&self, other: &Constraints) -> Constraints {
        Constraints {
            minimum: other.minimum.or(self.minimum),
            maximum: other.maximum.or(self.maximum),
            min_length: other.min_length.or(self.min_length),
            max_length: other.max_length.or(self.max_length),
            pattern: other.pattern.clone().or_else(|| self.pattern.clone()),
            choices: other.choices.clone().or_else(|| self.choices.clone()),
        }
    }

    /// Reject declarations that no value can satisfy.
    pub fn check_consistency(&self) -> Result<(), String> {
        if let (Some(minimum), Some(maximum)) = (self.minimum, self.maximum)
            && minimum > maximum
        {
            return Err(format!("minimum {minimum} is greater than maximum {maximum}"));
        }
        if let Some(bound) = self.minimum.or(self.maximum)
            && !bound.is_finite()
        {
            return Err("numeric bounds must be finite".to_string());
        }
        if let (Some(min_length), Some(max_length)) = (self.min_length, self.max_length)
            && min_length > max_length
        {
            return Err(format!(
                "min_length {min_length} is greater than max_length {max_length}"
            ));
        }
        if let Some(choices) = &self.choices
            && choices.is_empty()
        {
            return Err("choices must not be empty".to_string());
        }
        Ok(())
    }
}

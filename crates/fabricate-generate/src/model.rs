use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use fabricate_core::Value;
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;
use crate::faker_rs::locales::LocaleKey;
use crate::overrides::Overrides;

/// How a union picks among its non-null alternatives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnionSelection {
    /// Always the first alternative that can still be built.
    #[default]
    First,
    /// Uniformly among the alternatives that can still be built.
    Random,
}

/// Options for the synthesis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildOptions {
    /// Seed used when a request carries none.
    pub seed: Option<u64>,
    /// How many times one model may appear on a single nesting path.
    pub max_recursion_depth: usize,
    /// Container length range used when no length constraint is declared.
    pub min_collection_length: usize,
    pub max_collection_length: usize,
    /// Probability of null for optional unions.
    pub null_probability: f64,
    pub union_selection: UnionSelection,
    /// Reuse declared concrete defaults for every field.
    pub use_defaults: bool,
    /// Retries to find a distinct set item or mapping key.
    pub max_unique_attempts: usize,
    /// Retries for providers that re-draw to satisfy constraints.
    pub max_constraint_attempts: usize,
    pub locale: LocaleKey,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            seed: None,
            max_recursion_depth: 3,
            min_collection_length: 1,
            max_collection_length: 3,
            null_probability: 0.0,
            union_selection: UnionSelection::First,
            use_defaults: false,
            max_unique_attempts: 100,
            max_constraint_attempts: 64,
            locale: LocaleKey::EnUs,
        }
    }
}

impl BuildOptions {
    pub fn from_toml_str(content: &str) -> Result<Self, GenerationError> {
        let options: BuildOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, GenerationError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.max_recursion_depth == 0 {
            return Err(GenerationError::InvalidOptions(
                "max_recursion_depth must be >= 1".to_string(),
            ));
        }
        if self.min_collection_length > self.max_collection_length {
            return Err(GenerationError::InvalidOptions(
                "min_collection_length must be <= max_collection_length".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.null_probability) {
            return Err(GenerationError::InvalidOptions(
                "null_probability must be within [0, 1]".to_string(),
            ));
        }
        if self.max_unique_attempts == 0 || self.max_constraint_attempts == 0 {
            return Err(GenerationError::InvalidOptions(
                "attempt budgets must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-call inputs of a build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub seed: Option<u64>,
    pub overrides: Overrides,
    /// Dotted field paths whose declared defaults are reused instead of
    /// re-synthesized.
    pub use_defaults_for: BTreeSet<String>,
    /// Keep going after a failed instance in batch builds.
    pub best_effort: bool,
}

impl BuildRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Shorthand for a literal override at a field name or dotted path.
    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.overrides.insert(path, value.into());
        self
    }

    pub fn use_default_for(mut self, path: impl Into<String>) -> Self {
        self.use_defaults_for.insert(path.into());
        self
    }

    pub fn best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }
}

/// One instance a best-effort batch could not build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildFailure {
    pub index: usize,
    pub message: String,
}

/// Diagnostics accumulated over a build call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    pub model: String,
    pub seed: u64,
    pub instances: u64,
    pub provider_usage: BTreeMap<String, u64>,
    pub fallback_count: u64,
    pub override_hits: u64,
    pub default_reuses: u64,
    pub recursion_limit_hits: u64,
    pub failures: Vec<BuildFailure>,
}

impl BuildReport {
    pub fn new(model: impl Into<String>, seed: u64) -> Self {
        Self {
            model: model.into(),
            seed,
            ..Self::default()
        }
    }

    pub fn record_provider_usage(&mut self, id: &str) {
        *self.provider_usage.entry(id.to_string()).or_insert(0) += 1;
    }

    pub fn record_fallback(&mut self) {
        self.fallback_count += 1;
    }

    pub fn record_override(&mut self) {
        self.override_hits += 1;
    }

    pub fn record_default_reuse(&mut self) {
        self.default_reuses += 1;
    }

    pub fn record_recursion_limit(&mut self) {
        self.recursion_limit_hits += 1;
    }

    pub fn record_failure(&mut self, index: usize, error: &GenerationError) {
        self.failures.push(BuildFailure {
            index,
            message: error.to_string(),
        });
    }
}

/// Instances of a batch together with its report.
#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    pub instances: Vec<T>,
    pub report: BuildReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let options = BuildOptions::from_toml_str(
            r#"
            seed = 42
            max_recursion_depth = 2
            union_selection = "random"
            locale = "pt_BR"
            "#,
        )
        .expect("options");
        assert_eq!(options.seed, Some(42));
        assert_eq!(options.max_recursion_depth, 2);
        assert_eq!(options.union_selection, UnionSelection::Random);
        assert_eq!(options.locale, LocaleKey::PtBr);
        assert_eq!(options.max_collection_length, 3);
        assert_eq!(options.null_probability, 0.0);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            BuildOptions::from_toml_str("max_depth = 2"),
            Err(GenerationError::Config(_))
        ));
        assert!(matches!(
            BuildOptions::from_toml_str("max_recursion_depth = 0"),
            Err(GenerationError::InvalidOptions(_))
        ));
        assert!(matches!(
            BuildOptions::from_toml_str("null_probability = 1.5"),
            Err(GenerationError::InvalidOptions(_))
        ));
        assert!(matches!(
            BuildOptions::from_toml_str("min_collection_length = 4"),
            Err(GenerationError::InvalidOptions(_))
        ));
    }
}

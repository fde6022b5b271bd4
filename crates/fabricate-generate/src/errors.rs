use fabricate_core::Record;
use thiserror::Error;

/// Errors emitted by the resolution and synthesis engine.
///
/// Reaching the recursion depth cap is not an error: it yields a terminal
/// value and is reported through `BuildReport` and a `recursion_limit`
/// tracing event.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("unsupported type '{annotation}': {reason}")]
    UnsupportedType { annotation: String, reason: String },
    #[error("unsatisfiable constraint at '{path}': {reason}")]
    UnsatisfiableConstraint { path: String, reason: String },
    #[error("no provider for '{signature}' (constraints: {constraints})")]
    ProviderNotFound {
        signature: String,
        constraints: String,
    },
    #[error("provider '{provider}' broke its contract at '{path}': {reason}")]
    ProviderContract {
        provider: String,
        path: String,
        reason: String,
    },
    #[error("construction of '{model}' failed: {message}")]
    Construction {
        model: String,
        message: String,
        /// Field values handed to the constructor.
        fields: Box<Record>,
    },
    #[error("invalid override '{path}': {reason}")]
    InvalidOverride { path: String, reason: String },
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Core(#[from] fabricate_core::Error),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenerationError {
    pub(crate) fn unsatisfiable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        GenerationError::UnsatisfiableConstraint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(annotation: impl ToString, reason: impl Into<String>) -> Self {
        GenerationError::UnsupportedType {
            annotation: annotation.to_string(),
            reason: reason.into(),
        }
    }
}

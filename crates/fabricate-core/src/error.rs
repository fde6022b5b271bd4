use thiserror::Error;

/// Core error type shared across fabricate crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A textual type annotation could not be parsed.
    #[error("invalid annotation '{text}' at offset {offset}: {message}")]
    Annotation {
        text: String,
        offset: usize,
        message: String,
    },
    /// The model catalog violates internal invariants.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
    /// A value could not be converted into the requested Rust type.
    #[error("conversion error: {0}")]
    Conversion(String),
    /// Catalog documents failed to (de)serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results returned by fabricate crates.
pub type Result<T> = std::result::Result<T, Error>;

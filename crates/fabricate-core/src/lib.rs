//! Core contracts for fabricate.
//!
//! This crate defines the value model, raw type annotations, field
//! constraints, the adapter-hook field shape and the serializable model
//! catalog shared by the generation engine and the CLI.

pub mod annotation;
pub mod catalog;
pub mod constraints;
pub mod error;
pub mod field;
pub mod validation;
pub mod value;

pub use annotation::{Annotation, ScalarKind};
pub use catalog::{FieldDef, ModelCatalog, ModelDef};
pub use constraints::Constraints;
pub use error::{Error, Result};
pub use field::{DefaultFactory, FieldDefault, RawField};
pub use validation::validate_catalog;
pub use value::{FromValue, Record, Value};

/// Current contract version for catalog documents.
pub const CATALOG_VERSION: &str = "0.1";

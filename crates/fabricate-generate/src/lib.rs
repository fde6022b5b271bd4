//! Synthetic instance generation for declared models.
//!
//! A build runs in four steps: an adapter extracts the model's declared
//! fields, the [`TypeResolver`] normalizes their annotations into
//! [`FieldDescriptor`] trees, the [`ValueSynthesizer`] walks those trees
//! drawing scalars from the [`ProviderRegistry`], and the adapter assembles
//! the instance. [`ModelBuilder`] drives the whole pipeline.
//!
//! Builds are deterministic for a fixed seed, options, registry contents and
//! model declarations.

pub mod adapters;
pub mod builder;
pub mod descriptor;
pub mod errors;
pub mod faker_rs;
pub mod limits;
pub mod model;
pub mod overrides;
pub mod providers;
pub mod resolver;
pub mod synthesizer;

pub use adapters::{AdapterSet, CatalogAdapter, Model, ModelAdapter, TypedAdapter};
pub use builder::ModelBuilder;
pub use descriptor::{FieldDescriptor, ModelDescriptor, Shape, TypeSignature};
pub use errors::GenerationError;
pub use faker_rs::locales::LocaleKey;
pub use model::{BatchOutcome, BuildFailure, BuildOptions, BuildReport, BuildRequest, UnionSelection};
pub use overrides::{Override, OverrideFactory, Overrides};
pub use providers::{
    Provider, ProviderContext, ProviderRegistry, from_fn, global_registry, provider_fn,
    reset_global_registry, use_category, use_provider,
};
pub use resolver::TypeResolver;
pub use synthesizer::{SynthesisContext, ValueSynthesizer};

//! Field extraction and construction per structured-type family.
//!
//! Each family answers "is this model mine", "what are its declared fields"
//! and "assemble an instance from these field values". The builder asks the
//! families in order and uses the first that supports a model.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use fabricate_core::{ModelCatalog, RawField, Record, Value, validate_catalog};

use crate::errors::GenerationError;

pub trait ModelAdapter: Send + Sync {
    /// Short family name for diagnostics (`catalog`, `typed`, ...).
    fn family(&self) -> &str;

    fn supports(&self, model: &str) -> bool;

    /// Declared fields in declaration order.
    fn extract_fields(&self, model: &str) -> Result<Vec<RawField>, GenerationError>;

    /// Assemble an instance from synthesized (or overridden) field values.
    /// Fields left out of `record` were skipped and fall back to defaults.
    fn construct(&self, model: &str, record: Record) -> Result<Value, GenerationError>;
}

/// Statically-typed structured type that can be built directly.
pub trait Model: Sized {
    const NAME: &'static str;

    fn fields() -> Vec<RawField>;

    fn from_record(record: Record) -> fabricate_core::Result<Self>;
}

/// Order `record` by declaration, fill skipped fields from their defaults and
/// reject missing or undeclared fields.
pub fn complete_record(
    model: &str,
    declared: &[RawField],
    mut record: Record,
) -> Result<Record, GenerationError> {
    let construction = |message: String, record: &Record| GenerationError::Construction {
        model: model.to_string(),
        message,
        fields: Box::new(record.clone()),
    };

    if let Some(unknown) = record
        .field_names()
        .find(|name| !declared.iter().any(|field| field.name == *name))
    {
        return Err(construction(format!("unknown field '{unknown}'"), &record));
    }

    let mut completed = Record::new(model);
    for field in declared {
        match record.take(&field.name) {
            Some(value) => completed.insert(field.name.clone(), value),
            None => match field.default.resolve() {
                Some(value) => completed.insert(field.name.clone(), value),
                None => {
                    let mut seen = completed.clone();
                    for (name, value) in record.iter() {
                        seen.insert(name, value.clone());
                    }
                    return Err(construction(
                        format!("missing required field '{}'", field.name),
                        &seen,
                    ));
                }
            },
        }
    }
    Ok(completed)
}

/// Models described by a serializable catalog.
#[derive(Debug, Clone)]
pub struct CatalogAdapter {
    catalog: ModelCatalog,
}

impl CatalogAdapter {
    pub fn new(catalog: ModelCatalog) -> Result<Self, GenerationError> {
        validate_catalog(&catalog)?;
        Ok(Self { catalog })
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }
}

impl ModelAdapter for CatalogAdapter {
    fn family(&self) -> &str {
        "catalog"
    }

    fn supports(&self, model: &str) -> bool {
        self.catalog.model(model).is_some()
    }

    fn extract_fields(&self, model: &str) -> Result<Vec<RawField>, GenerationError> {
        self.catalog
            .model(model)
            .map(|def| def.raw_fields())
            .ok_or_else(|| GenerationError::unsupported(model, "model not found in catalog"))
    }

    fn construct(&self, model: &str, record: Record) -> Result<Value, GenerationError> {
        let declared = self.extract_fields(model)?;
        complete_record(model, &declared, record).map(Value::Record)
    }
}

struct TypedEntry {
    fields: fn() -> Vec<RawField>,
    check: fn(Record) -> fabricate_core::Result<()>,
}

/// Models registered through the [`Model`] trait.
#[derive(Default)]
pub struct TypedAdapter {
    entries: BTreeMap<&'static str, TypedEntry>,
}

impl fmt::Debug for TypedAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedAdapter")
            .field("models", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TypedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Model>(&mut self) {
        self.entries.insert(
            T::NAME,
            TypedEntry {
                fields: T::fields,
                check: |record| T::from_record(record).map(|_| ()),
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ModelAdapter for TypedAdapter {
    fn family(&self) -> &str {
        "typed"
    }

    fn supports(&self, model: &str) -> bool {
        self.entries.contains_key(model)
    }

    fn extract_fields(&self, model: &str) -> Result<Vec<RawField>, GenerationError> {
        self.entries
            .get(model)
            .map(|entry| (entry.fields)())
            .ok_or_else(|| GenerationError::unsupported(model, "model is not registered"))
    }

    fn construct(&self, model: &str, record: Record) -> Result<Value, GenerationError> {
        let entry = self
            .entries
            .get(model)
            .ok_or_else(|| GenerationError::unsupported(model, "model is not registered"))?;
        let record = complete_record(model, &(entry.fields)(), record)?;
        (entry.check)(record.clone()).map_err(|err| GenerationError::Construction {
            model: model.to_string(),
            message: err.to_string(),
            fields: Box::new(record.clone()),
        })?;
        Ok(Value::Record(record))
    }
}

/// Ordered adapter families; typed models are consulted first.
#[derive(Default)]
pub struct AdapterSet {
    typed: TypedAdapter,
    others: Vec<Arc<dyn ModelAdapter>>,
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterSet")
            .field("typed", &self.typed)
            .field(
                "others",
                &self.others.iter().map(|adapter| adapter.family()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, adapter: Arc<dyn ModelAdapter>) {
        self.others.push(adapter);
    }

    pub fn register_model<T: Model>(&mut self) {
        self.typed.register::<T>();
    }

    pub fn find(&self, model: &str) -> Option<&dyn ModelAdapter> {
        if self.typed.supports(model) {
            return Some(&self.typed);
        }
        self.others
            .iter()
            .find(|adapter| adapter.supports(model))
            .map(|adapter| adapter.as_ref())
    }

    fn require(&self, model: &str) -> Result<&dyn ModelAdapter, GenerationError> {
        self.find(model)
            .ok_or_else(|| GenerationError::unsupported(model, "no adapter supports this model"))
    }

    pub fn extract_fields(&self, model: &str) -> Result<Vec<RawField>, GenerationError> {
        self.require(model)?.extract_fields(model)
    }

    pub fn construct(&self, model: &str, record: Record) -> Result<Value, GenerationError> {
        self.require(model)?.construct(model, record)
    }
}

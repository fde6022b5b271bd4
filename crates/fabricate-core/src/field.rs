use std::fmt;
use std::sync::Arc;

use crate::annotation::Annotation;
use crate::constraints::Constraints;
use crate::value::Value;

/// Deferred default, evaluated only when the default is actually reused.
#[derive(Clone)]
pub struct DefaultFactory(Arc<dyn Fn() -> Value + Send + Sync>);

impl DefaultFactory {
    pub fn new(factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(factory))
    }

    pub fn produce(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for DefaultFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultFactory(..)")
    }
}

/// Declared default of a field.
///
/// `Absent` ("must synthesize") is distinct from `Value(Value::Null)`
/// ("the default is null").
#[derive(Debug, Clone, Default)]
pub enum FieldDefault {
    #[default]
    Absent,
    Value(Value),
    Factory(DefaultFactory),
}

impl FieldDefault {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldDefault::Absent)
    }

    /// Concrete default value, invoking the factory when there is one.
    pub fn resolve(&self) -> Option<Value> {
        match self {
            FieldDefault::Absent => None,
            FieldDefault::Value(value) => Some(value.clone()),
            FieldDefault::Factory(factory) => Some(factory.produce()),
        }
    }
}

/// One declared field as reported by an adapter hook.
#[derive(Debug, Clone)]
pub struct RawField {
    pub name: String,
    pub annotation: Annotation,
    pub default: FieldDefault,
    pub constraints: Constraints,
}

impl RawField {
    pub fn new(name: impl Into<String>, annotation: Annotation) -> Self {
        Self {
            name: name.into(),
            annotation,
            default: FieldDefault::Absent,
            constraints: Constraints::default(),
        }
    }

    /// Parse the annotation from its textual form.
    pub fn parse(name: impl Into<String>, annotation: &str) -> crate::Result<Self> {
        Ok(Self::new(name, Annotation::parse(annotation)?))
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = FieldDefault::Value(value.into());
        self
    }

    pub fn with_default_factory(
        mut self,
        factory: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.default = FieldDefault::Factory(DefaultFactory::new(factory));
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }
}

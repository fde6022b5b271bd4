use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use fabricate_core::{Annotation, Constraints, FieldDefault, ScalarKind, Value};

use crate::errors::GenerationError;

/// Provider lookup key: a scalar kind narrowed by an optional semantic tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeSignature {
    pub kind: ScalarKind,
    pub tag: Option<String>,
}

impl TypeSignature {
    pub fn new(kind: ScalarKind) -> Self {
        Self { kind, tag: None }
    }

    pub fn tagged(kind: ScalarKind, tag: impl Into<String>) -> Self {
        Self {
            kind,
            tag: Some(tag.into()),
        }
    }

    /// The least specific signature of the same kind.
    pub fn base(&self) -> Self {
        Self::new(self.kind)
    }

    pub fn parse(text: &str) -> Result<Self, GenerationError> {
        let (kind, tag) = match text.split_once('@') {
            Some((kind, tag)) => (kind.trim(), Some(tag.trim())),
            None => (text.trim(), None),
        };
        let kind = ScalarKind::parse(kind).ok_or_else(|| {
            GenerationError::unsupported(text, "signature must start with a scalar kind")
        })?;
        match tag {
            Some("") => Err(GenerationError::unsupported(text, "empty semantic tag")),
            Some(tag) => Ok(Self::tagged(kind, tag)),
            None => Ok(Self::new(kind)),
        }
    }
}

impl FromStr for TypeSignature {
    type Err = GenerationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl From<ScalarKind> for TypeSignature {
    fn from(kind: ScalarKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}@{tag}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Resolved shape of a field or element.
#[derive(Debug, Clone)]
pub enum Shape {
    Scalar(TypeSignature),
    Null,
    List(Box<FieldDescriptor>),
    Set(Box<FieldDescriptor>),
    Tuple(Vec<FieldDescriptor>),
    Map {
        key: Box<FieldDescriptor>,
        value: Box<FieldDescriptor>,
    },
    /// Ordered alternatives; `nullable` marks an optional union.
    Union {
        alternatives: Vec<FieldDescriptor>,
        nullable: bool,
    },
    Choice(Vec<Value>),
    Model(Arc<ModelDescriptor>),
    /// Back-reference to a model already on the resolution path. Synthesis
    /// bounds how often it is followed.
    Recursive(String),
}

/// Normalized description of one field (or container element).
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name, or the element role inside a container (`item`, `key`, ...).
    pub name: String,
    pub shape: Shape,
    pub default: FieldDefault,
    pub constraints: Constraints,
    /// Annotation this descriptor was resolved from, for diagnostics.
    pub annotation: Annotation,
}

impl FieldDescriptor {
    pub fn is_recursive_candidate(&self) -> bool {
        matches!(self.shape, Shape::Recursive(_))
    }

    pub fn signature(&self) -> Option<&TypeSignature> {
        match &self.shape {
            Shape::Scalar(signature) => Some(signature),
            _ => None,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(
            self.shape,
            Shape::Null | Shape::Union { nullable: true, .. }
        )
    }

    /// Whether any descendant refers back to a model on the resolution path.
    pub fn contains_recursion(&self) -> bool {
        match &self.shape {
            Shape::Recursive(_) => true,
            Shape::List(inner) | Shape::Set(inner) => inner.contains_recursion(),
            Shape::Map { key, value } => key.contains_recursion() || value.contains_recursion(),
            Shape::Tuple(members) => members.iter().any(FieldDescriptor::contains_recursion),
            Shape::Union { alternatives, .. } => {
                alternatives.iter().any(FieldDescriptor::contains_recursion)
            }
            Shape::Model(model) => model.fields.iter().any(FieldDescriptor::contains_recursion),
            Shape::Scalar(_) | Shape::Null | Shape::Choice(_) => false,
        }
    }
}

/// Resolved structured type: its fields in declaration order.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }
}

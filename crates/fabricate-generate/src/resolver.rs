//! Normalizes raw annotations into `FieldDescriptor` trees.
//!
//! Nested models are expanded by asking the adapters for their fields. A
//! model that is already being expanded on the current path becomes a
//! `Shape::Recursive` back-reference instead of being expanded again, so
//! resolution always terminates; the synthesizer bounds how deep such
//! references are followed.

use std::sync::Arc;

use fabricate_core::{Annotation, Constraints, FieldDefault, RawField, ScalarKind};

use crate::adapters::AdapterSet;
use crate::descriptor::{FieldDescriptor, ModelDescriptor, Shape, TypeSignature};
use crate::errors::GenerationError;

/// State of one resolution pass: the models being expanded on the active path.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    in_progress: Vec<String>,
    path: Vec<String>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_progress(&self, model: &str) -> bool {
        self.in_progress.iter().any(|name| name == model)
    }

    fn path(&self) -> String {
        self.path.join(".")
    }
}

/// Which constraint families a shape accepts.
#[derive(Clone, Copy)]
struct Accepts {
    numeric: bool,
    length: bool,
    pattern: bool,
}

impl Accepts {
    const NOTHING: Accepts = Accepts {
        numeric: false,
        length: false,
        pattern: false,
    };
    const LENGTH: Accepts = Accepts {
        numeric: false,
        length: true,
        pattern: false,
    };
    const EVERYTHING: Accepts = Accepts {
        numeric: true,
        length: true,
        pattern: true,
    };

    fn scalar(kind: ScalarKind) -> Self {
        Accepts {
            numeric: kind.is_numeric(),
            length: kind.has_length(),
            pattern: kind == ScalarKind::Text,
        }
    }

    /// The subset of `constraints` this shape can honor.
    fn project(self, constraints: &Constraints) -> Constraints {
        Constraints {
            minimum: constraints.minimum.filter(|_| self.numeric),
            maximum: constraints.maximum.filter(|_| self.numeric),
            min_length: constraints.min_length.filter(|_| self.length),
            max_length: constraints.max_length.filter(|_| self.length),
            pattern: constraints.pattern.clone().filter(|_| self.pattern),
            choices: constraints.choices.clone(),
        }
    }

    fn union(self, other: Accepts) -> Accepts {
        Accepts {
            numeric: self.numeric || other.numeric,
            length: self.length || other.length,
            pattern: self.pattern || other.pattern,
        }
    }
}

pub struct TypeResolver<'a> {
    adapters: &'a AdapterSet,
}

impl<'a> TypeResolver<'a> {
    pub fn new(adapters: &'a AdapterSet) -> Self {
        Self { adapters }
    }

    /// Resolve a standalone annotation in a fresh pass.
    pub fn resolve(&self, annotation: &Annotation) -> Result<FieldDescriptor, GenerationError> {
        let mut ctx = ResolutionContext::new();
        self.resolve_node(
            "value",
            annotation,
            Constraints::default(),
            FieldDefault::Absent,
            &mut ctx,
        )
    }

    /// Resolve a model and everything it reaches in a fresh pass.
    pub fn resolve_model(&self, model: &str) -> Result<Arc<ModelDescriptor>, GenerationError> {
        let mut ctx = ResolutionContext::new();
        self.expand_model(model, &mut ctx)
    }

    pub fn resolve_field(
        &self,
        field: &RawField,
        ctx: &mut ResolutionContext,
    ) -> Result<FieldDescriptor, GenerationError> {
        ctx.path.push(field.name.clone());
        let resolved = self.resolve_node(
            &field.name,
            &field.annotation,
            field.constraints.clone(),
            field.default.clone(),
            ctx,
        );
        ctx.path.pop();
        resolved
    }

    fn expand_model(
        &self,
        model: &str,
        ctx: &mut ResolutionContext,
    ) -> Result<Arc<ModelDescriptor>, GenerationError> {
        let raw_fields = self.adapters.extract_fields(model)?;
        ctx.in_progress.push(model.to_string());
        let fields = raw_fields
            .iter()
            .map(|field| self.resolve_field(field, ctx))
            .collect::<Result<Vec<_>, _>>();
        ctx.in_progress.pop();
        Ok(Arc::new(ModelDescriptor {
            name: model.to_string(),
            fields: fields?,
        }))
    }

    fn resolve_node(
        &self,
        name: &str,
        annotation: &Annotation,
        constraints: Constraints,
        default: FieldDefault,
        ctx: &mut ResolutionContext,
    ) -> Result<FieldDescriptor, GenerationError> {
        let descriptor = |shape: Shape, constraints: Constraints, default: FieldDefault| {
            FieldDescriptor {
                name: name.to_string(),
                shape,
                default,
                constraints,
                annotation: annotation.clone(),
            }
        };

        match annotation {
            Annotation::Constrained {
                inner,
                constraints: declared,
            } => {
                let mut resolved =
                    self.resolve_node(name, inner, declared.merged(&constraints), default, ctx)?;
                resolved.annotation = annotation.clone();
                Ok(resolved)
            }
            Annotation::Scalar { kind, tag } => {
                self.check_accepts(Accepts::scalar(*kind), annotation, &constraints, ctx)?;
                let signature = TypeSignature {
                    kind: *kind,
                    tag: tag.clone(),
                };
                Ok(descriptor(Shape::Scalar(signature), constraints, default))
            }
            Annotation::None => {
                self.check_accepts(Accepts::NOTHING, annotation, &constraints, ctx)?;
                Ok(descriptor(Shape::Null, constraints, default))
            }
            Annotation::List(inner) | Annotation::Set(inner) => {
                self.check_accepts(Accepts::LENGTH, annotation, &constraints, ctx)?;
                let item = self.resolve_element("item", inner, ctx)?;
                let shape = if matches!(annotation, Annotation::Set(_)) {
                    Shape::Set(Box::new(item))
                } else {
                    Shape::List(Box::new(item))
                };
                Ok(descriptor(shape, constraints, default))
            }
            Annotation::Map(key, value) => {
                self.check_accepts(Accepts::LENGTH, annotation, &constraints, ctx)?;
                let key = self.resolve_element("key", key, ctx)?;
                let value = self.resolve_element("value", value, ctx)?;
                let shape = Shape::Map {
                    key: Box::new(key),
                    value: Box::new(value),
                };
                Ok(descriptor(shape, constraints, default))
            }
            Annotation::Tuple(members) => {
                self.check_accepts(Accepts::NOTHING, annotation, &constraints, ctx)?;
                if members.is_empty() {
                    return Err(GenerationError::unsupported(
                        annotation,
                        "tuple needs at least one member",
                    ));
                }
                let members = members
                    .iter()
                    .enumerate()
                    .map(|(idx, member)| self.resolve_element(&idx.to_string(), member, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(descriptor(Shape::Tuple(members), constraints, default))
            }
            Annotation::Optional(inner) => {
                let alternatives = self.resolve_alternatives(
                    annotation,
                    std::slice::from_ref(inner.as_ref()),
                    &constraints,
                    ctx,
                )?;
                let shape = Shape::Union {
                    alternatives,
                    nullable: true,
                };
                Ok(descriptor(shape, choices_only(&constraints), default))
            }
            Annotation::Union(members) => {
                let alternatives =
                    self.resolve_alternatives(annotation, members, &constraints, ctx)?;
                let shape = Shape::Union {
                    alternatives,
                    nullable: false,
                };
                Ok(descriptor(shape, choices_only(&constraints), default))
            }
            Annotation::Literal(values) => {
                if values.is_empty() {
                    return Err(GenerationError::unsupported(
                        annotation,
                        "literal needs at least one value",
                    ));
                }
                Ok(descriptor(Shape::Choice(values.clone()), constraints, default))
            }
            Annotation::Model(model) => {
                self.check_accepts(Accepts::NOTHING, annotation, &constraints, ctx)?;
                if ctx.is_in_progress(model) {
                    return Ok(descriptor(Shape::Recursive(model.clone()), constraints, default));
                }
                let resolved = self.expand_model(model, ctx)?;
                Ok(descriptor(Shape::Model(resolved), constraints, default))
            }
        }
    }

    fn resolve_element(
        &self,
        role: &str,
        annotation: &Annotation,
        ctx: &mut ResolutionContext,
    ) -> Result<FieldDescriptor, GenerationError> {
        ctx.path.push(role.to_string());
        let resolved = self.resolve_node(
            role,
            annotation,
            Constraints::default(),
            FieldDefault::Absent,
            ctx,
        );
        ctx.path.pop();
        resolved
    }

    /// Resolve union members, handing each the part of `constraints` it can
    /// honor. A constraint no member can honor is rejected.
    fn resolve_alternatives(
        &self,
        annotation: &Annotation,
        members: &[Annotation],
        constraints: &Constraints,
        ctx: &mut ResolutionContext,
    ) -> Result<Vec<FieldDescriptor>, GenerationError> {
        let mut reach = Accepts::NOTHING;
        let mut alternatives = Vec::with_capacity(members.len());
        for member in members {
            let accepts = accepts_of(member);
            reach = reach.union(accepts);
            let projected = accepts.project(&without_choices(constraints));
            alternatives.push(self.resolve_node(
                &member.to_string(),
                member,
                projected,
                FieldDefault::Absent,
                ctx,
            )?);
        }
        self.check_accepts(reach, annotation, &without_choices(constraints), ctx)?;
        Ok(alternatives)
    }

    fn check_accepts(
        &self,
        accepts: Accepts,
        annotation: &Annotation,
        constraints: &Constraints,
        ctx: &ResolutionContext,
    ) -> Result<(), GenerationError> {
        let offending = if !accepts.numeric && constraints.has_numeric_bounds() {
            Some("minimum/maximum")
        } else if !accepts.length && constraints.has_length_bounds() {
            Some("min_length/max_length")
        } else if !accepts.pattern && constraints.pattern.is_some() {
            Some("pattern")
        } else {
            None
        };
        match offending {
            Some(what) => Err(GenerationError::unsatisfiable(
                ctx.path(),
                format!("{what} does not apply to '{annotation}'"),
            )),
            None => Ok(()),
        }
    }
}

/// Constraint families a member can honor, looking through wrappers.
fn accepts_of(annotation: &Annotation) -> Accepts {
    match annotation {
        Annotation::Scalar { kind, .. } => Accepts::scalar(*kind),
        Annotation::Constrained { inner, .. } => accepts_of(inner),
        Annotation::List(_) | Annotation::Set(_) | Annotation::Map(..) => Accepts::LENGTH,
        Annotation::Literal(_) => Accepts::EVERYTHING,
        Annotation::Optional(inner) => accepts_of(inner),
        Annotation::Union(members) => members
            .iter()
            .map(accepts_of)
            .fold(Accepts::NOTHING, Accepts::union),
        Annotation::None | Annotation::Tuple(_) | Annotation::Model(_) => Accepts::NOTHING,
    }
}

fn without_choices(constraints: &Constraints) -> Constraints {
    Constraints {
        choices: None,
        ..constraints.clone()
    }
}

fn choices_only(constraints: &Constraints) -> Constraints {
    Constraints {
        choices: constraints.choices.clone(),
        ..Constraints::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CatalogAdapter;
    use fabricate_core::{FieldDef, ModelCatalog, ModelDef};

    fn field(name: &str, annotation: &str) -> FieldDef {
        FieldDef::new(name, Annotation::parse(annotation).expect("annotation"))
    }

    fn adapters() -> AdapterSet {
        let catalog = ModelCatalog::new(vec![
            ModelDef::new(
                "Node",
                vec![field("value", "int"), field("children", "list[Node]")],
            ),
            ModelDef::new(
                "Person",
                vec![
                    field("name", "str@name"),
                    field("address", "Address | None"),
                ],
            ),
            ModelDef::new("Address", vec![field("city", "str@city")]),
        ]);
        let mut adapters = AdapterSet::new();
        adapters.push(Arc::new(CatalogAdapter::new(catalog).expect("catalog")));
        adapters
    }

    #[test]
    fn self_reference_becomes_a_recursive_marker() {
        let adapters = adapters();
        let node = TypeResolver::new(&adapters)
            .resolve_model("Node")
            .expect("resolve");
        let children = node.field("children").expect("children");
        let Shape::List(item) = &children.shape else {
            panic!("expected list, got {:?}", children.shape);
        };
        assert!(matches!(&item.shape, Shape::Recursive(name) if name == "Node"));
        assert!(children.contains_recursion());
    }

    #[test]
    fn nested_models_are_expanded() {
        let adapters = adapters();
        let person = TypeResolver::new(&adapters)
            .resolve_model("Person")
            .expect("resolve");
        let address = person.field("address").expect("address");
        let Shape::Union {
            alternatives,
            nullable,
        } = &address.shape
        else {
            panic!("expected union");
        };
        assert!(*nullable);
        assert!(matches!(&alternatives[0].shape, Shape::Model(model) if model.name == "Address"));
    }

    #[test]
    fn unknown_models_are_unsupported() {
        let adapters = adapters();
        let err = TypeResolver::new(&adapters)
            .resolve(&Annotation::parse("list[Ghost]").expect("annotation"))
            .expect_err("unknown model");
        assert!(matches!(err, GenerationError::UnsupportedType { .. }));
    }

    #[test]
    fn inapplicable_constraints_are_rejected() {
        let adapters = adapters();
        let resolver = TypeResolver::new(&adapters);
        for text in [
            "bool(minimum=1)",
            "int(pattern=\"x\")",
            "list[int](maximum=3)",
            "union[int, bool](max_length=2)",
        ] {
            let err = resolver
                .resolve(&Annotation::parse(text).expect("annotation"))
                .expect_err(text);
            assert!(
                matches!(err, GenerationError::UnsatisfiableConstraint { .. }),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn union_constraints_reach_the_members_that_honor_them() {
        let adapters = adapters();
        let resolved = TypeResolver::new(&adapters)
            .resolve(&Annotation::parse("union[int, str](max_length=3, maximum=9)").expect("ann"))
            .expect("resolve");
        let Shape::Union { alternatives, .. } = &resolved.shape else {
            panic!("expected union");
        };
        assert_eq!(alternatives[0].constraints.maximum, Some(9.0));
        assert_eq!(alternatives[0].constraints.max_length, None);
        assert_eq!(alternatives[1].constraints.max_length, Some(3));
        assert_eq!(alternatives[1].constraints.maximum, None);
    }

    #[test]
    fn field_constraints_win_over_annotation_constraints() {
        let adapters = adapters();
        let raw = RawField::parse("count", "int(minimum=0, maximum=100)")
            .expect("field")
            .with_constraints(Constraints {
                maximum: Some(10.0),
                ..Constraints::default()
            });
        let resolved = TypeResolver::new(&adapters)
            .resolve_field(&raw, &mut ResolutionContext::new())
            .expect("resolve");
        assert_eq!(resolved.constraints.minimum, Some(0.0));
        assert_eq!(resolved.constraints.maximum, Some(10.0));
    }
}

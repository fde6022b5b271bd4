//! Walks resolved descriptor trees and produces concrete values.
//!
//! Termination on self-referential models comes from a per-model depth
//! counter: entering a model increments its count, and a `Recursive`
//! reference whose model already reached `max_recursion_depth` is cut to a
//! terminal value (null, an empty container, or another union alternative).
//! Cuts are logged as `recursion_limit` events and counted in the report;
//! they are never errors.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use fabricate_core::{Constraints, Record, Value};
use rand::{Rng, RngCore};

use crate::adapters::AdapterSet;
use crate::descriptor::{FieldDescriptor, ModelDescriptor, Shape, TypeSignature};
use crate::errors::GenerationError;
use crate::limits::{compile_pattern, kind_matches, length_range, satisfies, violation};
use crate::model::{BuildOptions, BuildReport, UnionSelection};
use crate::overrides::{Override, Overrides};
use crate::providers::{ProviderContext, ProviderRegistry};

/// Mutable state of one instance's synthesis. Not shared between instances.
pub struct SynthesisContext<'r> {
    depth: HashMap<String, usize>,
    model_stack: Vec<Arc<ModelDescriptor>>,
    path: Vec<String>,
    use_defaults_for: &'r BTreeSet<String>,
    report: &'r mut BuildReport,
}

impl<'r> SynthesisContext<'r> {
    pub fn new(use_defaults_for: &'r BTreeSet<String>, report: &'r mut BuildReport) -> Self {
        Self {
            depth: HashMap::new(),
            model_stack: Vec::new(),
            path: Vec::new(),
            use_defaults_for,
            report,
        }
    }

    /// Dotted path of the value being synthesized.
    pub fn path(&self) -> String {
        self.path.join(".")
    }

    /// How many times `model` is open on the current path.
    pub fn depth(&self, model: &str) -> usize {
        self.depth.get(model).copied().unwrap_or(0)
    }

    fn child_path(&self, segment: &str) -> String {
        if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{segment}", self.path())
        }
    }

    fn with_segment<T>(
        &mut self,
        segment: impl Into<String>,
        f: impl FnOnce(&mut Self) -> Result<T, GenerationError>,
    ) -> Result<T, GenerationError> {
        self.path.push(segment.into());
        let result = f(self);
        self.path.pop();
        result
    }
}

pub struct ValueSynthesizer<'a> {
    registry: &'a ProviderRegistry,
    adapters: &'a AdapterSet,
    options: &'a BuildOptions,
}

impl<'a> ValueSynthesizer<'a> {
    pub fn new(
        registry: &'a ProviderRegistry,
        adapters: &'a AdapterSet,
        options: &'a BuildOptions,
    ) -> Self {
        Self {
            registry,
            adapters,
            options,
        }
    }

    /// Build one instance of `model`, applying `overrides` to its fields.
    pub fn synthesize_model(
        &self,
        model: &Arc<ModelDescriptor>,
        overrides: &Overrides,
        ctx: &mut SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        for key in overrides.keys() {
            if model.field(key).is_none() {
                return Err(GenerationError::InvalidOverride {
                    path: ctx.child_path(key),
                    reason: format!("model '{}' has no field '{key}'", model.name),
                });
            }
        }

        *ctx.depth.entry(model.name.clone()).or_insert(0) += 1;
        ctx.model_stack.push(Arc::clone(model));
        let record = self.fill_record(model, overrides, ctx, rng);
        ctx.model_stack.pop();
        if let Some(depth) = ctx.depth.get_mut(&model.name) {
            *depth -= 1;
        }

        self.adapters.construct(&model.name, record?)
    }

    fn fill_record(
        &self,
        model: &ModelDescriptor,
        overrides: &Overrides,
        ctx: &mut SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Record, GenerationError> {
        let mut record = Record::new(&model.name);
        for field in &model.fields {
            let value = ctx.with_segment(&field.name, |ctx| match overrides.get(&field.name) {
                Some(entry) => self.apply_override(field, entry, ctx, rng),
                None => self.field_value(field, ctx, rng).map(Some),
            })?;
            if let Some(value) = value {
                record.insert(field.name.clone(), value);
            }
        }
        Ok(record)
    }

    fn apply_override(
        &self,
        field: &FieldDescriptor,
        entry: &Override,
        ctx: &mut SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Option<Value>, GenerationError> {
        ctx.report.record_override();
        match entry {
            Override::Value(value) => Ok(Some(value.clone())),
            Override::Factory(factory) => Ok(Some(factory.produce(rng))),
            Override::Skip => Ok(None),
            Override::Nested(nested) => {
                let target = self.nested_target(field, ctx)?;
                self.synthesize_model(&target, nested, ctx, rng).map(Some)
            }
        }
    }

    /// The model a nested override addresses, looking through unions and
    /// back-references.
    fn nested_target(
        &self,
        field: &FieldDescriptor,
        ctx: &SynthesisContext<'_>,
    ) -> Result<Arc<ModelDescriptor>, GenerationError> {
        let target = match &field.shape {
            Shape::Model(model) => Some(Arc::clone(model)),
            Shape::Recursive(name) => self.ancestor(name, ctx).ok(),
            Shape::Union { alternatives, .. } => {
                alternatives.iter().find_map(|alt| match &alt.shape {
                    Shape::Model(model) => Some(Arc::clone(model)),
                    Shape::Recursive(name) => self.ancestor(name, ctx).ok(),
                    _ => None,
                })
            }
            _ => None,
        };
        target.ok_or_else(|| GenerationError::InvalidOverride {
            path: ctx.path(),
            reason: format!("field of type '{}' does not hold a model", field.annotation),
        })
    }

    fn field_value(
        &self,
        field: &FieldDescriptor,
        ctx: &mut SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        if !field.default.is_absent()
            && (self.options.use_defaults || ctx.use_defaults_for.contains(&ctx.path()))
            && let Some(value) = field.default.resolve()
        {
            ctx.report.record_default_reuse();
            return Ok(value);
        }
        self.synthesize(field, ctx, rng)
    }

    /// Produce a value for any descriptor.
    pub fn synthesize(
        &self,
        descriptor: &FieldDescriptor,
        ctx: &mut SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let constraints = &descriptor.constraints;
        constraints
            .check_consistency()
            .map_err(|reason| GenerationError::unsatisfiable(ctx.path(), reason))?;
        if let Some(pattern) = &constraints.pattern {
            compile_pattern(pattern, &ctx.path())?;
        }

        if let Some(choices) = &constraints.choices
            && !matches!(descriptor.shape, Shape::Choice(_))
        {
            return self.pick_choice(choices, constraints, ctx, rng);
        }

        match &descriptor.shape {
            Shape::Choice(values) => self.pick_choice(values, constraints, ctx, rng),
            Shape::Scalar(signature) => self.scalar(signature, constraints, ctx, rng),
            Shape::Null => Ok(Value::Null),
            Shape::List(item) => self.list(item, constraints, ctx, rng),
            Shape::Set(item) => self.set(item, constraints, ctx, rng),
            Shape::Tuple(members) => {
                let mut items = Vec::with_capacity(members.len());
                for (idx, member) in members.iter().enumerate() {
                    items.push(
                        ctx.with_segment(idx.to_string(), |ctx| self.synthesize(member, ctx, rng))?,
                    );
                }
                Ok(Value::Tuple(items))
            }
            Shape::Map { key, value } => self.map(key, value, constraints, ctx, rng),
            Shape::Union {
                alternatives,
                nullable,
            } => self.union(alternatives, *nullable, ctx, rng),
            Shape::Model(model) => self.synthesize_model(model, &Overrides::new(), ctx, rng),
            Shape::Recursive(name) => {
                if self.exhausted(name, ctx) {
                    self.cut(name, ctx);
                    return Ok(Value::Null);
                }
                let model = self.ancestor(name, ctx)?;
                self.synthesize_model(&model, &Overrides::new(), ctx, rng)
            }
        }
    }

    fn scalar(
        &self,
        signature: &TypeSignature,
        constraints: &Constraints,
        ctx: &mut SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let found = self.registry.lookup(signature, constraints)?;
        let path = ctx.path();
        if found.fallback {
            ctx.report.record_fallback();
            tracing::debug!(
                event = "provider_fallback",
                requested = %signature,
                matched = %found.matched,
                path = %path,
                "provider fallback"
            );
        }
        ctx.report.record_provider_usage(found.provider.id());

        let provider_ctx = ProviderContext {
            signature,
            constraints,
            path: &path,
            locale: self.options.locale,
            max_attempts: self.options.max_constraint_attempts,
        };
        let value = found.provider.generate(&provider_ctx, rng)?;

        let broken = if !kind_matches(signature.kind, &value) {
            Some(format!("returned {} for '{signature}'", value.kind_name()))
        } else {
            violation(&value, constraints)
        };
        match broken {
            Some(reason) => Err(GenerationError::ProviderContract {
                provider: found.provider.id().to_string(),
                path,
                reason,
            }),
            None => Ok(value),
        }
    }

    /// Uniform pick among the candidates that satisfy the other constraints.
    fn pick_choice(
        &self,
        candidates: &[Value],
        constraints: &Constraints,
        ctx: &SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        let allowed = constraints.choices.as_deref();
        let eligible = candidates
            .iter()
            .filter(|value| satisfies(value, constraints))
            .filter(|value| allowed.is_none_or(|allowed| allowed.contains(value)))
            .collect::<Vec<_>>();
        if eligible.is_empty() {
            return Err(GenerationError::unsatisfiable(
                ctx.path(),
                "no allowed value satisfies the declared constraints",
            ));
        }
        Ok(eligible[rng.random_range(0..eligible.len())].clone())
    }

    fn collection_length(
        &self,
        constraints: &Constraints,
        ctx: &SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<usize, GenerationError> {
        let range = length_range(
            constraints,
            self.options.min_collection_length,
            self.options.max_collection_length,
            &ctx.path(),
        )?;
        Ok(rng.random_range(range.min..=range.max))
    }

    fn list(
        &self,
        item: &FieldDescriptor,
        constraints: &Constraints,
        ctx: &mut SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        if let Some(model) = self.blocked(item, ctx) {
            self.cut(&model, ctx);
            return Ok(Value::List(Vec::new()));
        }
        let target = self.collection_length(constraints, ctx, rng)?;
        let mut items = Vec::with_capacity(target);
        for idx in 0..target {
            items.push(ctx.with_segment(idx.to_string(), |ctx| self.synthesize(item, ctx, rng))?);
        }
        Ok(Value::List(items))
    }

    fn set(
        &self,
        item: &FieldDescriptor,
        constraints: &Constraints,
        ctx: &mut SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        if let Some(model) = self.blocked(item, ctx) {
            self.cut(&model, ctx);
            return Ok(Value::Set(Vec::new()));
        }
        let target = self.collection_length(constraints, ctx, rng)?;
        let mut items: Vec<Value> = Vec::with_capacity(target);
        'slots: for idx in 0..target {
            for _ in 0..self.options.max_unique_attempts {
                let candidate =
                    ctx.with_segment(idx.to_string(), |ctx| self.synthesize(item, ctx, rng))?;
                if !items.contains(&candidate) {
                    items.push(candidate);
                    continue 'slots;
                }
            }
            break;
        }
        self.check_distinct(items.len(), target, "set items", ctx)?;
        Ok(Value::Set(items))
    }

    fn map(
        &self,
        key: &FieldDescriptor,
        value: &FieldDescriptor,
        constraints: &Constraints,
        ctx: &mut SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        if let Some(model) = self.blocked(key, ctx).or_else(|| self.blocked(value, ctx)) {
            self.cut(&model, ctx);
            return Ok(Value::Map(Vec::new()));
        }
        let target = self.collection_length(constraints, ctx, rng)?;
        let mut entries: Vec<(Value, Value)> = Vec::with_capacity(target);
        'slots: for idx in 0..target {
            for _ in 0..self.options.max_unique_attempts {
                let candidate = ctx.with_segment(format!("{idx}.key"), |ctx| {
                    self.synthesize(key, ctx, rng)
                })?;
                if entries.iter().any(|(existing, _)| *existing == candidate) {
                    continue;
                }
                let item = ctx.with_segment(idx.to_string(), |ctx| {
                    self.synthesize(value, ctx, rng)
                })?;
                entries.push((candidate, item));
                continue 'slots;
            }
            break;
        }
        self.check_distinct(entries.len(), target, "mapping keys", ctx)?;
        Ok(Value::Map(entries))
    }

    /// A container never comes back shorter than its drawn length.
    fn check_distinct(
        &self,
        found: usize,
        target: usize,
        what: &str,
        ctx: &SynthesisContext<'_>,
    ) -> Result<(), GenerationError> {
        if found < target {
            return Err(GenerationError::unsatisfiable(
                ctx.path(),
                format!(
                    "only {found} distinct {what} after {} attempts, {} required",
                    self.options.max_unique_attempts, target
                ),
            ));
        }
        Ok(())
    }

    fn union(
        &self,
        alternatives: &[FieldDescriptor],
        nullable: bool,
        ctx: &mut SynthesisContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        if nullable
            && self.options.null_probability > 0.0
            && rng.random_bool(self.options.null_probability)
        {
            return Ok(Value::Null);
        }

        let open = alternatives
            .iter()
            .filter(|alt| self.blocked(alt, ctx).is_none())
            .collect::<Vec<_>>();
        let chosen = match (open.as_slice(), self.options.union_selection) {
            ([], _) => {
                if let Some(model) = alternatives.iter().find_map(|alt| self.blocked(alt, ctx)) {
                    self.cut(&model, ctx);
                }
                return Ok(Value::Null);
            }
            ([first, ..], UnionSelection::First) => *first,
            (open, UnionSelection::Random) => open[rng.random_range(0..open.len())],
        };
        self.synthesize(chosen, ctx, rng)
    }

    /// Name of the exhausted model that keeps `descriptor` from being built.
    fn blocked(&self, descriptor: &FieldDescriptor, ctx: &SynthesisContext<'_>) -> Option<String> {
        match &descriptor.shape {
            Shape::Recursive(name) if self.exhausted(name, ctx) => Some(name.clone()),
            Shape::Union {
                alternatives,
                nullable: false,
            } => {
                let mut blocking = None;
                for alt in alternatives {
                    blocking = Some(self.blocked(alt, ctx)?);
                }
                blocking
            }
            _ => None,
        }
    }

    fn exhausted(&self, model: &str, ctx: &SynthesisContext<'_>) -> bool {
        ctx.depth(model) >= self.options.max_recursion_depth
    }

    fn ancestor(
        &self,
        name: &str,
        ctx: &SynthesisContext<'_>,
    ) -> Result<Arc<ModelDescriptor>, GenerationError> {
        ctx.model_stack
            .iter()
            .rev()
            .find(|model| model.name == name)
            .cloned()
            .ok_or_else(|| {
                GenerationError::unsupported(name, "recursive reference outside its own model")
            })
    }

    fn cut(&self, model: &str, ctx: &mut SynthesisContext<'_>) {
        ctx.report.record_recursion_limit();
        tracing::debug!(
            event = "recursion_limit",
            model = %model,
            path = %ctx.path(),
            depth = ctx.depth(model),
            max_depth = self.options.max_recursion_depth,
            "recursion limit reached; using a terminal value"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CatalogAdapter;
    use crate::resolver::TypeResolver;
    use fabricate_core::{Annotation, FieldDef, ModelCatalog, ModelDef};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn field(name: &str, annotation: &str) -> FieldDef {
        FieldDef::new(name, Annotation::parse(annotation).expect("annotation"))
    }

    fn adapters(models: Vec<ModelDef>) -> AdapterSet {
        let mut adapters = AdapterSet::new();
        adapters.push(Arc::new(
            CatalogAdapter::new(ModelCatalog::new(models)).expect("catalog"),
        ));
        adapters
    }

    fn build(
        adapters: &AdapterSet,
        options: &BuildOptions,
        model: &str,
        overrides: &Overrides,
        report: &mut BuildReport,
    ) -> Result<Value, GenerationError> {
        let registry = ProviderRegistry::with_builtins();
        let descriptor = TypeResolver::new(adapters).resolve_model(model)?;
        let synthesizer = ValueSynthesizer::new(&registry, adapters, options);
        let paths = BTreeSet::new();
        let mut ctx = SynthesisContext::new(&paths, report);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        synthesizer.synthesize_model(&descriptor, overrides, &mut ctx, &mut rng)
    }

    fn nesting(value: &Value) -> usize {
        let children = value
            .as_record()
            .and_then(|record| record.get("children"))
            .and_then(Value::as_items)
            .unwrap_or(&[]);
        1 + children.iter().map(nesting).max().unwrap_or(0)
    }

    #[test]
    fn self_referencing_lists_stop_at_the_depth_cap() {
        let adapters = adapters(vec![ModelDef::new(
            "Node",
            vec![field("value", "int"), field("children", "list[Node]")],
        )]);
        let options = BuildOptions {
            max_recursion_depth: 2,
            min_collection_length: 1,
            ..BuildOptions::default()
        };
        let mut report = BuildReport::new("Node", 7);
        let value = build(&adapters, &options, "Node", &Overrides::new(), &mut report)
            .expect("node");
        assert_eq!(nesting(&value), 2);
        assert!(report.recursion_limit_hits > 0);
    }

    #[test]
    fn optional_back_references_become_null_when_cut() {
        let adapters = adapters(vec![ModelDef::new(
            "Employee",
            vec![field("name", "str"), field("manager", "Employee | None")],
        )]);
        let options = BuildOptions {
            max_recursion_depth: 1,
            ..BuildOptions::default()
        };
        let mut report = BuildReport::new("Employee", 7);
        let value = build(&adapters, &options, "Employee", &Overrides::new(), &mut report)
            .expect("employee");
        let record = value.as_record().expect("record");
        assert_eq!(record.get("manager"), Some(&Value::Null));
        assert_eq!(report.recursion_limit_hits, 1);
    }

    #[test]
    fn choices_take_precedence_over_providers() {
        let mut size = field("size", "int");
        size.constraints = Constraints::one_of([Value::Int(3), Value::Int(5)]);
        let adapters = adapters(vec![ModelDef::new("Box", vec![size])]);
        let mut report = BuildReport::new("Box", 7);
        for _ in 0..10 {
            let value = build(
                &adapters,
                &BuildOptions::default(),
                "Box",
                &Overrides::new(),
                &mut report,
            )
            .expect("box");
            let size = value.as_record().and_then(|r| r.get("size")).cloned();
            assert!(matches!(size, Some(Value::Int(3 | 5))), "{size:?}");
        }
    }

    #[test]
    fn unknown_override_keys_are_rejected() {
        let adapters = adapters(vec![ModelDef::new("Tag", vec![field("label", "str")])]);
        let mut overrides = Overrides::new();
        overrides.insert("colour", Value::from("red"));
        let mut report = BuildReport::new("Tag", 7);
        let err = build(&adapters, &BuildOptions::default(), "Tag", &overrides, &mut report)
            .expect_err("unknown key");
        assert!(matches!(err, GenerationError::InvalidOverride { path, .. } if path == "colour"));
    }

    #[test]
    fn declared_set_minimum_beyond_the_domain_fails() {
        let mut flags = field("flags", "set[bool]");
        flags.constraints.min_length = Some(3);
        let adapters = adapters(vec![ModelDef::new("Flags", vec![flags])]);
        let options = BuildOptions {
            max_unique_attempts: 10,
            ..BuildOptions::default()
        };
        let mut report = BuildReport::new("Flags", 7);
        let err = build(&adapters, &options, "Flags", &Overrides::new(), &mut report)
            .expect_err("only two booleans exist");
        assert!(matches!(err, GenerationError::UnsatisfiableConstraint { .. }));
    }

    #[test]
    fn default_window_lengths_beyond_the_key_domain_fail() {
        let adapters = adapters(vec![ModelDef::new(
            "Toggles",
            vec![field("flags", "dict[bool, int]")],
        )]);
        let options = BuildOptions {
            min_collection_length: 3,
            max_collection_length: 3,
            max_unique_attempts: 10,
            ..BuildOptions::default()
        };
        let mut report = BuildReport::new("Toggles", 7);
        let err = build(&adapters, &options, "Toggles", &Overrides::new(), &mut report)
            .expect_err("only two distinct keys exist");
        assert!(matches!(
            err,
            GenerationError::UnsatisfiableConstraint { path, .. } if path == "flags"
        ));
    }

    #[test]
    fn sets_reach_their_drawn_length_when_the_domain_allows() {
        let adapters = adapters(vec![ModelDef::new("Flags", vec![field("flags", "set[bool]")])]);
        let options = BuildOptions {
            min_collection_length: 2,
            max_collection_length: 2,
            ..BuildOptions::default()
        };
        let mut report = BuildReport::new("Flags", 7);
        let value = build(&adapters, &options, "Flags", &Overrides::new(), &mut report)
            .expect("flags");
        let flags = value.as_record().and_then(|r| r.get("flags")).cloned();
        let Some(Value::Set(items)) = flags else {
            panic!("expected a set, got {flags:?}");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn defaults_are_reused_only_for_requested_paths() {
        let mut status = field("status", "str");
        status.default = Some(Value::from("active"));
        let adapters = adapters(vec![ModelDef::new("Account", vec![status])]);
        let registry = ProviderRegistry::with_builtins();
        let options = BuildOptions::default();
        let descriptor = TypeResolver::new(&adapters)
            .resolve_model("Account")
            .expect("resolve");
        let synthesizer = ValueSynthesizer::new(&registry, &adapters, &options);
        let paths = BTreeSet::from(["status".to_string()]);
        let mut report = BuildReport::new("Account", 1);
        let mut ctx = SynthesisContext::new(&paths, &mut report);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let value = synthesizer
            .synthesize_model(&descriptor, &Overrides::new(), &mut ctx, &mut rng)
            .expect("account");
        assert_eq!(
            value.as_record().and_then(|r| r.get("status")),
            Some(&Value::from("active"))
        );
        assert_eq!(report.default_reuses, 1);
    }

    #[test]
    fn misbehaving_providers_are_contract_errors() {
        let adapters = adapters(vec![ModelDef::new("Reading", vec![field("level", "int")])]);
        let mut registry = ProviderRegistry::with_builtins();
        registry.register(
            TypeSignature::new(fabricate_core::ScalarKind::Int),
            crate::providers::from_fn("broken.int", || Value::from("not a number")),
        );
        let options = BuildOptions::default();
        let descriptor = TypeResolver::new(&adapters)
            .resolve_model("Reading")
            .expect("resolve");
        let synthesizer = ValueSynthesizer::new(&registry, &adapters, &options);
        let paths = BTreeSet::new();
        let mut report = BuildReport::new("Reading", 1);
        let mut ctx = SynthesisContext::new(&paths, &mut report);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = synthesizer
            .synthesize_model(&descriptor, &Overrides::new(), &mut ctx, &mut rng)
            .expect_err("contract");
        assert!(matches!(
            err,
            GenerationError::ProviderContract { provider, path, .. }
                if provider == "broken.int" && path == "level"
        ));
    }
}

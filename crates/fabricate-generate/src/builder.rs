use std::sync::Arc;
use std::time::Instant;

use fabricate_core::{Annotation, ModelCatalog, Value};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::adapters::{AdapterSet, CatalogAdapter, Model, ModelAdapter};
use crate::descriptor::ModelDescriptor;
use crate::errors::GenerationError;
use crate::model::{BatchOutcome, BuildOptions, BuildReport, BuildRequest};
use crate::providers::{ProviderRegistry, global_registry};
use crate::resolver::TypeResolver;
use crate::synthesizer::{SynthesisContext, ValueSynthesizer};

/// Top-level orchestrator: extract fields, resolve, synthesize, construct.
///
/// The provider registry is captured when the builder is created (a snapshot
/// of the process-wide registry unless one is supplied), so later
/// `use_provider` calls do not affect builders that already exist.
pub struct ModelBuilder {
    adapters: AdapterSet,
    registry: Arc<ProviderRegistry>,
    options: BuildOptions,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            adapters: AdapterSet::new(),
            registry: global_registry(),
            options: BuildOptions::default(),
        }
    }

    pub fn with_catalog(self, catalog: ModelCatalog) -> Result<Self, GenerationError> {
        Ok(self.with_adapter(Arc::new(CatalogAdapter::new(catalog)?)))
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ModelAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn register_model<T: Model>(mut self) -> Self {
        self.adapters.register_model::<T>();
        self
    }

    pub fn with_options(mut self, options: BuildOptions) -> Result<Self, GenerationError> {
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    pub fn with_registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    /// Resolve `model` into its descriptor tree without synthesizing anything.
    pub fn resolve(&self, model: &str) -> Result<Arc<ModelDescriptor>, GenerationError> {
        TypeResolver::new(&self.adapters).resolve_model(model)
    }

    /// Build one instance. `best_effort` is ignored: the failure itself is
    /// the result.
    pub fn build(&self, model: &str, request: &BuildRequest) -> Result<Value, GenerationError> {
        let strict = request.clone().best_effort(false);
        let outcome = self.run(model, 1, &strict)?;
        outcome
            .instances
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::unsatisfiable(model, "no instance was built"))
    }

    pub fn build_batch(
        &self,
        model: &str,
        count: usize,
        request: &BuildRequest,
    ) -> Result<Vec<Value>, GenerationError> {
        Ok(self.run(model, count, request)?.instances)
    }

    /// Batch build that also returns the diagnostics report. With
    /// `request.best_effort`, failed instances are recorded in the report
    /// instead of failing the call.
    pub fn build_batch_report(
        &self,
        model: &str,
        count: usize,
        request: &BuildRequest,
    ) -> Result<BatchOutcome<Value>, GenerationError> {
        self.run(model, count, request)
    }

    pub fn build_as<T: Model>(&self, request: &BuildRequest) -> Result<T, GenerationError> {
        self.require_typed::<T>()?;
        let value = self.build(T::NAME, request)?;
        Ok(T::from_record(value.into_record()?)?)
    }

    pub fn build_batch_as<T: Model>(
        &self,
        count: usize,
        request: &BuildRequest,
    ) -> Result<Vec<T>, GenerationError> {
        self.require_typed::<T>()?;
        self.build_batch(T::NAME, count, request)?
            .into_iter()
            .map(|value| Ok(T::from_record(value.into_record()?)?))
            .collect()
    }

    /// Synthesize one value for a standalone annotation (`list[int]`,
    /// `str@email`, a model name, ...). Overrides do not apply here.
    pub fn generate(
        &self,
        annotation: &Annotation,
        request: &BuildRequest,
    ) -> Result<Value, GenerationError> {
        let descriptor = TypeResolver::new(&self.adapters).resolve(annotation)?;
        let seed = self.seed_for(request);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut report = BuildReport::new(annotation.to_string(), seed);
        let synthesizer = ValueSynthesizer::new(&self.registry, &self.adapters, &self.options);
        let mut ctx = SynthesisContext::new(&request.use_defaults_for, &mut report);
        synthesizer.synthesize(&descriptor, &mut ctx, &mut rng)
    }

    fn require_typed<T: Model>(&self) -> Result<(), GenerationError> {
        match self.adapters.find(T::NAME) {
            Some(adapter) if adapter.family() == "typed" => Ok(()),
            _ => Err(GenerationError::unsupported(
                T::NAME,
                "typed model is not registered with this builder",
            )),
        }
    }

    fn seed_for(&self, request: &BuildRequest) -> u64 {
        request
            .seed
            .or(self.options.seed)
            .unwrap_or_else(rand::random)
    }

    fn run(
        &self,
        model: &str,
        count: usize,
        request: &BuildRequest,
    ) -> Result<BatchOutcome<Value>, GenerationError> {
        let start = Instant::now();
        let seed = self.seed_for(request);
        let descriptor = self.resolve(model)?;
        let synthesizer = ValueSynthesizer::new(&self.registry, &self.adapters, &self.options);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut report = BuildReport::new(model, seed);
        let mut instances = Vec::with_capacity(count);

        info!(
            model = %model,
            seed,
            count,
            best_effort = request.best_effort,
            "build started"
        );

        for index in 0..count {
            let mut ctx = SynthesisContext::new(&request.use_defaults_for, &mut report);
            let built =
                synthesizer.synthesize_model(&descriptor, &request.overrides, &mut ctx, &mut rng);
            match built {
                Ok(value) => {
                    instances.push(value);
                    report.instances += 1;
                }
                Err(err) if request.best_effort => {
                    warn!(model = %model, index, error = %err, "instance failed; continuing");
                    report.record_failure(index, &err);
                }
                Err(err) => {
                    warn!(model = %model, index, error = %err, "build failed");
                    return Err(err);
                }
            }
        }

        info!(
            model = %model,
            instances = report.instances,
            failures = report.failures.len(),
            fallbacks = report.fallback_count,
            recursion_limit_hits = report.recursion_limit_hits,
            duration_ms = start.elapsed().as_millis() as u64,
            "build completed"
        );

        Ok(BatchOutcome { instances, report })
    }
}

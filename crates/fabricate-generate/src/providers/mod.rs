//! Provider capabilities and the signature-keyed registry that dispatches to them.
//!
//! Lookup falls back from the exact signature through registered category
//! parents to the bare scalar kind. The process-wide registry is a
//! copy-on-write snapshot: builders capture an `Arc` once and never hold a
//! lock while synthesizing.

pub mod primitives;
pub mod semantic;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use fabricate_core::{Constraints, Value};
use rand::RngCore;

use crate::descriptor::TypeSignature;
use crate::errors::GenerationError;
use crate::faker_rs::locales::LocaleKey;

/// What a provider may inspect while producing one value.
#[derive(Debug, Clone, Copy)]
pub struct ProviderContext<'a> {
    /// Signature the caller asked for (not the one that matched).
    pub signature: &'a TypeSignature,
    pub constraints: &'a Constraints,
    /// Dotted field path, for diagnostics.
    pub path: &'a str,
    pub locale: LocaleKey,
    /// Retry budget for providers that re-draw to satisfy constraints.
    pub max_attempts: usize,
}

pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    fn generate(
        &self,
        ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError>;
}

/// Closure-backed provider.
pub struct FnProvider<F> {
    id: String,
    func: F,
}

impl<F> Provider for FnProvider<F>
where
    F: Fn(&ProviderContext<'_>, &mut dyn RngCore) -> Result<Value, GenerationError> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn generate(
        &self,
        ctx: &ProviderContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, GenerationError> {
        (self.func)(ctx, rng)
    }
}

impl<F> fmt::Debug for FnProvider<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProvider").field("id", &self.id).finish()
    }
}

pub fn provider_fn<F>(id: impl Into<String>, func: F) -> FnProvider<F>
where
    F: Fn(&ProviderContext<'_>, &mut dyn RngCore) -> Result<Value, GenerationError> + Send + Sync,
{
    FnProvider {
        id: id.into(),
        func,
    }
}

/// Adapt a zero-argument capability. It sees neither constraints nor the rng,
/// so it must be deterministic on its own for seeded builds to stay stable.
pub fn from_fn<F>(id: impl Into<String>, func: F) -> impl Provider
where
    F: Fn() -> Value + Send + Sync,
{
    provider_fn(id, move |_: &ProviderContext<'_>, _: &mut dyn RngCore| Ok(func()))
}

/// Result of a registry lookup.
pub struct ProviderMatch<'a> {
    pub provider: &'a dyn Provider,
    /// Signature of the entry that answered.
    pub matched: &'a TypeSignature,
    /// True when the answer came from a broader signature than requested.
    pub fallback: bool,
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<TypeSignature, Arc<dyn Provider>>,
    parents: BTreeMap<TypeSignature, TypeSignature>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("parents", &self.parents)
            .finish()
    }
}

impl ProviderRegistry {
    /// Empty registry: every lookup fails until something is registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the primitive providers, numeric categories and the
    /// semantic text providers, registered in that order.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        primitives::register(&mut registry);
        semantic::register(&mut registry);
        registry
    }

    /// Last registration for a signature wins.
    pub fn register(&mut self, signature: TypeSignature, provider: impl Provider + 'static) {
        self.register_arc(signature, Arc::new(provider));
    }

    pub fn register_arc(&mut self, signature: TypeSignature, provider: Arc<dyn Provider>) {
        self.providers.insert(signature, provider);
    }

    /// Declare that `child` specializes `parent`; lookups for `child` fall
    /// back to `parent` (and its own parents) before the bare kind.
    pub fn register_category(
        &mut self,
        child: TypeSignature,
        parent: TypeSignature,
    ) -> Result<(), GenerationError> {
        if child.tag.is_none() {
            return Err(GenerationError::InvalidOptions(format!(
                "category '{child}' must carry a semantic tag"
            )));
        }
        if child.kind != parent.kind {
            return Err(GenerationError::InvalidOptions(format!(
                "category '{child}' cannot specialize '{parent}': kinds differ"
            )));
        }
        let mut cursor = Some(&parent);
        while let Some(signature) = cursor {
            if *signature == child {
                return Err(GenerationError::InvalidOptions(format!(
                    "category '{child}' -> '{parent}' would form a cycle"
                )));
            }
            cursor = self.parents.get(signature);
        }
        self.parents.insert(child, parent);
        Ok(())
    }

    pub fn contains(&self, signature: &TypeSignature) -> bool {
        self.providers.contains_key(signature)
    }

    pub fn lookup(
        &self,
        signature: &TypeSignature,
        constraints: &Constraints,
    ) -> Result<ProviderMatch<'_>, GenerationError> {
        for (candidate, fallback) in self.fallback_chain(signature) {
            if let Some((matched, provider)) = self.providers.get_key_value(&candidate) {
                return Ok(ProviderMatch {
                    provider: provider.as_ref(),
                    matched,
                    fallback,
                });
            }
        }
        Err(GenerationError::ProviderNotFound {
            signature: signature.to_string(),
            constraints: serde_json::to_string(constraints).unwrap_or_default(),
        })
    }

    /// Signatures tried by `lookup`, most specific first.
    pub fn fallback_chain(&self, signature: &TypeSignature) -> Vec<(TypeSignature, bool)> {
        let mut chain = vec![(signature.clone(), false)];
        let mut cursor = self.parents.get(signature);
        while let Some(parent) = cursor {
            if chain.iter().any(|(seen, _)| seen == parent) {
                break;
            }
            chain.push((parent.clone(), true));
            cursor = self.parents.get(parent);
        }
        let base = signature.base();
        if !chain.iter().any(|(seen, _)| *seen == base) {
            chain.push((base, true));
        }
        chain
    }

    /// Registered signatures with the id of the provider answering each.
    pub fn signatures(&self) -> impl Iterator<Item = (&TypeSignature, &str)> {
        self.providers
            .iter()
            .map(|(signature, provider)| (signature, provider.id()))
    }

    pub fn categories(&self) -> impl Iterator<Item = (&TypeSignature, &TypeSignature)> {
        self.parents.iter()
    }
}

static GLOBAL_REGISTRY: OnceLock<RwLock<Arc<ProviderRegistry>>> = OnceLock::new();

fn global() -> &'static RwLock<Arc<ProviderRegistry>> {
    GLOBAL_REGISTRY.get_or_init(|| RwLock::new(Arc::new(ProviderRegistry::with_builtins())))
}

/// Current snapshot of the process-wide registry.
pub fn global_registry() -> Arc<ProviderRegistry> {
    global()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Register a provider process-wide. Builders created afterwards see it;
/// snapshots already captured do not.
pub fn use_provider(signature: TypeSignature, provider: impl Provider + 'static) {
    let mut guard = global().write().unwrap_or_else(PoisonError::into_inner);
    Arc::make_mut(&mut guard).register(signature, provider);
    tracing::debug!(event = "use_provider", "process-wide provider registered");
}

pub fn use_category(child: TypeSignature, parent: TypeSignature) -> Result<(), GenerationError> {
    let mut guard = global().write().unwrap_or_else(PoisonError::into_inner);
    Arc::make_mut(&mut guard).register_category(child, parent)
}

/// Drop every process-wide registration and start over from the built-ins.
pub fn reset_global_registry() {
    let mut guard = global().write().unwrap_or_else(PoisonError::into_inner);
    *guard = Arc::new(ProviderRegistry::with_builtins());
}

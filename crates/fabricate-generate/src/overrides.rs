use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use fabricate_core::Value;
use rand::RngCore;

/// Capability producing an override value from the build's random source.
#[derive(Clone)]
pub struct OverrideFactory(Arc<dyn Fn(&mut dyn RngCore) -> Value + Send + Sync>);

impl OverrideFactory {
    pub fn new(factory: impl Fn(&mut dyn RngCore) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(factory))
    }

    pub fn produce(&self, rng: &mut dyn RngCore) -> Value {
        (self.0)(rng)
    }
}

impl fmt::Debug for OverrideFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OverrideFactory(..)")
    }
}

/// Caller-supplied replacement for one field.
#[derive(Debug, Clone)]
pub enum Override {
    /// Use this value as is.
    Value(Value),
    /// Call the capability instead of a provider.
    Factory(OverrideFactory),
    /// Overrides for fields of the nested model this field holds.
    Nested(Overrides),
    /// Leave the field out so construction applies the declared default.
    Skip,
}

impl From<Value> for Override {
    fn from(value: Value) -> Self {
        Override::Value(value)
    }
}

impl From<Overrides> for Override {
    fn from(nested: Overrides) -> Self {
        Override::Nested(nested)
    }
}

/// Override tree keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    entries: BTreeMap<String, Override>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert at a field name or dotted path (`address.city`).
    ///
    /// Intermediate segments become `Nested` entries, replacing any
    /// non-nested override already there. Later insertions win.
    pub fn insert(&mut self, path: &str, entry: impl Into<Override>) {
        let entry = entry.into();
        match path.split_once('.') {
            None => {
                self.entries.insert(path.to_string(), entry);
            }
            Some((head, rest)) => {
                let slot = self
                    .entries
                    .entry(head.to_string())
                    .or_insert_with(|| Override::Nested(Overrides::new()));
                if !matches!(slot, Override::Nested(_)) {
                    *slot = Override::Nested(Overrides::new());
                }
                if let Override::Nested(nested) = slot {
                    nested.insert(rest, entry);
                }
            }
        }
    }

    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, Override::Value(value.into()));
        self
    }

    pub fn with_factory(
        mut self,
        path: &str,
        factory: impl Fn(&mut dyn RngCore) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.insert(path, Override::Factory(OverrideFactory::new(factory)));
        self
    }

    pub fn nested(mut self, path: &str, nested: Overrides) -> Self {
        self.insert(path, Override::Nested(nested));
        self
    }

    pub fn skip(mut self, path: &str) -> Self {
        self.insert(path, Override::Skip);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Override> {
        self.entries.get(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

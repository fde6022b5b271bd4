use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::annotation::Annotation;
use crate::constraints::Constraints;
use crate::error::Result;
use crate::field::{FieldDefault, RawField};
use crate::value::Value;

/// A set of schema-described structured types.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModelCatalog {
    /// Contract version for this catalog format.
    #[serde(default = "default_catalog_version")]
    pub catalog_version: String,
    /// Declared models, looked up by name.
    pub models: Vec<ModelDef>,
}

/// A structured type with ordered field declarations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModelDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
}

/// Field declaration inside a catalog model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FieldDef {
    pub name: String,
    /// Type annotation in the textual grammar (e.g. `list[int]`).
    #[serde(rename = "type")]
    pub annotation: Annotation,
    /// Declared default. An explicit `null` is a null default; an absent key
    /// means the field has no default.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
}

fn default_catalog_version() -> String {
    crate::CATALOG_VERSION.to_string()
}

fn present_value<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelDef>) -> Self {
        Self {
            catalog_version: default_catalog_version(),
            models,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn model(&self, name: &str) -> Option<&ModelDef> {
        self.models.iter().find(|model| model.name == name)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|model| model.name.as_str())
    }
}

impl ModelDef {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields,
        }
    }

    /// Fields in declaration order, in the adapter-hook shape.
    pub fn raw_fields(&self) -> Vec<RawField> {
        self.fields.iter().map(FieldDef::to_raw).collect()
    }
}

impl FieldDef {
    pub fn new(name: impl Into<String>, annotation: Annotation) -> Self {
        Self {
            name: name.into(),
            annotation,
            default: None,
            constraints: Constraints::default(),
        }
    }

    pub fn to_raw(&self) -> RawField {
        RawField {
            name: self.name.clone(),
            annotation: self.annotation.clone(),
            default: match &self.default {
                Some(value) => FieldDefault::Value(value.clone()),
                None => FieldDefault::Absent,
            },
            constraints: self.constraints.clone(),
        }
    }
}

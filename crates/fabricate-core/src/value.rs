use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A synthesized (or caller-supplied) value.
///
/// Containers keep insertion order so that a seeded build serializes to the
/// same bytes every time. `Set` holds mutually distinct items and `Map` holds
/// mutually distinct keys; both are ordered vectors rather than hash-based
/// collections because `Float` is not hashable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    Set(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Record(Record),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "dict",
            Value::Record(_) => "record",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Items of a sequence-shaped value (list, set or tuple).
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_entries(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Result<Record> {
        match self {
            Value::Record(record) => Ok(record),
            other => Err(Error::Conversion(format!(
                "expected record, found {}",
                other.kind_name()
            ))),
        }
    }

    /// Length as seen by length constraints: characters for text, bytes for
    /// binary, items or entries for containers.
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::Text(value) => Some(value.chars().count()),
            Value::Bytes(value) => Some(value.len()),
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }

    /// Convert into a JSON document.
    ///
    /// Maps whose keys are all text become JSON objects; any other map becomes
    /// an array of `[key, value]` pairs. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Int(value) => serde_json::Value::Number((*value).into()),
            Value::Float(value) => Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(value) => serde_json::Value::String(value.clone()),
            Value::Bytes(value) => serde_json::Value::Array(
                value
                    .iter()
                    .map(|byte| serde_json::Value::Number((*byte).into()))
                    .collect(),
            ),
            Value::Uuid(value) => serde_json::Value::String(value.to_string()),
            Value::Date(value) => serde_json::Value::String(value.format("%Y-%m-%d").to_string()),
            Value::Time(value) => serde_json::Value::String(value.format("%H:%M:%S").to_string()),
            Value::DateTime(value) => {
                serde_json::Value::String(value.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => {
                if entries.iter().all(|(key, _)| matches!(key, Value::Text(_))) {
                    let mut map = Map::new();
                    for (key, value) in entries {
                        if let Value::Text(key) = key {
                            map.insert(key.clone(), value.to_json());
                        }
                    }
                    serde_json::Value::Object(map)
                } else {
                    serde_json::Value::Array(
                        entries
                            .iter()
                            .map(|(key, value)| {
                                serde_json::Value::Array(vec![key.to_json(), value.to_json()])
                            })
                            .collect(),
                    )
                }
            }
            Value::Record(record) => {
                let mut map = Map::new();
                for (name, value) in record.iter() {
                    map.insert(name.to_string(), value.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }

    /// Build a value from a JSON document (used for declared defaults,
    /// literal choices and CLI overrides). Objects become text-keyed maps.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(*value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Value::Int(value),
                None => Value::Float(number.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(value) => Value::Text(value.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(key, value)| (Value::Text(key.clone()), Value::from_json(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(|value| Value::from_json(&value))
    }
}

impl JsonSchema for Value {
    fn schema_name() -> String {
        "Value".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        serde_json::Value::json_schema(generator)
    }
}

/// Field values of one structured instance, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    model: String,
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fields: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Insert or replace a field value, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(field, _)| *field == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn take(&mut self, name: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(field, _)| field == name)?;
        Some(self.fields.remove(idx).1)
    }

    /// Remove a field and convert it, failing when it is missing or mistyped.
    pub fn take_as<T: FromValue>(&mut self, name: &str) -> Result<T> {
        let value = self.take(name).ok_or_else(|| {
            Error::Conversion(format!("{}: missing field '{name}'", self.model))
        })?;
        T::from_value(value)
            .map_err(|err| Error::Conversion(format!("{}.{name}: {err}", self.model)))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Conversion from a synthesized [`Value`] into a concrete Rust type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &str, found: &Value) -> Error {
    Error::Conversion(format!("expected {expected}, found {}", found.kind_name()))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for Record {
    fn from_value(value: Value) -> Result<Self> {
        value.into_record()
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", &value))
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("int", &value))
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        let raw = i64::from_value(value)?;
        i32::try_from(raw).map_err(|_| Error::Conversion(format!("{raw} does not fit i32")))
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Result<Self> {
        let raw = i64::from_value(value)?;
        u32::try_from(raw).map_err(|_| Error::Conversion(format!("{raw} does not fit u32")))
    }
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self> {
        let raw = i64::from_value(value)?;
        u64::try_from(raw).map_err(|_| Error::Conversion(format!("{raw} does not fit u64")))
    }
}

impl FromValue for usize {
    fn from_value(value: Value) -> Result<Self> {
        let raw = i64::from_value(value)?;
        usize::try_from(raw).map_err(|_| Error::Conversion(format!("{raw} does not fit usize")))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("float", &value))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(value) => Ok(value),
            other => Err(mismatch("str", &other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(value) => Ok(value),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(value) => Ok(value),
            other => Err(mismatch("date", &other)),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Time(value) => Ok(value),
            other => Err(mismatch("time", &other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(value) => Ok(value),
            other => Err(mismatch("datetime", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
                items.into_iter().map(T::from_value).collect()
            }
            other => Err(mismatch("list", &other)),
        }
    }
}

impl<T: FromValue + Ord> FromValue for BTreeSet<T> {
    fn from_value(value: Value) -> Result<Self> {
        Vec::<T>::from_value(value).map(|items| items.into_iter().collect())
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(key, value)| Ok((K::from_value(key)?, V::from_value(value)?)))
                .collect(),
            other => Err(mismatch("dict", &other)),
        }
    }
}

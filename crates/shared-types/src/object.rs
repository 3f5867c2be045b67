//! # Opaque Store Documents
//!
//! Store objects are schema-less JSON documents. The gateway passes them
//! through untouched, so they are modelled as a JSON map rather than a
//! fixed struct.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Operation options (`getOptions`, `listOptions`, ...).
///
/// Opaque to the gateway: pagination, selectors and the like are forwarded
/// to the store as-is.
pub type Options = Map<String, Value>;

/// The value was not a JSON object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("expected a JSON object, found {found}")]
pub struct NotAnObject {
    /// JSON type that was found instead.
    pub found: &'static str,
}

/// A single store object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(Map<String, Value>);

impl Object {
    /// Create an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutably borrow the underlying map.
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Consume into the underlying map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Top-level field lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// `metadata.name`, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.metadata_str("name")
    }

    /// `metadata.namespace`, if present.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace")
    }

    /// `kind`, if present.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    /// Set a string field under `metadata`, creating `metadata` if needed.
    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        let metadata = self
            .0
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Value::Object(map) = metadata {
            map.insert(key.to_string(), Value::String(value.into()));
        }
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.0.get("metadata")?.get(key)?.as_str()
    }
}

impl From<Map<String, Value>> for Object {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object.0)
    }
}

impl TryFrom<Value> for Object {
    type Error = NotAnObject;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(NotAnObject {
                found: json_type(&other),
            }),
        }
    }
}

/// A collection of store objects, as returned by a list call.
///
/// Carries the list-level fields (`apiVersion`, `kind`, `metadata`, ...)
/// next to `items` so pagination tokens survive the round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectList {
    /// Everything except `items`.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// The listed objects.
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub items: Vec<Object>,
}

impl ObjectList {
    /// Build a list document around `items`.
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>, items: Vec<Object>) -> Self {
        let mut fields = Map::new();
        fields.insert("apiVersion".into(), Value::String(api_version.into()));
        fields.insert("kind".into(), Value::String(kind.into()));
        fields.insert("metadata".into(), Value::Object(Map::new()));
        Self { fields, items }
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

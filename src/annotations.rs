//! Per-node annotation map.
//!
//! Annotations are plain key/value metadata. This crate reads three keys:
//! the hook [`AnnotationId::Identifier`], the refinement [`AnnotationId::TypeId`]
//! and the JSON-schema-shaped [`AnnotationId::JsonSchema`] bounds.
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnnotationId {
    Identifier,
    TypeId,
    JsonSchema,
    Custom(String),
}

/// The refinement kinds constraint extraction understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypeId {
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    Int,
    MinLength,
    MaxLength,
    Pattern,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Annotations {
    entries: IndexMap<AnnotationId, Value>,
}

impl Annotations {
    pub fn new() -> Self { Self::default() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn get(&self, id: &AnnotationId) -> Option<&Value> { self.entries.get(id) }

    pub fn insert(&mut self, id: AnnotationId, value: Value) {
        self.entries.insert(id, value);
    }

    pub fn with(mut self, id: AnnotationId, value: Value) -> Self {
        self.insert(id, value);
        self
    }

    pub fn with_identifier(self, identifier: impl Into<String>) -> Self {
        self.with(AnnotationId::Identifier, Value::String(identifier.into()))
    }

    pub fn identifier(&self) -> Option<&str> {
        self.get(&AnnotationId::Identifier).and_then(Value::as_str)
    }

    /// Unknown type ids read as absent.
    pub fn type_id(&self) -> Option<TypeId> {
        self.get(&AnnotationId::TypeId)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn json_schema(&self) -> Option<&Map<String, Value>> {
        self.get(&AnnotationId::JsonSchema).and_then(Value::as_object)
    }

    /// First of `keys` present in the JSON-schema annotation, as a number.
    pub fn json_schema_number(&self, keys: &[&str]) -> Option<f64> {
        let js = self.json_schema()?;
        keys.iter().find_map(|k| js.get(*k).and_then(Value::as_f64))
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationId::Identifier => f.write_str("identifier"),
            AnnotationId::TypeId => f.write_str("type-id"),
            AnnotationId::JsonSchema => f.write_str("json-schema"),
            AnnotationId::Custom(name) => f.write_str(name),
        }
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_accessors_read_back() {
        let a = Annotations::new()
            .with_identifier("Uuid")
            .with(AnnotationId::TypeId, json!("greater-than-or-equal-to"))
            .with(AnnotationId::JsonSchema, json!({"minimum": 3}));
        assert_eq!(a.identifier(), Some("Uuid"));
        assert_eq!(a.type_id(), Some(TypeId::GreaterThanOrEqualTo));
        assert_eq!(a.json_schema_number(&["exclusiveMinimum", "minimum"]), Some(3.0));
    }

    #[test]
    fn unknown_type_id_is_absent() {
        let a = Annotations::new().with(AnnotationId::TypeId, json!("multiple-of"));
        assert_eq!(a.type_id(), None);
        assert!(Annotations::new().is_empty());
    }
}

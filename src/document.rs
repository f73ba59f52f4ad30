//! Schema documents: a JSON form of the AST for the command line.
//!
//! ```json
//! {
//!   "definitions": {
//!     "List": { "type": "union", "members": [
//!       { "type": "literal", "value": null },
//!       { "type": "struct", "properties": [
//!         { "name": "value", "schema": { "type": "number" } },
//!         { "name": "next", "schema": { "type": "ref", "name": "List" } }
//!       ] }
//!     ] }
//!   },
//!   "root": { "type": "ref", "name": "List" }
//! }
//! ```
//!
//! Every definition becomes one lazy node with a stable id, annotated with
//! the definition name as its identifier, so hooks can target definitions by
//! name and recursion through `ref` is memoized like any other lazy schema.
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::annotations::{AnnotationId, Annotations};
use crate::ast::{Ast, Element, IndexSignature, LazyId, Literal, Placeholder, PropertySignature, TemplateSpan};
use crate::error::DocumentError;
use crate::filters;

// ------------------------------- Format ---------------------------------- //

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub definitions: IndexMap<String, SchemaNode>,
    pub root: SchemaNode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SchemaNode {
    Undefined,
    Void,
    Never,
    Unknown,
    Any,
    String,
    Number,
    Boolean,
    Bigint,
    Symbol,
    Object,
    Literal { value: Scalar },
    UniqueSymbol { key: String },
    TemplateLiteral {
        #[serde(default)]
        head: String,
        #[serde(default)]
        spans: Vec<SpanNode>,
    },
    Tuple {
        #[serde(default)]
        elements: Vec<ElementNode>,
        #[serde(default)]
        rest: Vec<SchemaNode>,
    },
    Array { items: Box<SchemaNode> },
    Struct {
        #[serde(default)]
        properties: Vec<PropertyNode>,
        #[serde(default)]
        index_signatures: Vec<IndexNode>,
    },
    Record { key: Box<SchemaNode>, value: Box<SchemaNode> },
    Union { members: Vec<SchemaNode> },
    Enums { members: Vec<EnumMember> },
    Ref { name: String },
    Refine { schema: Box<SchemaNode>, filters: Vec<Filter> },
    Declaration {
        identifier: String,
        #[serde(default)]
        underlying: Option<Box<SchemaNode>>,
        #[serde(default)]
        type_parameters: Vec<SchemaNode>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null(()),
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaceholderNode {
    String,
    Number,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpanNode {
    pub placeholder: PlaceholderNode,
    #[serde(default)]
    pub literal: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementNode {
    pub schema: SchemaNode,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyNode {
    pub name: String,
    pub schema: SchemaNode,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexNode {
    pub key: SchemaNode,
    pub value: SchemaNode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnumMember {
    pub label: String,
    pub value: Scalar,
}

/// Applied in order, innermost first.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Filter {
    GreaterThan { value: f64 },
    GreaterThanOrEqualTo { value: f64 },
    LessThan { value: f64 },
    LessThanOrEqualTo { value: f64 },
    Between { min: f64, max: f64 },
    Int,
    MinLength { value: usize },
    MaxLength { value: usize },
    Pattern { regex: String },
    Uuid,
}

// ------------------------------- Parsing --------------------------------- //

/// Deserialize with the JSON path of the failure in the error.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, DocumentError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| DocumentError::Parse {
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    })
}

pub fn parse(src: &str) -> Result<Ast, DocumentError> {
    from_str_with_path::<SchemaDocument>(src)?.into_ast()
}

pub fn load(path: impl AsRef<Path>) -> Result<Ast, DocumentError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "loading schema document");
    parse(&std::fs::read_to_string(path)?)
}

// ------------------------------- Lowering -------------------------------- //

type Table = Arc<OnceLock<HashMap<String, Ast>>>;

struct Lowering {
    ids: HashMap<String, LazyId>,
    table: Table,
}

impl SchemaDocument {
    pub fn into_ast(self) -> Result<Ast, DocumentError> {
        let lowering = Lowering {
            ids: self.definitions.keys().map(|name| (name.clone(), LazyId::fresh())).collect(),
            table: Arc::new(OnceLock::new()),
        };
        let mut table = HashMap::with_capacity(self.definitions.len());
        for (name, node) in &self.definitions {
            table.insert(name.clone(), lowering.lower(node)?);
        }
        let root = lowering.lower(&self.root)?;
        let _ = lowering.table.set(table);
        Ok(root)
    }
}

impl Lowering {
    fn lower_all(&self, nodes: &[SchemaNode]) -> Result<Vec<Ast>, DocumentError> {
        nodes.iter().map(|n| self.lower(n)).collect()
    }

    fn lower(&self, node: &SchemaNode) -> Result<Ast, DocumentError> {
        Ok(match node {
            SchemaNode::Undefined => Ast::undefined(),
            SchemaNode::Void => Ast::void(),
            SchemaNode::Never => Ast::never(),
            SchemaNode::Unknown => Ast::unknown(),
            SchemaNode::Any => Ast::any(),
            SchemaNode::String => Ast::string(),
            SchemaNode::Number => Ast::number(),
            SchemaNode::Boolean => Ast::boolean(),
            SchemaNode::Bigint => Ast::bigint(),
            SchemaNode::Symbol => Ast::symbol(),
            SchemaNode::Object => Ast::object(),
            SchemaNode::Literal { value } => Ast::literal(value.to_literal()),
            SchemaNode::UniqueSymbol { key } => Ast::unique_symbol(key),
            SchemaNode::TemplateLiteral { head, spans } => Ast::template_literal(
                head.clone(),
                spans
                    .iter()
                    .map(|s| {
                        let placeholder = match s.placeholder {
                            PlaceholderNode::String => Placeholder::String,
                            PlaceholderNode::Number => Placeholder::Number,
                        };
                        TemplateSpan::new(placeholder, s.literal.clone())
                    })
                    .collect(),
            ),
            SchemaNode::Tuple { elements, rest } => {
                let elements = elements
                    .iter()
                    .map(|e| {
                        let ty = self.lower(&e.schema)?;
                        Ok(if e.optional { Element::optional(ty) } else { Element::required(ty) })
                    })
                    .collect::<Result<Vec<_>, DocumentError>>()?;
                Ast::tuple_with_rest(elements, self.lower_all(rest)?)
            }
            SchemaNode::Array { items } => Ast::array(self.lower(items)?),
            SchemaNode::Struct { properties, index_signatures } => {
                let properties = properties
                    .iter()
                    .map(|p| {
                        let ty = self.lower(&p.schema)?;
                        Ok(if p.optional {
                            PropertySignature::optional(p.name.as_str(), ty)
                        } else {
                            PropertySignature::required(p.name.as_str(), ty)
                        })
                    })
                    .collect::<Result<Vec<_>, DocumentError>>()?;
                let index_signatures = index_signatures
                    .iter()
                    .map(|is| Ok(IndexSignature { parameter: self.lower(&is.key)?, value: self.lower(&is.value)? }))
                    .collect::<Result<Vec<_>, DocumentError>>()?;
                Ast::type_literal(properties, index_signatures)
            }
            SchemaNode::Record { key, value } => Ast::record(self.lower(key)?, self.lower(value)?),
            SchemaNode::Union { members } => Ast::union(self.lower_all(members)?),
            SchemaNode::Enums { members } => Ast::new(crate::ast::AstKind::Enums(
                members.iter().map(|m| (m.label.clone(), m.value.to_literal())).collect(),
            )),
            SchemaNode::Ref { name } => self.reference(name)?,
            SchemaNode::Refine { schema, filters } => {
                let mut ast = self.lower(schema)?;
                for filter in filters {
                    ast = filter.apply(ast)?;
                }
                ast
            }
            SchemaNode::Declaration { identifier, underlying, type_parameters } => Ast::declaration(
                underlying.as_deref().map(|u| self.lower(u)).transpose()?,
                self.lower_all(type_parameters)?,
                Annotations::new().with_identifier(identifier.as_str()),
            ),
        })
    }

    fn reference(&self, name: &str) -> Result<Ast, DocumentError> {
        let id = *self.ids.get(name).ok_or_else(|| DocumentError::UnknownDefinition(name.to_string()))?;
        let table = self.table.clone();
        let key = name.to_string();
        let lazy = Ast::lazy_with_id(id, move || {
            table.get().and_then(|t| t.get(&key)).cloned().unwrap_or_else(Ast::never)
        });
        Ok(lazy.annotate(AnnotationId::Identifier, serde_json::Value::String(name.to_string())))
    }
}

impl Scalar {
    fn to_literal(&self) -> Literal {
        match self {
            Scalar::Null(()) => Literal::Null,
            Scalar::Bool(b) => Literal::from(*b),
            Scalar::Number(n) => Literal::from(*n),
            Scalar::String(s) => Literal::from(s.as_str()),
        }
    }
}

impl Filter {
    fn apply(&self, from: Ast) -> Result<Ast, DocumentError> {
        Ok(match self {
            Filter::GreaterThan { value } => filters::greater_than(from, *value),
            Filter::GreaterThanOrEqualTo { value } => filters::greater_than_or_equal_to(from, *value),
            Filter::LessThan { value } => filters::less_than(from, *value),
            Filter::LessThanOrEqualTo { value } => filters::less_than_or_equal_to(from, *value),
            Filter::Between { min, max } => filters::between(from, *min, *max),
            Filter::Int => filters::int(from),
            Filter::MinLength { value } => filters::min_length(from, *value),
            Filter::MaxLength { value } => filters::max_length(from, *value),
            Filter::Pattern { regex } => {
                let compiled = Regex::new(regex)
                    .map_err(|source| DocumentError::InvalidPattern { pattern: regex.clone(), source })?;
                filters::pattern(from, compiled)
            }
            Filter::Uuid => filters::uuid(from),
        })
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstKind;
    use crate::guard::{Acceptor, StructuralGuard};
    use crate::value::Value;

    const LIST: &str = r#"{
        "definitions": {
            "List": { "type": "union", "members": [
                { "type": "literal", "value": null },
                { "type": "struct", "properties": [
                    { "name": "value", "schema": { "type": "refine", "schema": { "type": "number" },
                      "filters": [{ "kind": "int" }, { "kind": "between", "min": 0, "max": 9 }] } },
                    { "name": "next", "schema": { "type": "ref", "name": "List" } }
                ] }
            ] }
        },
        "root": { "type": "ref", "name": "List" }
    }"#;

    #[test]
    fn recursive_document_drives_every_compiler() {
        let ast = parse(LIST).unwrap();
        assert_eq!(ast.annotations().identifier(), Some("List"));
        let samples = crate::compile_generator(&ast).unwrap().samples(3, 100).unwrap();
        let guard = StructuralGuard::new();
        assert!(samples.iter().all(|v| guard.accepts(&ast, v)));

        let v = Value::object([("value", Value::Number(1.0)), ("next", Value::Null)]);
        assert_eq!(crate::compile_encoder(&ast).unwrap().encode(&v).unwrap(), v);
        assert_eq!(crate::compile_renderer(&ast).unwrap().render(&v).unwrap(), "{ value: 1, next: null }");
    }

    #[test]
    fn refs_to_the_same_definition_share_an_id() {
        let ast = parse(r#"{
            "definitions": { "N": { "type": "number" } },
            "root": { "type": "tuple", "elements": [
                { "schema": { "type": "ref", "name": "N" } },
                { "schema": { "type": "ref", "name": "N" } }
            ] }
        }"#)
        .unwrap();
        let AstKind::Tuple(t) = ast.kind() else { panic!("expected tuple") };
        let ids: Vec<_> = t.elements.iter().map(|e| match e.ty.kind() {
            AstKind::Lazy(l) => l.id,
            other => panic!("expected lazy, got {}", other.name()),
        }).collect();
        assert_eq!(ids[0], ids[1]);
    }

    #[test]
    fn unknown_references_are_reported() {
        let err = parse(r#"{ "root": { "type": "ref", "name": "Missing" } }"#).unwrap_err();
        assert!(matches!(err, DocumentError::UnknownDefinition(name) if name == "Missing"));
    }

    #[test]
    fn parse_errors_carry_a_path() {
        let err = parse(r#"{ "definitions": [], "root": { "type": "string" } }"#).unwrap_err();
        let DocumentError::Parse { path, .. } = err else { panic!("expected parse error") };
        assert_eq!(path, "definitions");
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let err = parse(r#"{ "root": { "type": "refine", "schema": { "type": "string" },
            "filters": [{ "kind": "pattern", "regex": "(" }] } }"#)
        .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidPattern { .. }));
    }

    #[test]
    fn scalar_literals_and_enums() {
        let ast = parse(r#"{ "root": { "type": "enums", "members": [
            { "label": "Off", "value": 0 }, { "label": "On", "value": "on" }, { "label": "Unset", "value": null }
        ] } }"#)
        .unwrap();
        let AstKind::Enums(members) = ast.kind() else { panic!("expected enums") };
        assert_eq!(members[1], ("On".to_string(), Literal::from("on")));
        assert_eq!(members[2].1, Literal::Null);
    }
}

//! The schema AST every compiler walks.
//!
//! `Ast` is an immutable, cheaply clonable handle. Recursive schemas are
//! expressed through [`Lazy`] nodes whose identity is a [`LazyId`]: two lazy
//! nodes with the same id denote the same schema, which is what lets a
//! compiler memoize them.
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ordered_float::OrderedFloat;

use crate::annotations::{AnnotationId, Annotations};
use crate::value::{PropertyKey, Symbol, Value};

#[derive(Clone)]
pub struct Ast(Arc<Node>);

#[derive(Debug)]
pub struct Node {
    pub kind: AstKind,
    pub annotations: Annotations,
}

#[derive(Clone, Debug)]
pub enum AstKind {
    Literal(Literal),
    UniqueSymbol(Symbol),
    Keyword(Keyword),
    TemplateLiteral(TemplateLiteral),
    Tuple(Tuple),
    TypeLiteral(TypeLiteral),
    Union(Vec<Ast>),
    Lazy(Lazy),
    Enums(Vec<(String, Literal)>),
    Refinement(Refinement),
    Declaration(Declaration),
    Transform(Transform),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    String(String),
    Number(OrderedFloat<f64>),
    Bool(bool),
    Null,
    BigInt(i128),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    Undefined,
    Void,
    Never,
    Unknown,
    Any,
    String,
    Number,
    Boolean,
    BigInt,
    Symbol,
    Object,
}

#[derive(Clone, Debug)]
pub struct TemplateLiteral {
    pub head: String,
    pub spans: Vec<TemplateSpan>,
}

#[derive(Clone, Debug)]
pub struct TemplateSpan {
    pub placeholder: Placeholder,
    pub literal: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placeholder {
    String,
    Number,
}

#[derive(Clone, Debug)]
pub struct Tuple {
    pub elements: Vec<Element>,
    /// `rest[0]` is the variadic element; `rest[1..]` are fixed post-rest
    /// elements. Never empty when present.
    pub rest: Option<Vec<Ast>>,
}

#[derive(Clone, Debug)]
pub struct Element {
    pub ty: Ast,
    pub is_optional: bool,
}

#[derive(Clone, Debug)]
pub struct TypeLiteral {
    pub property_signatures: Vec<PropertySignature>,
    pub index_signatures: Vec<IndexSignature>,
}

#[derive(Clone, Debug)]
pub struct PropertySignature {
    pub name: PropertyKey,
    pub ty: Ast,
    pub is_optional: bool,
}

#[derive(Clone, Debug)]
pub struct IndexSignature {
    pub parameter: Ast,
    pub value: Ast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LazyId(u64);

#[derive(Clone)]
pub struct Lazy {
    pub id: LazyId,
    resolve: Arc<dyn Fn() -> Ast + Send + Sync>,
}

/// Result of a refinement predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Accepted,
    Rejected(String),
}

pub type Predicate = Arc<dyn Fn(&Value) -> Outcome + Send + Sync>;

#[derive(Clone)]
pub struct Refinement {
    pub from: Ast,
    pub predicate: Predicate,
}

#[derive(Clone, Debug)]
pub struct Declaration {
    /// `None` for opaque declarations, which only a hook can compile.
    pub underlying: Option<Ast>,
    pub type_parameters: Vec<Ast>,
}

#[derive(Clone, Debug)]
pub struct Transform {
    pub from: Ast,
    pub to: Ast,
}

// ------------------------------ Handles ---------------------------------- //

impl Ast {
    pub fn new(kind: AstKind) -> Self { Self::annotated(kind, Annotations::new()) }

    pub fn annotated(kind: AstKind, annotations: Annotations) -> Self {
        Ast(Arc::new(Node { kind, annotations }))
    }

    pub fn kind(&self) -> &AstKind { &self.0.kind }

    pub fn annotations(&self) -> &Annotations { &self.0.annotations }

    /// A copy of this node with one more annotation.
    pub fn annotate(&self, id: AnnotationId, value: serde_json::Value) -> Self {
        Self::annotated(self.0.kind.clone(), self.0.annotations.clone().with(id, value))
    }

    pub fn kind_name(&self) -> &'static str { self.0.kind.name() }
}

impl fmt::Debug for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.annotations.is_empty() {
            fmt::Debug::fmt(&self.0.kind, f)
        } else {
            fmt::Debug::fmt(&self.0, f)
        }
    }
}

impl AstKind {
    pub fn name(&self) -> &'static str {
        match self {
            AstKind::Literal(_) => "Literal",
            AstKind::UniqueSymbol(_) => "UniqueSymbol",
            AstKind::Keyword(k) => k.name(),
            AstKind::TemplateLiteral(_) => "TemplateLiteral",
            AstKind::Tuple(_) => "Tuple",
            AstKind::TypeLiteral(_) => "TypeLiteral",
            AstKind::Union(_) => "Union",
            AstKind::Lazy(_) => "Lazy",
            AstKind::Enums(_) => "Enums",
            AstKind::Refinement(_) => "Refinement",
            AstKind::Declaration(_) => "Declaration",
            AstKind::Transform(_) => "Transform",
        }
    }
}

impl Keyword {
    pub fn name(self) -> &'static str {
        match self {
            Keyword::Undefined => "UndefinedKeyword",
            Keyword::Void => "VoidKeyword",
            Keyword::Never => "NeverKeyword",
            Keyword::Unknown => "UnknownKeyword",
            Keyword::Any => "AnyKeyword",
            Keyword::String => "StringKeyword",
            Keyword::Number => "NumberKeyword",
            Keyword::Boolean => "BooleanKeyword",
            Keyword::BigInt => "BigIntKeyword",
            Keyword::Symbol => "SymbolKeyword",
            Keyword::Object => "ObjectKeyword",
        }
    }
}

// ----------------------------- Constructors ------------------------------ //

impl Ast {
    fn keyword(k: Keyword) -> Self { Self::new(AstKind::Keyword(k)) }

    pub fn undefined() -> Self { Self::keyword(Keyword::Undefined) }
    pub fn void() -> Self { Self::keyword(Keyword::Void) }
    pub fn never() -> Self { Self::keyword(Keyword::Never) }
    pub fn unknown() -> Self { Self::keyword(Keyword::Unknown) }
    pub fn any() -> Self { Self::keyword(Keyword::Any) }
    pub fn string() -> Self { Self::keyword(Keyword::String) }
    pub fn number() -> Self { Self::keyword(Keyword::Number) }
    pub fn boolean() -> Self { Self::keyword(Keyword::Boolean) }
    pub fn bigint() -> Self { Self::keyword(Keyword::BigInt) }
    pub fn symbol() -> Self { Self::keyword(Keyword::Symbol) }
    pub fn object() -> Self { Self::keyword(Keyword::Object) }

    pub fn literal(literal: impl Into<Literal>) -> Self { Self::new(AstKind::Literal(literal.into())) }

    pub fn null() -> Self { Self::literal(Literal::Null) }

    pub fn unique_symbol(key: &str) -> Self { Self::new(AstKind::UniqueSymbol(Symbol::for_key(key))) }

    pub fn template_literal(head: impl Into<String>, spans: Vec<TemplateSpan>) -> Self {
        Self::new(AstKind::TemplateLiteral(TemplateLiteral { head: head.into(), spans }))
    }

    pub fn tuple(elements: Vec<Element>) -> Self {
        Self::new(AstKind::Tuple(Tuple { elements, rest: None }))
    }

    /// An empty `rest` means no rest element.
    pub fn tuple_with_rest(elements: Vec<Element>, rest: Vec<Ast>) -> Self {
        let rest = if rest.is_empty() { None } else { Some(rest) };
        Self::new(AstKind::Tuple(Tuple { elements, rest }))
    }

    pub fn array(item: Ast) -> Self { Self::tuple_with_rest(Vec::new(), vec![item]) }

    pub fn type_literal(
        property_signatures: Vec<PropertySignature>,
        index_signatures: Vec<IndexSignature>,
    ) -> Self {
        Self::new(AstKind::TypeLiteral(TypeLiteral { property_signatures, index_signatures }))
    }

    pub fn record(parameter: Ast, value: Ast) -> Self {
        Self::type_literal(Vec::new(), vec![IndexSignature { parameter, value }])
    }

    pub fn union(members: Vec<Ast>) -> Self { Self::new(AstKind::Union(members)) }

    pub fn enums<L: Into<Literal>>(members: Vec<(&str, L)>) -> Self {
        Self::new(AstKind::Enums(
            members.into_iter().map(|(label, v)| (label.to_string(), v.into())).collect()
        ))
    }

    /// A lazy node with a fresh identity.
    pub fn lazy(resolve: impl Fn() -> Ast + Send + Sync + 'static) -> Self {
        Self::lazy_with_id(LazyId::fresh(), resolve)
    }

    /// A lazy node sharing `id` with every other node built from it.
    pub fn lazy_with_id(id: LazyId, resolve: impl Fn() -> Ast + Send + Sync + 'static) -> Self {
        Self::new(AstKind::Lazy(Lazy { id, resolve: Arc::new(resolve) }))
    }

    /// A self-referential schema: `f` receives a handle to the schema being
    /// defined.
    pub fn recursive<F>(f: F) -> Self
    where
        F: Fn(&Ast) -> Ast + Send + Sync + 'static,
    {
        fn tie(id: LazyId, f: Arc<dyn Fn(&Ast) -> Ast + Send + Sync>) -> Ast {
            Ast::lazy_with_id(id, move || f(&tie(id, f.clone())))
        }
        tie(LazyId::fresh(), Arc::new(f))
    }

    pub fn refinement(from: Ast, predicate: Predicate, annotations: Annotations) -> Self {
        Self::annotated(AstKind::Refinement(Refinement { from, predicate }), annotations)
    }

    pub fn declaration(underlying: Option<Ast>, type_parameters: Vec<Ast>, annotations: Annotations) -> Self {
        Self::annotated(AstKind::Declaration(Declaration { underlying, type_parameters }), annotations)
    }

    pub fn transform(from: Ast, to: Ast) -> Self { Self::new(AstKind::Transform(Transform { from, to })) }
}

impl Element {
    pub fn required(ty: Ast) -> Self { Self { ty, is_optional: false } }
    pub fn optional(ty: Ast) -> Self { Self { ty, is_optional: true } }
}

impl PropertySignature {
    pub fn required(name: impl Into<PropertyKey>, ty: Ast) -> Self {
        Self { name: name.into(), ty, is_optional: false }
    }
    pub fn optional(name: impl Into<PropertyKey>, ty: Ast) -> Self {
        Self { name: name.into(), ty, is_optional: true }
    }
}

impl TemplateSpan {
    pub fn new(placeholder: Placeholder, literal: impl Into<String>) -> Self {
        Self { placeholder, literal: literal.into() }
    }
}

// ------------------------------ Node helpers ----------------------------- //

impl Tuple {
    pub fn first_optional(&self) -> Option<usize> { self.elements.iter().position(|e| e.is_optional) }

    pub fn rest_element(&self) -> Option<&Ast> { self.rest.as_ref().and_then(|r| r.first()) }

    pub fn post_rest(&self) -> &[Ast] {
        match &self.rest {
            Some(r) => &r[1..],
            None => &[],
        }
    }
}

impl LazyId {
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        LazyId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Lazy {
    pub fn resolve(&self) -> Ast { (self.resolve)() }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy").field("id", &self.id).finish_non_exhaustive()
    }
}

impl fmt::Debug for Refinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refinement").field("from", &self.from).finish_non_exhaustive()
    }
}

impl Outcome {
    pub fn is_accepted(&self) -> bool { matches!(self, Outcome::Accepted) }
}

// ------------------------------- Literals -------------------------------- //

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Number(n) => Value::Number(n.0),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
            Literal::BigInt(n) => Value::BigInt(*n),
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Literal::String(a), Value::String(b)) => a == b,
            (Literal::Number(a), Value::Number(b)) => a.0 == *b,
            (Literal::Bool(a), Value::Bool(b)) => a == b,
            (Literal::Null, Value::Null) => true,
            (Literal::BigInt(a), Value::BigInt(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self { Literal::String(s.to_string()) }
}

impl From<String> for Literal {
    fn from(s: String) -> Self { Literal::String(s) }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self { Literal::Number(OrderedFloat(n)) }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self { Literal::Number(OrderedFloat(n as f64)) }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self { Literal::Bool(b) }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    fn linked_list() -> Ast {
        Ast::recursive(|this| Ast::union(vec![
            Ast::null(),
            Ast::type_literal(vec![PropertySignature::required("next", this.clone())], vec![]),
        ]))
    }

    #[test]
    fn recursive_nodes_share_identity_across_resolutions() {
        let list = linked_list();
        let AstKind::Lazy(outer) = list.kind() else { panic!("expected lazy") };
        let AstKind::Union(members) = outer.resolve().kind().clone() else { panic!("expected union") };
        let AstKind::TypeLiteral(tl) = members[1].kind() else { panic!("expected type literal") };
        let AstKind::Lazy(inner) = tl.property_signatures[0].ty.kind() else { panic!("expected lazy") };
        assert_eq!(outer.id, inner.id);
        assert_ne!(outer.id, LazyId::fresh());
    }

    #[test]
    fn tuple_rest_helpers() {
        let t = Tuple {
            elements: vec![Element::required(Ast::string()), Element::optional(Ast::number())],
            rest: Some(vec![Ast::boolean(), Ast::null()]),
        };
        assert_eq!(t.first_optional(), Some(1));
        assert!(matches!(t.rest_element().map(Ast::kind), Some(AstKind::Keyword(Keyword::Boolean))));
        assert_eq!(t.post_rest().len(), 1);
        let AstKind::Tuple(empty) = Ast::tuple_with_rest(vec![], vec![]).kind().clone() else { unreachable!() };
        assert!(empty.rest.is_none());
    }

    #[test]
    fn literal_matching_is_type_strict() {
        assert!(Literal::from(1).matches(&Value::Number(1.0)));
        assert!(!Literal::from("1").matches(&Value::Number(1.0)));
        assert!(Literal::Null.matches(&Value::Null));
        assert!(!Literal::Null.matches(&Value::Undefined));
    }

    #[test]
    fn annotate_keeps_kind() {
        let a = Ast::string().annotate(AnnotationId::Identifier, serde_json::json!("Name"));
        assert_eq!(a.kind_name(), "StringKeyword");
        assert_eq!(a.annotations().identifier(), Some("Name"));
    }
}

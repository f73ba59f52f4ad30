//! Structural acceptance.
//!
//! The encoder and renderer only need to ask "does this value fit this
//! schema"; [`Acceptor`] is that question. [`StructuralGuard`] answers it by
//! walking the AST, and is what the entry points use unless given another.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::ast::{Ast, AstKind, Keyword, Placeholder, TemplateLiteral, Tuple, TypeLiteral};
use crate::value::{PropertyKey, Value};

pub trait Acceptor: Send + Sync {
    fn accepts(&self, ast: &Ast, value: &Value) -> bool;
}

type DeclarationCheck = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Opaque declarations have no structure to walk; their checks are
/// registered by identifier.
#[derive(Default, Clone)]
pub struct StructuralGuard {
    declarations: HashMap<String, DeclarationCheck>,
}

impl StructuralGuard {
    pub fn new() -> Self { Self::default() }

    pub fn with_declaration(
        mut self,
        identifier: impl Into<String>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.declarations.insert(identifier.into(), Arc::new(check));
        self
    }
}

impl fmt::Debug for StructuralGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralGuard").field("declarations", &self.declarations.keys()).finish()
    }
}

impl Acceptor for StructuralGuard {
    fn accepts(&self, ast: &Ast, value: &Value) -> bool {
        match ast.kind() {
            AstKind::Literal(literal) => literal.matches(value),
            AstKind::UniqueSymbol(symbol) => matches!(value, Value::Symbol(s) if s == symbol),
            AstKind::Keyword(keyword) => keyword_accepts(*keyword, value),
            AstKind::TemplateLiteral(template) => match value {
                Value::String(s) => template_regex(template).is_some_and(|re| re.is_match(s)),
                _ => false,
            },
            AstKind::Tuple(tuple) => match value {
                Value::Array(items) => self.tuple_accepts(tuple, items),
                _ => false,
            },
            AstKind::TypeLiteral(node) => match value {
                Value::Object(object) => self.type_literal_accepts(node, object),
                _ => false,
            },
            AstKind::Union(members) => members.iter().any(|m| self.accepts(m, value)),
            AstKind::Lazy(lazy) => self.accepts(&lazy.resolve(), value),
            AstKind::Enums(members) => members.iter().any(|(_, literal)| literal.matches(value)),
            AstKind::Refinement(r) => self.accepts(&r.from, value) && (r.predicate)(value).is_accepted(),
            AstKind::Declaration(d) => {
                let registered = ast.annotations().identifier().and_then(|id| self.declarations.get(id));
                match (registered, &d.underlying) {
                    (Some(check), _) => check(value),
                    (None, Some(underlying)) => self.accepts(underlying, value),
                    (None, None) => false,
                }
            }
            AstKind::Transform(t) => self.accepts(&t.to, value),
        }
    }
}

fn keyword_accepts(keyword: Keyword, value: &Value) -> bool {
    match keyword {
        Keyword::Undefined | Keyword::Void => value.is_undefined(),
        Keyword::Never => false,
        Keyword::Unknown | Keyword::Any => true,
        Keyword::String => matches!(value, Value::String(_)),
        Keyword::Number => matches!(value, Value::Number(_)),
        Keyword::Boolean => matches!(value, Value::Bool(_)),
        Keyword::BigInt => matches!(value, Value::BigInt(_)),
        Keyword::Symbol => matches!(value, Value::Symbol(_)),
        Keyword::Object => matches!(value, Value::Array(_) | Value::Object(_)),
    }
}

const NUMBER_PATTERN: &str = r"[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?|NaN|-?Infinity";

pub(crate) fn template_regex(template: &TemplateLiteral) -> Option<Regex> {
    let mut source = format!("^{}", regex::escape(&template.head));
    for span in &template.spans {
        match span.placeholder {
            Placeholder::String => source.push_str("(?s:.*)"),
            Placeholder::Number => source.push_str(&format!("(?:{NUMBER_PATTERN})")),
        }
        source.push_str(&regex::escape(&span.literal));
    }
    source.push('$');
    Regex::new(&source).ok()
}

impl StructuralGuard {
    fn tuple_accepts(&self, tuple: &Tuple, items: &[Value]) -> bool {
        let required = tuple.elements.iter().filter(|e| !e.is_optional).count();
        let post = tuple.post_rest();
        let fixed = match tuple.rest_element() {
            None if items.len() > tuple.elements.len() => return false,
            None => items.len(),
            Some(_) if items.len() < required + post.len() => return false,
            Some(_) => (items.len() - post.len()).min(tuple.elements.len()),
        };
        if items.len() < required {
            return false;
        }
        let elements_ok = tuple.elements.iter().zip(&items[..fixed]).all(|(element, item)| {
            (element.is_optional && item.is_undefined()) || self.accepts(&element.ty, item)
        });
        let Some(head) = tuple.rest_element() else { return elements_ok };
        let tail_start = items.len() - post.len();
        elements_ok
            && items[fixed..tail_start].iter().all(|item| self.accepts(head, item))
            && post.iter().zip(&items[tail_start..]).all(|(ty, item)| self.accepts(ty, item))
    }

    fn type_literal_accepts(&self, node: &TypeLiteral, object: &crate::value::Object) -> bool {
        let declared_ok = node.property_signatures.iter().all(|p| match object.get(&p.name) {
            Some(v) => (p.is_optional && v.is_undefined()) || self.accepts(&p.ty, v),
            None => p.is_optional,
        });
        declared_ok
            && object
                .iter()
                .filter(|(key, _)| !node.property_signatures.iter().any(|p| &p.name == *key))
                .all(|(key, value)| self.undeclared_accepts(node, key, value))
    }

    fn undeclared_accepts(&self, node: &TypeLiteral, key: &PropertyKey, value: &Value) -> bool {
        let key = key.to_value();
        node.index_signatures
            .iter()
            .filter(|is| self.accepts(&is.parameter, &key))
            .all(|is| self.accepts(&is.value, value))
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Annotations;
    use crate::ast::{Element, PropertySignature, TemplateSpan};

    fn guard() -> StructuralGuard { StructuralGuard::new() }

    #[test]
    fn tuples_check_arity_and_positions() {
        let t = Ast::tuple(vec![Element::required(Ast::string()), Element::optional(Ast::number())]);
        assert!(guard().accepts(&t, &Value::Array(vec![Value::from("a")])));
        assert!(guard().accepts(&t, &Value::Array(vec![Value::from("a"), Value::Number(1.0)])));
        assert!(!guard().accepts(&t, &Value::Array(vec![])));
        assert!(!guard().accepts(&t, &Value::Array(vec![Value::from("a"), Value::Number(1.0), Value::Null])));
    }

    #[test]
    fn rest_and_post_rest_positions() {
        let t = Ast::tuple_with_rest(vec![Element::required(Ast::string())], vec![Ast::number(), Ast::boolean()]);
        let ok = Value::Array(vec![Value::from("a"), Value::Number(1.0), Value::Number(2.0), Value::Bool(true)]);
        let short = Value::Array(vec![Value::from("a"), Value::Bool(true)]);
        let wrong_tail = Value::Array(vec![Value::from("a"), Value::Number(1.0)]);
        assert!(guard().accepts(&t, &ok));
        assert!(guard().accepts(&t, &short));
        assert!(!guard().accepts(&t, &wrong_tail));
    }

    #[test]
    fn index_signatures_check_undeclared_keys_only() {
        let s = Ast::type_literal(
            vec![PropertySignature::required("name", Ast::string())],
            vec![crate::ast::IndexSignature { parameter: Ast::string(), value: Ast::number() }],
        );
        let ok = Value::object([("name", Value::from("x")), ("n", Value::Number(1.0))]);
        let bad = Value::object([("name", Value::from("x")), ("n", Value::from("y"))]);
        assert!(guard().accepts(&s, &ok));
        assert!(!guard().accepts(&s, &bad));
        assert!(!guard().accepts(&s, &Value::object([("n", Value::Number(1.0))])));
    }

    #[test]
    fn template_literals_match_by_pattern() {
        let t = Ast::template_literal("v", vec![TemplateSpan::new(Placeholder::Number, ".x")]);
        assert!(guard().accepts(&t, &Value::from("v12.x")));
        assert!(guard().accepts(&t, &Value::from("v-1.5.x")));
        assert!(!guard().accepts(&t, &Value::from("vab.x")));
    }

    #[test]
    fn opaque_declarations_need_a_registered_check() {
        let decl = Ast::declaration(None, vec![], Annotations::new().with_identifier("Even"));
        assert!(!guard().accepts(&decl, &Value::Number(2.0)));
        let g = guard().with_declaration("Even", |v| v.as_f64().is_some_and(|n| n % 2.0 == 0.0));
        assert!(g.accepts(&decl, &Value::Number(2.0)));
        assert!(!g.accepts(&decl, &Value::Number(3.0)));
    }

    #[test]
    fn object_keyword_takes_arrays_and_records() {
        assert!(guard().accepts(&Ast::object(), &Value::Array(vec![])));
        assert!(guard().accepts(&Ast::object(), &Value::object::<&str, _>([])));
        assert!(!guard().accepts(&Ast::object(), &Value::Null));
    }
}

//! Rendering compiler: value → deterministic display text.
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{Ast, Keyword, Literal, Refinement, TemplateLiteral, Tuple, TypeLiteral};
use crate::constraints::Constraint;
use crate::engine::{self, Slot, Target};
use crate::error::{CompileError, RenderError};
use crate::guard::{Acceptor, StructuralGuard};
use crate::hooks::{HookRegistry, Hooks};
use crate::value::{PropertyKey, Symbol, Value, format_number};

type RenderFn = dyn Fn(&Value) -> Result<String, RenderError> + Send + Sync;

#[derive(Clone)]
pub struct Renderer(Arc<RenderFn>);

impl Renderer {
    pub fn new(f: impl Fn(&Value) -> Result<String, RenderError> + Send + Sync + 'static) -> Self {
        Renderer(Arc::new(f))
    }

    pub fn generic() -> Self { Renderer::new(|v| Ok(render_value(v))) }

    pub fn render(&self, value: &Value) -> Result<String, RenderError> { (self.0)(value) }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Renderer") }
}

// ------------------------------- Generic --------------------------------- //

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("static identifier pattern"));

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}"))
}

pub fn render_key(key: &PropertyKey) -> String {
    match key {
        PropertyKey::String(s) if IDENTIFIER.is_match(s) => s.clone(),
        PropertyKey::String(s) => quote(s),
        PropertyKey::Symbol(s) => format!("[{s}]"),
    }
}

fn braced(entries: Vec<String>) -> String {
    if entries.is_empty() { "{}".into() } else { format!("{{ {} }}", entries.join(", ")) }
}

/// Literal form of any value, independent of a schema.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".into(),
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::BigInt(n) => format!("{n}n"),
        Value::String(s) => quote(s),
        Value::Symbol(s) => s.to_string(),
        Value::Array(items) => format!("[{}]", items.iter().map(render_value).collect::<Vec<_>>().join(", ")),
        Value::Object(object) => {
            braced(object.iter().map(|(k, v)| format!("{}: {}", render_key(k), render_value(v))).collect())
        }
    }
}

// ------------------------------- Compiler -------------------------------- //

pub fn compile_renderer(ast: &Ast) -> Result<Renderer, CompileError> {
    compile_renderer_with(ast, &HookRegistry::with_builtins(), Arc::new(StructuralGuard::new()))
}

pub fn compile_renderer_with(
    ast: &Ast,
    registry: &HookRegistry,
    acceptor: Arc<dyn Acceptor>,
) -> Result<Renderer, CompileError> {
    engine::derive(&RenderingTarget { hooks: &registry.renderer, acceptor }, ast)
}

struct RenderingTarget<'h> {
    hooks: &'h Hooks<Renderer>,
    acceptor: Arc<dyn Acceptor>,
}

impl Target for RenderingTarget<'_> {
    type Op = Renderer;
    const NAME: &'static str = "a renderer";

    fn hooks(&self) -> &Hooks<Renderer> { self.hooks }

    fn deferred(&self, slot: Slot<Renderer>) -> Renderer {
        Renderer::new(move |v| slot.get().render(v))
    }

    fn literal(&self, _: &Literal) -> Result<Renderer, CompileError> { Ok(Renderer::generic()) }

    fn unique_symbol(&self, _: &Symbol) -> Result<Renderer, CompileError> { Ok(Renderer::generic()) }

    fn keyword(&self, keyword: Keyword, _: Option<&Constraint>) -> Result<Renderer, CompileError> {
        Ok(match keyword {
            Keyword::Never => Renderer::new(|_| Err(RenderError::Never)),
            _ => Renderer::generic(),
        })
    }

    fn template_literal(&self, _: &TemplateLiteral) -> Result<Renderer, CompileError> { Ok(Renderer::generic()) }

    fn tuple(&self, _node: &Tuple, elements: Vec<Renderer>, rest: Vec<Renderer>) -> Result<Renderer, CompileError> {
        let mut rest = rest.into_iter();
        let head = rest.next();
        let post: Vec<Renderer> = rest.collect();
        Ok(Renderer::new(move |v| {
            let Value::Array(items) = v else { return Ok(render_value(v)) };
            let tail_start = match head {
                Some(_) => items.len().saturating_sub(post.len()).max(elements.len().min(items.len())),
                None => items.len(),
            };
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let renderer = if i < elements.len().min(tail_start) {
                    Some(&elements[i])
                } else if i < tail_start {
                    head.as_ref()
                } else {
                    post.get(i - tail_start)
                };
                parts.push(match renderer {
                    Some(r) => r.render(item)?,
                    None => render_value(item),
                });
            }
            Ok(format!("[{}]", parts.join(", ")))
        }))
    }

    fn type_literal(
        &self,
        node: &TypeLiteral,
        properties: Vec<Renderer>,
        index_signatures: Vec<(Renderer, Renderer)>,
    ) -> Result<Renderer, CompileError> {
        let declared: Vec<(PropertyKey, Renderer)> =
            node.property_signatures.iter().map(|p| p.name.clone()).zip(properties).collect();
        let signatures: Vec<(Ast, Renderer)> = node
            .index_signatures
            .iter()
            .zip(index_signatures)
            .map(|(is, (_, value))| (is.parameter.clone(), value))
            .collect();
        let acceptor = self.acceptor.clone();
        Ok(Renderer::new(move |v| {
            let Value::Object(object) = v else { return Ok(render_value(v)) };
            let mut entries = Vec::new();
            for (name, renderer) in &declared {
                if let Some(value) = object.get(name) {
                    entries.push(format!("{}: {}", render_key(name), renderer.render(value)?));
                }
            }
            for (key, value) in object {
                if declared.iter().any(|(name, _)| name == key) {
                    continue;
                }
                let key_value = key.to_value();
                if let Some((_, renderer)) = signatures.iter().find(|(parameter, _)| acceptor.accepts(parameter, &key_value)) {
                    entries.push(format!("{}: {}", render_key(key), renderer.render(value)?));
                }
            }
            Ok(braced(entries))
        }))
    }

    fn union(&self, members: &[Ast], compiled: Vec<Renderer>) -> Result<Renderer, CompileError> {
        let members: Vec<(Ast, Renderer)> = members.iter().cloned().zip(compiled).collect();
        let acceptor = self.acceptor.clone();
        Ok(Renderer::new(move |v| match members.iter().find(|(ast, _)| acceptor.accepts(ast, v)) {
            Some((_, renderer)) => renderer.render(v),
            None => Err(RenderError::NoMatchingUnionMember { actual: v.kind() }),
        }))
    }

    fn enums(&self, _: &[(String, Literal)]) -> Result<Renderer, CompileError> { Ok(Renderer::generic()) }

    fn refinement(&self, _: &Refinement, from: Renderer) -> Result<Renderer, CompileError> { Ok(from) }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Annotations;
    use crate::ast::{Element, IndexSignature, PropertySignature};

    fn render(ast: &Ast, v: Value) -> Result<String, RenderError> { compile_renderer(ast).unwrap().render(&v) }

    #[test]
    fn primitives_use_literal_forms() {
        assert_eq!(render_value(&Value::from("a\"b")), r#""a\"b""#);
        assert_eq!(render_value(&Value::Number(1.0)), "1");
        assert_eq!(render_value(&Value::Number(f64::INFINITY)), "Infinity");
        assert_eq!(render_value(&Value::BigInt(12)), "12n");
        assert_eq!(render_value(&Value::Undefined), "undefined");
        assert_eq!(render_value(&Value::Symbol(Symbol::for_key("k"))), "Symbol(k)");
    }

    #[test]
    fn structs_follow_declared_order_then_index_keys() {
        let s = Ast::type_literal(
            vec![PropertySignature::required("b", Ast::number()), PropertySignature::optional("a", Ast::string())],
            vec![IndexSignature { parameter: Ast::string(), value: Ast::boolean() }],
        );
        let v = Value::object([("x-y", Value::Bool(true)), ("b", Value::Number(2.0))]);
        assert_eq!(render(&s, v).unwrap(), r#"{ b: 2, "x-y": true }"#);
        let empty = Ast::type_literal(vec![], vec![]);
        assert_eq!(render(&empty, Value::object::<&str, _>([])).unwrap(), "{}");
    }

    #[test]
    fn tuples_render_positionally() {
        let t = Ast::tuple_with_rest(vec![Element::required(Ast::string())], vec![Ast::number(), Ast::bigint()]);
        let v = Value::Array(vec![Value::from("a"), Value::Number(1.5), Value::BigInt(3)]);
        assert_eq!(render(&t, v).unwrap(), r#"["a", 1.5, 3n]"#);
    }

    #[test]
    fn union_uses_the_first_accepting_member() {
        let mut registry = HookRegistry::new();
        registry.renderer.register("Loud", |_| Renderer::new(|v| Ok(render_value(v).to_uppercase())));
        let loud = Ast::declaration(Some(Ast::string()), vec![], Annotations::new().with_identifier("Loud"));
        let union = Ast::union(vec![Ast::number(), loud, Ast::string()]);
        let renderer = compile_renderer_with(&union, &registry, Arc::new(StructuralGuard::new())).unwrap();
        assert_eq!(renderer.render(&Value::from("hi")).unwrap(), r#""HI""#);
        assert_eq!(renderer.render(&Value::Number(3.0)).unwrap(), "3");
        assert_eq!(renderer.render(&Value::Null), Err(RenderError::NoMatchingUnionMember { actual: "null" }));
    }

    #[test]
    fn recursive_schema_renders() {
        let list = Ast::recursive(|this| {
            Ast::union(vec![Ast::null(), Ast::type_literal(vec![PropertySignature::required("next", this.clone())], vec![])])
        });
        let v = Value::object([("next", Value::object([("next", Value::Null)]))]);
        assert_eq!(render(&list, v).unwrap(), "{ next: { next: null } }");
    }

    #[test]
    fn optional_members_end_recursion() {
        let tree = Ast::recursive(|this| Ast::type_literal(vec![
            PropertySignature::required("name", Ast::string()),
            PropertySignature::optional("sub", this.clone()),
        ], vec![]));
        let v = Value::object([("name", Value::from("a")), ("sub", Value::object([("name", Value::from("b"))]))]);
        assert_eq!(render(&tree, v).unwrap(), r#"{ name: "a", sub: { name: "b" } }"#);

        let chain = Ast::recursive(|this| Ast::tuple(vec![Element::required(Ast::number()), Element::optional(this.clone())]));
        let v = Value::Array(vec![Value::Number(1.0), Value::Array(vec![Value::Number(2.0)])]);
        assert_eq!(render(&chain, v).unwrap(), "[1, [2]]");
    }

    #[test]
    fn never_fails_at_use_time_and_transform_at_compile_time() {
        assert_eq!(render(&Ast::never(), Value::Null), Err(RenderError::Never));
        assert!(compile_renderer(&Ast::transform(Ast::string(), Ast::number())).is_err());
        assert!(compile_renderer(&Ast::enums::<f64>(vec![])).is_err());
    }
}

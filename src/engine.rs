//! The recursive descent shared by every compiler.
//!
//! [`Engine`] owns the traversal: hook interception on declarations, lazy
//! nodes and refinements, memoization of lazy nodes, constraint threading,
//! and the fatal cases common to all targets. A [`Target`] only supplies the
//! leaf table and the composite constructors.
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tracing::{debug, trace};

use crate::annotations::Annotations;
use crate::ast::{Ast, AstKind, Declaration, Keyword, Lazy, LazyId, Literal, Refinement, TemplateLiteral, Tuple, TypeLiteral};
use crate::constraints::Constraint;
use crate::error::CompileError;
use crate::hooks::Hooks;
use crate::value::Symbol;

pub trait Target {
    type Op: Clone;

    /// Article + noun, as used in error messages ("a generator").
    const NAME: &'static str;

    fn hooks(&self) -> &Hooks<Self::Op>;

    /// An operation that forwards to whatever ends up in `slot`.
    fn deferred(&self, slot: Slot<Self::Op>) -> Self::Op;

    /// Constraint to compile a refinement's `from` under. Only targets that
    /// consult constraints override this.
    /// Whether an absent optional property can end a recursion. Targets that
    /// always produce every declared key return `false`.
    fn optional_properties_escape(&self) -> bool { true }

    fn narrow(
        &self,
        _inherited: Option<&Constraint>,
        _annotations: &Annotations,
    ) -> Result<Option<Constraint>, CompileError> {
        Ok(None)
    }

    fn literal(&self, literal: &Literal) -> Result<Self::Op, CompileError>;

    fn unique_symbol(&self, symbol: &Symbol) -> Result<Self::Op, CompileError>;

    fn keyword(&self, keyword: Keyword, constraint: Option<&Constraint>) -> Result<Self::Op, CompileError>;

    fn template_literal(&self, node: &TemplateLiteral) -> Result<Self::Op, CompileError>;

    /// `rest` is empty or holds the rest element followed by the post-rest
    /// elements, mirroring [`Tuple::rest`].
    fn tuple(&self, node: &Tuple, elements: Vec<Self::Op>, rest: Vec<Self::Op>) -> Result<Self::Op, CompileError>;

    /// One operation per property signature and a `(parameter, value)` pair
    /// per index signature, in declaration order.
    fn type_literal(
        &self,
        node: &TypeLiteral,
        properties: Vec<Self::Op>,
        index_signatures: Vec<(Self::Op, Self::Op)>,
    ) -> Result<Self::Op, CompileError>;

    fn union(&self, members: &[Ast], compiled: Vec<Self::Op>) -> Result<Self::Op, CompileError>;

    /// Never called with an empty member list.
    fn enums(&self, members: &[(String, Literal)]) -> Result<Self::Op, CompileError>;

    fn refinement(&self, node: &Refinement, from: Self::Op) -> Result<Self::Op, CompileError>;
}

/// Write-once cell a memoized lazy node compiles into.
pub struct Slot<Op>(Arc<OnceLock<Op>>);

impl<Op> Slot<Op> {
    fn new() -> Self { Slot(Arc::new(OnceLock::new())) }

    fn fill(&self, op: Op) {
        let _ = self.0.set(op);
    }

    /// Compilation fills every slot it creates before handing out the root
    /// operation, so a slot reached from a finished operation is full.
    pub fn get(&self) -> &Op {
        self.0.get().expect("lazy schema forced before its compilation finished")
    }
}

impl<Op> Clone for Slot<Op> {
    fn clone(&self) -> Self { Slot(self.0.clone()) }
}

struct Memo<Op> {
    slot: Slot<Op>,
    /// Escape depth at which compilation of this node started; `None` once
    /// finished.
    pending_at: Option<usize>,
}

// -------------------------------- Engine --------------------------------- //

pub struct Engine<'t, T: Target> {
    target: &'t T,
    memo: HashMap<LazyId, Memo<T::Op>>,
    /// Number of enclosing nodes that can stop a recursion: unions with
    /// alternatives, optional elements, rest elements, index signatures and,
    /// for most targets, optional properties.
    escapes: usize,
}

/// Compile `ast` for `target` with a fresh memo table.
pub fn derive<T: Target>(target: &T, ast: &Ast) -> Result<T::Op, CompileError> {
    debug!(compiler = T::NAME, root = ast.kind_name(), "compiling schema");
    Engine::new(target).compile(ast, None)
}

impl<'t, T: Target> Engine<'t, T> {
    pub fn new(target: &'t T) -> Self {
        Self { target, memo: HashMap::new(), escapes: 0 }
    }

    pub fn compile(&mut self, ast: &Ast, constraint: Option<&Constraint>) -> Result<T::Op, CompileError> {
        trace!(compiler = T::NAME, node = ast.kind_name(), "visit");
        let target = self.target;
        match ast.kind() {
            AstKind::Declaration(d) => self.declaration(ast.annotations(), d),
            AstKind::Lazy(l) => self.lazy(ast.annotations(), l),
            AstKind::Literal(l) => target.literal(l),
            AstKind::UniqueSymbol(s) => target.unique_symbol(s),
            AstKind::Keyword(k) => target.keyword(*k, constraint),
            AstKind::TemplateLiteral(t) => target.template_literal(t),
            AstKind::Tuple(t) => {
                let elements = t.elements.iter()
                    .map(|e| self.compile_member(&e.ty, e.is_optional))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut rest = Vec::new();
                if let Some(head) = t.rest_element() {
                    rest.push(self.escaping(|e| e.compile(head, None))?);
                    rest.extend(self.compile_all(t.post_rest())?);
                }
                target.tuple(t, elements, rest)
            }
            AstKind::TypeLiteral(tl) => {
                let optional_escapes = target.optional_properties_escape();
                let properties = tl.property_signatures.iter()
                    .map(|p| self.compile_member(&p.ty, p.is_optional && optional_escapes))
                    .collect::<Result<Vec<_>, _>>()?;
                let index_signatures = self.escaping(|e| {
                    tl.index_signatures.iter()
                        .map(|is| Ok((e.compile(&is.parameter, None)?, e.compile(&is.value, None)?)))
                        .collect::<Result<Vec<_>, CompileError>>()
                })?;
                target.type_literal(tl, properties, index_signatures)
            }
            AstKind::Union(members) => {
                let compiled = if members.len() > 1 {
                    self.escaping(|e| e.compile_all(members))?
                } else {
                    self.compile_all(members)?
                };
                target.union(members, compiled)
            }
            AstKind::Enums(members) => {
                if members.is_empty() {
                    return Err(CompileError::EmptyEnumeration { target: T::NAME });
                }
                target.enums(members)
            }
            AstKind::Refinement(r) => {
                let narrowed = target.narrow(constraint, ast.annotations())?;
                let from = self.compile(&r.from, narrowed.as_ref())?;
                match target.hooks().lookup(ast.annotations()) {
                    Some(handler) => {
                        debug!(compiler = T::NAME, hook = ast.annotations().identifier(), "refinement hook");
                        Ok(handler(vec![from]))
                    }
                    None => target.refinement(r, from),
                }
            }
            AstKind::Transform(_) => Err(CompileError::UnsupportedNodeKind { target: T::NAME, kind: "Transform" }),
        }
    }

    fn compile_all<'a>(&mut self, asts: impl IntoIterator<Item = &'a Ast>) -> Result<Vec<T::Op>, CompileError> {
        asts.into_iter().map(|a| self.compile(a, None)).collect()
    }

    fn compile_member(&mut self, ast: &Ast, escapes: bool) -> Result<T::Op, CompileError> {
        if escapes { self.escaping(|e| e.compile(ast, None)) } else { self.compile(ast, None) }
    }

    fn escaping<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.escapes += 1;
        let out = f(self);
        self.escapes -= 1;
        out
    }

    fn declaration(&mut self, annotations: &Annotations, d: &Declaration) -> Result<T::Op, CompileError> {
        let target = self.target;
        if let Some(handler) = target.hooks().lookup(annotations) {
            debug!(compiler = T::NAME, hook = annotations.identifier(), "declaration hook");
            let params = self.compile_all(&d.type_parameters)?;
            return Ok(handler(params));
        }
        match &d.underlying {
            Some(underlying) => self.compile(underlying, None),
            None => Err(CompileError::MissingHookHandler {
                target: T::NAME,
                identifier: annotations.identifier().unwrap_or("<anonymous>").to_string(),
            }),
        }
    }

    fn lazy(&mut self, annotations: &Annotations, lazy: &Lazy) -> Result<T::Op, CompileError> {
        let target = self.target;
        if let Some(handler) = target.hooks().lookup(annotations) {
            debug!(compiler = T::NAME, hook = annotations.identifier(), "lazy hook");
            return Ok(handler(Vec::new()));
        }
        if let Some(memo) = self.memo.get(&lazy.id) {
            if memo.pending_at == Some(self.escapes) {
                return Err(CompileError::UnguardedRecursion { target: T::NAME });
            }
            trace!(compiler = T::NAME, id = ?lazy.id, "memo hit");
            return Ok(target.deferred(memo.slot.clone()));
        }
        let slot = Slot::new();
        self.memo.insert(lazy.id, Memo { slot: slot.clone(), pending_at: Some(self.escapes) });
        let op = self.compile(&lazy.resolve(), None)?;
        slot.fill(op.clone());
        if let Some(memo) = self.memo.get_mut(&lazy.id) {
            memo.pending_at = None;
        }
        Ok(op)
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Element, PropertySignature};

    /// Describes a schema's shape down to a fixed depth.
    type Describe = Arc<dyn Fn(u32) -> String + Send + Sync>;

    #[derive(Default)]
    struct Shape {
        hooks: Hooks<Describe>,
    }

    fn text(s: impl Into<String>) -> Describe {
        let s = s.into();
        Arc::new(move |_| s.clone())
    }

    fn join(parts: Vec<Describe>, open: &'static str, close: &'static str) -> Describe {
        Arc::new(move |d| {
            if d == 0 { return "…".into(); }
            let inner: Vec<String> = parts.iter().map(|p| p(d - 1)).collect();
            format!("{open}{}{close}", inner.join(", "))
        })
    }

    impl Target for Shape {
        type Op = Describe;
        const NAME: &'static str = "a description";

        fn hooks(&self) -> &Hooks<Describe> { &self.hooks }
        fn deferred(&self, slot: Slot<Describe>) -> Describe { Arc::new(move |d| slot.get()(d)) }
        fn narrow(&self, inherited: Option<&Constraint>, annotations: &Annotations) -> Result<Option<Constraint>, CompileError> {
            crate::constraints::combine(inherited, Constraint::from_annotations(annotations))
        }
        fn literal(&self, literal: &Literal) -> Result<Describe, CompileError> { Ok(text(format!("{literal:?}"))) }
        fn unique_symbol(&self, symbol: &Symbol) -> Result<Describe, CompileError> { Ok(text(symbol.to_string())) }
        fn keyword(&self, keyword: Keyword, constraint: Option<&Constraint>) -> Result<Describe, CompileError> {
            Ok(text(match constraint {
                Some(c) => format!("{}{c:?}", keyword.name()),
                None => keyword.name().to_string(),
            }))
        }
        fn template_literal(&self, _: &TemplateLiteral) -> Result<Describe, CompileError> { Ok(text("template")) }
        fn tuple(&self, _: &Tuple, elements: Vec<Describe>, rest: Vec<Describe>) -> Result<Describe, CompileError> {
            Ok(join(elements.into_iter().chain(rest).collect(), "[", "]"))
        }
        fn type_literal(&self, _: &TypeLiteral, properties: Vec<Describe>, index: Vec<(Describe, Describe)>) -> Result<Describe, CompileError> {
            Ok(join(properties.into_iter().chain(index.into_iter().map(|(_, v)| v)).collect(), "{", "}"))
        }
        fn union(&self, _: &[Ast], compiled: Vec<Describe>) -> Result<Describe, CompileError> { Ok(join(compiled, "(", ")")) }
        fn enums(&self, members: &[(String, Literal)]) -> Result<Describe, CompileError> { Ok(text(format!("enum{}", members.len()))) }
        fn refinement(&self, _: &Refinement, from: Describe) -> Result<Describe, CompileError> { Ok(from) }
    }

    fn list() -> Ast {
        Ast::recursive(|this| Ast::union(vec![
            Ast::null(),
            Ast::type_literal(vec![PropertySignature::required("next", this.clone())], vec![]),
        ]))
    }

    #[test]
    fn recursive_schema_compiles_once_and_ties_the_knot() {
        let op = derive(&Shape::default(), &list()).unwrap();
        assert_eq!(op(3), "(Null, {(Null, …)})");
    }

    #[test]
    fn unguarded_self_reference_is_rejected() {
        let looping = Ast::recursive(|this| Ast::tuple(vec![Element::required(this.clone())]));
        assert_eq!(
            derive(&Shape::default(), &looping).err(),
            Some(CompileError::UnguardedRecursion { target: "a description" })
        );
        let direct = Ast::recursive(|this| this.clone());
        assert!(derive(&Shape::default(), &direct).is_err());
    }

    #[test]
    fn rest_elements_guard_recursion() {
        let tree = Ast::recursive(|this| Ast::array(this.clone()));
        assert!(derive(&Shape::default(), &tree).is_ok());
    }

    #[test]
    fn optional_members_guard_recursion() {
        let chain = Ast::recursive(|this| Ast::tuple(vec![Element::required(Ast::string()), Element::optional(this.clone())]));
        assert_eq!(derive(&Shape::default(), &chain).unwrap()(2), "[StringKeyword, [StringKeyword, …]]");

        let tree = Ast::recursive(|this| Ast::type_literal(vec![
            PropertySignature::required("name", Ast::string()),
            PropertySignature::optional("sub", this.clone()),
        ], vec![]));
        assert!(derive(&Shape::default(), &tree).is_ok());
    }

    #[test]
    fn optional_properties_need_not_escape() {
        struct Total(Shape);
        impl Target for Total {
            type Op = Describe;
            const NAME: &'static str = "a total description";
            fn optional_properties_escape(&self) -> bool { false }
            fn hooks(&self) -> &Hooks<Describe> { self.0.hooks() }
            fn deferred(&self, slot: Slot<Describe>) -> Describe { self.0.deferred(slot) }
            fn literal(&self, l: &Literal) -> Result<Describe, CompileError> { self.0.literal(l) }
            fn unique_symbol(&self, s: &Symbol) -> Result<Describe, CompileError> { self.0.unique_symbol(s) }
            fn keyword(&self, k: Keyword, c: Option<&Constraint>) -> Result<Describe, CompileError> { self.0.keyword(k, c) }
            fn template_literal(&self, t: &TemplateLiteral) -> Result<Describe, CompileError> { self.0.template_literal(t) }
            fn tuple(&self, t: &Tuple, e: Vec<Describe>, r: Vec<Describe>) -> Result<Describe, CompileError> { self.0.tuple(t, e, r) }
            fn type_literal(&self, t: &TypeLiteral, p: Vec<Describe>, i: Vec<(Describe, Describe)>) -> Result<Describe, CompileError> { self.0.type_literal(t, p, i) }
            fn union(&self, m: &[Ast], c: Vec<Describe>) -> Result<Describe, CompileError> { self.0.union(m, c) }
            fn enums(&self, m: &[(String, Literal)]) -> Result<Describe, CompileError> { self.0.enums(m) }
            fn refinement(&self, r: &Refinement, f: Describe) -> Result<Describe, CompileError> { self.0.refinement(r, f) }
        }
        let tree = Ast::recursive(|this| Ast::type_literal(vec![PropertySignature::optional("sub", this.clone())], vec![]));
        assert_eq!(
            derive(&Total(Shape::default()), &tree).err(),
            Some(CompileError::UnguardedRecursion { target: "a total description" })
        );
    }

    #[test]
    fn memo_is_scoped_to_one_compilation() {
        let schema = list();
        let a = derive(&Shape::default(), &schema).unwrap();
        let b = derive(&Shape::default(), &schema).unwrap();
        assert_eq!(a(4), b(4));
    }

    #[test]
    fn declaration_hook_receives_compiled_type_parameters() {
        let mut shape = Shape::default();
        shape.hooks.register("Pair", |params: Vec<Describe>| {
            Arc::new(move |d| format!("Pair<{}>", params.iter().map(|p| p(d)).collect::<Vec<_>>().join(", "))) as Describe
        });
        let decl = Ast::declaration(
            None,
            vec![Ast::string(), Ast::number()],
            Annotations::new().with_identifier("Pair"),
        );
        assert_eq!(derive(&shape, &decl).unwrap()(3), "Pair<StringKeyword, NumberKeyword>");
    }

    #[test]
    fn declaration_without_hook_falls_through_or_fails() {
        let transparent = Ast::declaration(Some(Ast::boolean()), vec![], Annotations::new().with_identifier("Flag"));
        assert_eq!(derive(&Shape::default(), &transparent).unwrap()(1), "BooleanKeyword");

        let opaque = Ast::declaration(None, vec![], Annotations::new().with_identifier("Opaque"));
        assert_eq!(
            derive(&Shape::default(), &opaque).err(),
            Some(CompileError::MissingHookHandler { target: "a description", identifier: "Opaque".into() })
        );
    }

    #[test]
    fn transform_and_empty_enums_are_fatal() {
        let nested = Ast::tuple(vec![Element::required(Ast::transform(Ast::string(), Ast::number()))]);
        assert!(matches!(derive(&Shape::default(), &nested), Err(CompileError::UnsupportedNodeKind { kind: "Transform", .. })));
        assert!(matches!(derive(&Shape::default(), &Ast::enums::<f64>(vec![])), Err(CompileError::EmptyEnumeration { .. })));
    }

    #[test]
    fn constraints_reach_the_leaf_through_refinement_chains_only() {
        let positive = crate::filters::greater_than(Ast::number(), 0.0);
        let bounded = crate::filters::less_than_or_equal_to(positive, 10.0);
        let op = derive(&Shape::default(), &bounded).unwrap();
        assert_eq!(op(1), "NumberKeywordNumber(Bounds { min: Some(0.0), max: Some(10.0) })");

        let wrapped = crate::filters::greater_than(Ast::tuple(vec![Element::required(Ast::number())]), 0.0);
        assert_eq!(derive(&Shape::default(), &wrapped).unwrap()(2), "[NumberKeyword]");
    }
}

//! Encoding compiler: structural value → transportable value.
//!
//! Most leaves pass through. `bigint` becomes its decimal string and symbols
//! become their registry key, so an encoded value always serializes. Unions
//! that accept a value more than once keep the heaviest encoding.
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::ast::{Ast, Keyword, Literal, Refinement, TemplateLiteral, Tuple, TypeLiteral};
use crate::engine::{self, Slot, Target};
use crate::error::{CompileError, EncodeError};
use crate::guard::{Acceptor, StructuralGuard};
use crate::hooks::{HookRegistry, Hooks};
use crate::value::{Object, PropertyKey, Symbol, Value};

type EncodeFn = dyn Fn(&Value) -> Result<Value, EncodeError> + Send + Sync;

#[derive(Clone)]
pub struct Encoder(Arc<EncodeFn>);

impl Encoder {
    pub fn new(f: impl Fn(&Value) -> Result<Value, EncodeError> + Send + Sync + 'static) -> Self {
        Encoder(Arc::new(f))
    }

    pub fn identity() -> Self { Encoder::new(|v| Ok(v.clone())) }

    pub fn encode(&self, value: &Value) -> Result<Value, EncodeError> { (self.0)(value) }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Encoder") }
}

pub fn compile_encoder(ast: &Ast) -> Result<Encoder, CompileError> {
    compile_encoder_with(ast, &HookRegistry::with_builtins(), Arc::new(StructuralGuard::new()))
}

pub fn compile_encoder_with(
    ast: &Ast,
    registry: &HookRegistry,
    acceptor: Arc<dyn Acceptor>,
) -> Result<Encoder, CompileError> {
    engine::derive(&EncodingTarget { hooks: &registry.encoder, acceptor }, ast)
}

struct EncodingTarget<'h> {
    hooks: &'h Hooks<Encoder>,
    acceptor: Arc<dyn Acceptor>,
}

fn unexpected(expected: &'static str, actual: &Value) -> EncodeError {
    EncodeError::UnexpectedShape { expected, actual: actual.kind() }
}

fn symbol_key(symbol: &Symbol) -> Value { Value::String(symbol.key().to_string()) }

impl Target for EncodingTarget<'_> {
    type Op = Encoder;
    const NAME: &'static str = "an encoder";

    fn hooks(&self) -> &Hooks<Encoder> { self.hooks }

    fn deferred(&self, slot: Slot<Encoder>) -> Encoder {
        Encoder::new(move |v| slot.get().encode(v))
    }

    fn literal(&self, literal: &Literal) -> Result<Encoder, CompileError> {
        Ok(match literal {
            Literal::BigInt(n) => {
                let n = *n;
                Encoder::new(move |_| Ok(Value::String(n.to_string())))
            }
            _ => Encoder::identity(),
        })
    }

    fn unique_symbol(&self, symbol: &Symbol) -> Result<Encoder, CompileError> {
        let encoded = symbol_key(symbol);
        Ok(Encoder::new(move |_| Ok(encoded.clone())))
    }

    fn keyword(&self, keyword: Keyword, _constraint: Option<&crate::constraints::Constraint>) -> Result<Encoder, CompileError> {
        Ok(match keyword {
            Keyword::Never => Encoder::new(|_| Err(EncodeError::Never)),
            Keyword::BigInt => Encoder::new(|v| match v {
                Value::BigInt(n) => Ok(Value::String(n.to_string())),
                other => Err(unexpected("a bigint", other)),
            }),
            Keyword::Symbol => Encoder::new(|v| match v {
                Value::Symbol(s) => Ok(symbol_key(s)),
                other => Err(unexpected("a symbol", other)),
            }),
            Keyword::Undefined
            | Keyword::Void
            | Keyword::Unknown
            | Keyword::Any
            | Keyword::String
            | Keyword::Number
            | Keyword::Boolean
            | Keyword::Object => Encoder::identity(),
        })
    }

    fn template_literal(&self, _node: &TemplateLiteral) -> Result<Encoder, CompileError> {
        Ok(Encoder::identity())
    }

    fn tuple(&self, node: &Tuple, elements: Vec<Encoder>, rest: Vec<Encoder>) -> Result<Encoder, CompileError> {
        let optional: Vec<bool> = node.elements.iter().map(|e| e.is_optional).collect();
        let required = optional.iter().filter(|o| !**o).count();
        let mut rest = rest.into_iter();
        let head = rest.next();
        let post: Vec<Encoder> = rest.collect();
        Ok(Encoder::new(move |v| {
            let Value::Array(input) = v else { return Err(unexpected("an array", v)) };
            let minimum = required + if head.is_some() { post.len() } else { 0 };
            if input.len() < minimum || (head.is_none() && input.len() > elements.len()) {
                return Err(unexpected("an array of matching length", v));
            }
            let tail_start = if head.is_some() { input.len() - post.len() } else { input.len() };
            let fixed = tail_start.min(elements.len());
            // absent optionals keep their slot only while something follows them
            let populated = if fixed < input.len() {
                input.len()
            } else {
                input
                    .iter()
                    .enumerate()
                    .rposition(|(i, x)| !matches!(x, Value::Undefined) || !optional[i])
                    .map_or(0, |i| i + 1)
            };
            let mut output = Vec::with_capacity(input.len());
            for (i, encoder) in elements.iter().enumerate().take(fixed) {
                match &input[i] {
                    Value::Undefined if optional[i] && i >= populated => {}
                    Value::Undefined if optional[i] => output.push(Value::Undefined),
                    item => output.push(encoder.encode(item)?),
                }
            }
            if let Some(head) = &head {
                for item in &input[fixed..tail_start] {
                    output.push(head.encode(item)?);
                }
                for (encoder, item) in post.iter().zip(&input[tail_start..]) {
                    output.push(encoder.encode(item)?);
                }
            }
            Ok(Value::Array(output))
        }))
    }

    fn type_literal(
        &self,
        node: &TypeLiteral,
        properties: Vec<Encoder>,
        index_signatures: Vec<(Encoder, Encoder)>,
    ) -> Result<Encoder, CompileError> {
        let declared: Vec<(PropertyKey, bool, Encoder)> = node
            .property_signatures
            .iter()
            .zip(properties)
            .map(|(p, e)| (p.name.clone(), p.is_optional, e))
            .collect();
        let signatures: Vec<(Ast, Encoder, Encoder)> = node
            .index_signatures
            .iter()
            .zip(index_signatures)
            .map(|(is, (k, v))| (is.parameter.clone(), k, v))
            .collect();
        let acceptor = self.acceptor.clone();
        Ok(Encoder::new(move |v| {
            let Value::Object(input) = v else { return Err(unexpected("an object", v)) };
            let mut output = Object::new();
            for (name, is_optional, encoder) in &declared {
                match input.get(name) {
                    None if *is_optional => {}
                    None => return Err(unexpected("an object with every required property", v)),
                    Some(Value::Undefined) if *is_optional => {
                        output.insert(name.clone(), Value::Undefined);
                    }
                    Some(value) => {
                        output.insert(name.clone(), encoder.encode(value)?);
                    }
                }
            }
            for (key, value) in input {
                if declared.iter().any(|(name, ..)| name == key) {
                    continue;
                }
                let key_value = key.to_value();
                let Some((_, key_encoder, value_encoder)) =
                    signatures.iter().find(|(parameter, ..)| acceptor.accepts(parameter, &key_value))
                else {
                    trace!(%key, "dropping undeclared key");
                    continue;
                };
                let encoded_key = PropertyKey::coerce(&key_encoder.encode(&key_value)?);
                output.insert(encoded_key, value_encoder.encode(value)?);
            }
            Ok(Value::Object(output))
        }))
    }

    fn union(&self, members: &[Ast], compiled: Vec<Encoder>) -> Result<Encoder, CompileError> {
        let members: Vec<(Ast, Encoder)> = members.iter().cloned().zip(compiled).collect();
        let acceptor = self.acceptor.clone();
        Ok(Encoder::new(move |v| {
            let mut candidates = Vec::new();
            for (ast, encoder) in &members {
                if acceptor.accepts(ast, v) {
                    candidates.push(encoder);
                } else if !candidates.is_empty() {
                    break;
                }
            }
            let Some((first, others)) = candidates.split_first() else {
                return Err(EncodeError::NoMatchingUnionMember { actual: v.kind() });
            };
            let mut best = first.encode(v)?;
            let mut best_weight = best.structural_weight();
            for encoder in others {
                let candidate = encoder.encode(v)?;
                let weight = candidate.structural_weight();
                if weight > best_weight {
                    best = candidate;
                    best_weight = weight;
                }
            }
            Ok(best)
        }))
    }

    fn enums(&self, _members: &[(String, Literal)]) -> Result<Encoder, CompileError> {
        Ok(Encoder::identity())
    }

    fn refinement(&self, _node: &Refinement, from: Encoder) -> Result<Encoder, CompileError> {
        Ok(from)
    }
}

// ------------------------------- Tests ------------------------------------ //

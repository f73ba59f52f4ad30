//! Generation compiler: schema → `proptest` strategy of [`Value`]s.
//!
//! The only compiler that consults constraints. A refinement narrows the
//! constraint its `from` is compiled under; `string` and `number` leaves read
//! the nearest one, everything else compiles its children unconstrained.
pub mod primitives;

use std::fmt;

use proptest::prelude::*;
use proptest::strategy::ValueTree;
use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};
use tracing::trace;

use crate::annotations::Annotations;
use crate::ast::{Ast, Keyword, Literal, Placeholder, Refinement, TemplateLiteral, Tuple, TypeLiteral};
use crate::constraints::{self, Bounds, Constraint};
use crate::engine::{self, Slot, Target};
use crate::error::{CompileError, SampleError};
use crate::hooks::{HookRegistry, Hooks};
use crate::value::{Object, PropertyKey, Symbol, Value};

use primitives::constant;

/// Maximum number of values drawn for a rest element.
pub const MAX_REST_LENGTH: usize = 2;
/// Maximum number of entries drawn per index signature.
pub const MAX_INDEX_ENTRIES: usize = 2;
/// Placeholder sizes inside template literals.
const TEMPLATE_STRING_LENGTH: usize = 5;
const TEMPLATE_NUMBER_DIGITS: usize = 5;

#[derive(Clone)]
pub struct Generator(BoxedStrategy<Value>);

impl Generator {
    pub fn from_strategy(strategy: impl Strategy<Value = Value> + 'static) -> Self {
        Generator(strategy.boxed())
    }

    pub fn strategy(&self) -> &BoxedStrategy<Value> { &self.0 }

    pub fn into_strategy(self) -> BoxedStrategy<Value> { self.0 }

    /// Draw one value.
    pub fn sample(&self, runner: &mut TestRunner) -> Result<Value, SampleError> {
        self.0
            .new_tree(runner)
            .map(|tree| tree.current())
            .map_err(|reason| SampleError(reason.message().to_string()))
    }

    /// Draw `count` values from a runner seeded with `seed`; equal seeds give
    /// equal sequences.
    pub fn samples(&self, seed: u64, count: usize) -> Result<Vec<Value>, SampleError> {
        let mut runner = seeded_runner(seed);
        (0..count).map(|_| self.sample(&mut runner)).collect()
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Generator") }
}

pub fn seeded_runner(seed: u64) -> TestRunner {
    let mut bytes = [0u8; 32];
    for chunk in bytes.chunks_mut(8) {
        chunk.copy_from_slice(&seed.to_le_bytes());
    }
    TestRunner::new_with_rng(Config::default(), TestRng::from_seed(RngAlgorithm::ChaCha, &bytes))
}

// ------------------------------- Compiler -------------------------------- //

pub fn compile_generator(ast: &Ast) -> Result<Generator, CompileError> {
    compile_generator_with(ast, &HookRegistry::with_builtins())
}

pub fn compile_generator_with(ast: &Ast, registry: &HookRegistry) -> Result<Generator, CompileError> {
    engine::derive(&GenerationTarget { hooks: &registry.generator }, ast)
}

struct GenerationTarget<'h> {
    hooks: &'h Hooks<Generator>,
}

impl Target for GenerationTarget<'_> {
    type Op = Generator;
    const NAME: &'static str = "a generator";

    fn hooks(&self) -> &Hooks<Generator> { self.hooks }

    /// Optional keys are always generated.
    fn optional_properties_escape(&self) -> bool { false }

    fn deferred(&self, slot: Slot<Generator>) -> Generator {
        Generator::from_strategy(Just(()).prop_flat_map(move |_| slot.get().strategy().clone()))
    }

    fn narrow(
        &self,
        inherited: Option<&Constraint>,
        annotations: &Annotations,
    ) -> Result<Option<Constraint>, CompileError> {
        let narrowed = constraints::combine(inherited, Constraint::from_annotations(annotations))?;
        trace!(?narrowed, "refinement constraint");
        Ok(narrowed)
    }

    fn literal(&self, literal: &Literal) -> Result<Generator, CompileError> {
        Ok(constant(literal.to_value()))
    }

    fn unique_symbol(&self, symbol: &Symbol) -> Result<Generator, CompileError> {
        Ok(constant(Value::Symbol(symbol.clone())))
    }

    fn keyword(&self, keyword: Keyword, constraint: Option<&Constraint>) -> Result<Generator, CompileError> {
        match keyword {
            Keyword::Undefined | Keyword::Void => Ok(constant(Value::Undefined)),
            Keyword::Never => Err(CompileError::Never { target: Self::NAME }),
            Keyword::Unknown | Keyword::Any => Ok(primitives::anything()),
            Keyword::Object => Ok(primitives::object()),
            Keyword::String => match constraint {
                Some(Constraint::String(bounds)) => primitives::string(*bounds),
                _ => primitives::string(Bounds::default()),
            },
            Keyword::Number => match constraint {
                Some(Constraint::Integer(bounds)) => primitives::integer(*bounds),
                Some(Constraint::Number(bounds)) => primitives::float(*bounds),
                _ => primitives::float(Bounds::default()),
            },
            Keyword::Boolean => Ok(primitives::boolean()),
            Keyword::BigInt => Ok(primitives::bigint()),
            Keyword::Symbol => Ok(primitives::symbol()),
        }
    }

    fn template_literal(&self, node: &TemplateLiteral) -> Result<Generator, CompileError> {
        let mut parts = vec![constant(Value::String(node.head.clone()))];
        for span in &node.spans {
            parts.push(match span.placeholder {
                Placeholder::String => primitives::short_string(TEMPLATE_STRING_LENGTH),
                Placeholder::Number => primitives::numeral(TEMPLATE_NUMBER_DIGITS),
            });
            parts.push(constant(Value::String(span.literal.clone())));
        }
        Ok(Generator::from_strategy(
            primitives::sequence(parts).prop_map(|xs| Value::String(xs.iter().filter_map(Value::as_str).collect())),
        ))
    }

    fn tuple(&self, node: &Tuple, elements: Vec<Generator>, rest: Vec<Generator>) -> Result<Generator, CompileError> {
        let count = elements.len();
        // the length is drawn first so a truncated element is never generated
        let mut output = match node.first_optional() {
            Some(first_optional) if rest.is_empty() => (first_optional..=count)
                .prop_flat_map(move |len| primitives::sequence(elements[..len].to_vec()))
                .boxed(),
            _ => primitives::sequence(elements),
        };
        let mut rest = rest.into_iter();
        if let Some(head) = rest.next() {
            output = (output, primitives::bounded(head, MAX_REST_LENGTH))
                .prop_map(|(mut xs, tail)| {
                    xs.extend(tail);
                    xs
                })
                .boxed();
            for post in rest {
                output = (output, post.into_strategy())
                    .prop_map(|(mut xs, x)| {
                        xs.push(x);
                        xs
                    })
                    .boxed();
            }
        }
        Ok(Generator::from_strategy(output.prop_map(Value::Array)))
    }

    fn type_literal(
        &self,
        node: &TypeLiteral,
        properties: Vec<Generator>,
        index_signatures: Vec<(Generator, Generator)>,
    ) -> Result<Generator, CompileError> {
        let names: Vec<PropertyKey> = node.property_signatures.iter().map(|p| p.name.clone()).collect();
        let mut output: BoxedStrategy<Object> = primitives::sequence(properties)
            .prop_map(move |values| names.iter().cloned().zip(values).collect::<Object>())
            .boxed();
        for (parameter, value) in index_signatures {
            output = (output, primitives::entries(parameter, value, MAX_INDEX_ENTRIES))
                .prop_map(|(mut object, entries)| {
                    for (key, value) in entries {
                        object.entry(PropertyKey::coerce(&key)).or_insert(value);
                    }
                    object
                })
                .boxed();
        }
        Ok(Generator::from_strategy(output.prop_map(Value::Object)))
    }

    fn union(&self, _members: &[Ast], compiled: Vec<Generator>) -> Result<Generator, CompileError> {
        primitives::one_of(compiled).ok_or(CompileError::Never { target: Self::NAME })
    }

    fn enums(&self, members: &[(String, Literal)]) -> Result<Generator, CompileError> {
        let values = members.iter().map(|(_, literal)| constant(literal.to_value())).collect();
        primitives::one_of(values).ok_or(CompileError::EmptyEnumeration { target: Self::NAME })
    }

    fn refinement(&self, node: &Refinement, from: Generator) -> Result<Generator, CompileError> {
        let predicate = node.predicate.clone();
        Ok(Generator::from_strategy(
            from.into_strategy().prop_filter("refinement rejected value", move |v| predicate(v).is_accepted()),
        ))
    }
}

// ------------------------------- Tests ------------------------------------ //

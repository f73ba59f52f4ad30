//! The generator algebra the generation compiler requests from.
//!
//! Everything here is a thin layer over `proptest` strategies producing
//! [`Value`]s; the compiler decides *what* to ask for, these decide *how*.
use proptest::collection::vec;
use proptest::prelude::*;

use super::Generator;
use crate::constraints::{Bounds, Constraint};
use crate::error::CompileError;
use crate::value::{Object, PropertyKey, Symbol, Value};

// ------------------------------- Policy ---------------------------------- //

/// Upper string length when no constraint says otherwise.
pub const DEFAULT_MAX_STRING_LENGTH: usize = 10;
/// Span of a float range that is bounded on one side only.
const ONE_SIDED_FLOAT_SPAN: f64 = 1.0e9;
/// Integer range when unbounded: the 32-bit range.
const DEFAULT_INTEGER_MIN: i64 = i32::MIN as i64;
const DEFAULT_INTEGER_MAX: i64 = i32::MAX as i64;

// ------------------------------ Constants -------------------------------- //

pub fn constant(value: Value) -> Generator { Generator::from_strategy(Just(value)) }

pub fn boolean() -> Generator { Generator::from_strategy(any::<bool>().prop_map(Value::Bool)) }

pub fn bigint() -> Generator {
    Generator::from_strategy(any::<i64>().prop_map(|n| Value::BigInt(n as i128)))
}

// ------------------------------- Strings --------------------------------- //

fn ascii(min: usize, max: usize) -> BoxedStrategy<String> {
    vec(proptest::char::range(' ', '~'), min..=max)
        .prop_map(|cs| cs.into_iter().collect::<String>())
        .boxed()
}

pub fn string(bounds: Bounds<usize>) -> Result<Generator, CompileError> {
    if bounds.is_empty() {
        return Err(CompileError::UnsatisfiableConstraint(Constraint::String(bounds)));
    }
    let min = bounds.min.unwrap_or(0);
    let max = bounds.max.unwrap_or(min.max(DEFAULT_MAX_STRING_LENGTH));
    Ok(Generator::from_strategy(ascii(min, max).prop_map(Value::String)))
}

/// At most `max` printable characters.
pub fn short_string(max: usize) -> Generator {
    Generator::from_strategy(ascii(0, max).prop_map(Value::String))
}

/// A non-negative integer numeral of 1 to `max_digits` digits.
pub fn numeral(max_digits: usize) -> Generator {
    Generator::from_strategy(
        vec(proptest::char::range('0', '9'), 1..=max_digits.max(1)).prop_map(|ds| {
            let s: String = ds.into_iter().collect();
            let trimmed = s.trim_start_matches('0');
            Value::String(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
        }),
    )
}

pub fn symbol() -> Generator {
    Generator::from_strategy(ascii(0, DEFAULT_MAX_STRING_LENGTH).prop_map(|s| Value::Symbol(Symbol::for_key(s))))
}

// ------------------------------- Numbers --------------------------------- //

fn finite_float() -> BoxedStrategy<f64> {
    use proptest::num::f64::{NEGATIVE, NORMAL, POSITIVE, ZERO};
    (POSITIVE | NEGATIVE | NORMAL | ZERO).boxed()
}

pub fn float(bounds: Bounds<f64>) -> Result<Generator, CompileError> {
    let (lo, hi) = match (bounds.min, bounds.max) {
        (None, None) => return Ok(Generator::from_strategy(finite_float().prop_map(Value::Number))),
        (Some(lo), None) => (lo, lo + ONE_SIDED_FLOAT_SPAN),
        (None, Some(hi)) => (hi - ONE_SIDED_FLOAT_SPAN, hi),
        (Some(lo), Some(hi)) => (lo, hi),
    };
    if !(lo <= hi) || !lo.is_finite() || !hi.is_finite() {
        return Err(CompileError::UnsatisfiableConstraint(Constraint::Number(bounds)));
    }
    Ok(Generator::from_strategy((lo..=hi).prop_map(Value::Number)))
}

pub fn integer(bounds: Bounds<f64>) -> Result<Generator, CompileError> {
    let lo = bounds.min.map(|m| m.ceil() as i64);
    let hi = bounds.max.map(|m| m.floor() as i64);
    let (lo, hi) = match (lo, hi) {
        (None, None) => (DEFAULT_INTEGER_MIN, DEFAULT_INTEGER_MAX),
        (Some(lo), None) => (lo, lo.max(DEFAULT_INTEGER_MAX)),
        (None, Some(hi)) => (hi.min(DEFAULT_INTEGER_MIN), hi),
        (Some(lo), Some(hi)) => (lo, hi),
    };
    if lo > hi {
        return Err(CompileError::UnsatisfiableConstraint(Constraint::Integer(bounds)));
    }
    Ok(Generator::from_strategy((lo..=hi).prop_map(|n| Value::Number(n as f64))))
}

// ------------------------------ Anything --------------------------------- //

fn key() -> BoxedStrategy<PropertyKey> { ascii(0, 8).prop_map(PropertyKey::String).boxed() }

/// Any value, nested at most a few levels deep.
pub fn anything() -> Generator {
    let leaf = prop_oneof![
        Just(Value::Undefined),
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        finite_float().prop_map(Value::Number),
        ascii(0, DEFAULT_MAX_STRING_LENGTH).prop_map(Value::String),
        any::<i64>().prop_map(|n| Value::BigInt(n as i128)),
    ];
    Generator::from_strategy(leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..4).prop_map(Value::Array),
            vec((key(), inner), 0..4).prop_map(|es| Value::Object(es.into_iter().collect())),
        ]
    }))
}

/// A record or a sequence of anything.
pub fn object() -> Generator {
    let inner = anything().into_strategy();
    Generator::from_strategy(prop_oneof![
        vec((key(), inner.clone()), 0..4).prop_map(|es| Value::Object(es.into_iter().collect::<Object>())),
        vec(inner, 0..4).prop_map(Value::Array),
    ])
}

// ----------------------------- Combinators ------------------------------- //

/// One value per generator, in order.
pub fn sequence(generators: Vec<Generator>) -> BoxedStrategy<Vec<Value>> {
    generators.into_iter().fold(Just(Vec::new()).boxed(), |acc, g| {
        (acc, g.into_strategy())
            .prop_map(|(mut xs, x)| {
                xs.push(x);
                xs
            })
            .boxed()
    })
}

/// Between zero and `max` values of `item`.
pub fn bounded(item: Generator, max: usize) -> BoxedStrategy<Vec<Value>> {
    vec(item.into_strategy(), 0..=max).boxed()
}

/// Between zero and `max` generated key/value pairs.
pub fn entries(key: Generator, value: Generator, max: usize) -> BoxedStrategy<Vec<(Value, Value)>> {
    vec((key.into_strategy(), value.into_strategy()), 0..=max).boxed()
}

/// Equal-weight choice; `None` when there is nothing to choose from.
pub fn one_of(alternatives: Vec<Generator>) -> Option<Generator> {
    if alternatives.is_empty() {
        return None;
    }
    Some(Generator::from_strategy(proptest::strategy::Union::new(
        alternatives.into_iter().map(Generator::into_strategy),
    )))
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_respects_length_bounds() {
        let g = string(Bounds { min: Some(2), max: Some(4) }).unwrap();
        for v in g.samples(1, 200).unwrap() {
            let n = v.as_str().unwrap().chars().count();
            assert!((2..=4).contains(&n), "{n}");
        }
    }

    #[test]
    fn min_only_string_still_has_room() {
        let g = string(Bounds { min: Some(20), max: None }).unwrap();
        for v in g.samples(2, 50).unwrap() {
            assert!(v.as_str().unwrap().len() >= 20);
        }
    }

    #[test]
    fn crossed_bounds_are_rejected_at_compile_time() {
        assert!(string(Bounds { min: Some(5), max: Some(1) }).is_err());
        assert!(float(Bounds { min: Some(1.0), max: Some(0.0) }).is_err());
        assert!(integer(Bounds { min: Some(0.2), max: Some(0.8) }).is_err());
    }

    #[test]
    fn integers_are_integral_and_bounded() {
        let g = integer(Bounds { min: Some(-2.5), max: Some(3.5) }).unwrap();
        for v in g.samples(3, 300).unwrap() {
            let n = v.as_f64().unwrap();
            assert_eq!(n.fract(), 0.0);
            assert!((-2.0..=3.0).contains(&n));
        }
    }

    #[test]
    fn one_sided_floats_stay_on_their_side() {
        let g = float(Bounds { min: None, max: Some(-1.0) }).unwrap();
        assert!(g.samples(4, 300).unwrap().iter().all(|v| v.as_f64().unwrap() <= -1.0));
    }

    #[test]
    fn numerals_have_no_leading_zeros() {
        for v in numeral(5).samples(5, 300).unwrap() {
            let s = v.as_str().unwrap();
            assert!(s == "0" || !s.starts_with('0'), "{s}");
            assert!(s.len() <= 5 && s.parse::<u64>().is_ok());
        }
    }

    #[test]
    fn sequence_preserves_order() {
        let g = sequence(vec![constant(Value::from("a")), constant(Value::Null), constant(Value::from(true))]);
        let xs = Generator::from_strategy(g.prop_map(Value::Array)).samples(6, 1).unwrap();
        assert_eq!(xs[0], Value::Array(vec![Value::from("a"), Value::Null, Value::from(true)]));
    }

    #[test]
    fn object_keyword_produces_records_and_sequences() {
        let kinds: std::collections::BTreeSet<_> =
            object().samples(7, 200).unwrap().iter().map(Value::kind).collect();
        assert_eq!(kinds.into_iter().collect::<Vec<_>>(), ["array", "object"]);
    }

    #[test]
    fn empty_choice_is_none() {
        assert!(one_of(vec![]).is_none());
    }
}

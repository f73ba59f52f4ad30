//! Refinement constructors.
//!
//! Each wraps `from` in a [`Refinement`](crate::ast::Refinement) carrying the
//! predicate plus the `TypeId` and `JsonSchema` annotations constraint
//! extraction reads, so the generation compiler can produce conforming values
//! directly instead of filtering for them.
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::annotations::{AnnotationId, Annotations, TypeId};
use crate::ast::{Ast, Outcome};
use crate::value::{Value, format_number};

/// Identifier of [`uuid`] refinements; the generator hook for it is part of
/// [`HookRegistry::with_builtins`](crate::hooks::HookRegistry::with_builtins).
pub const UUID_IDENTIFIER: &str = "Uuid";

pub static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("static uuid pattern")
});

fn refine(
    from: Ast,
    annotations: Annotations,
    predicate: impl Fn(&Value) -> Outcome + Send + Sync + 'static,
) -> Ast {
    Ast::refinement(from, Arc::new(predicate), annotations)
}

fn annotations(type_id: TypeId, json_schema: serde_json::Value) -> Annotations {
    Annotations::new()
        .with(AnnotationId::TypeId, json!(type_id))
        .with(AnnotationId::JsonSchema, json_schema)
}

fn check_number(value: &Value, expected: impl Fn(f64) -> bool, description: String) -> Outcome {
    match value.as_f64() {
        Some(n) if expected(n) => Outcome::Accepted,
        Some(n) => Outcome::Rejected(format!("expected {description}, actual {}", format_number(n))),
        None => Outcome::Rejected(format!("expected {description}, actual a {}", value.kind())),
    }
}

fn check_string(value: &Value, expected: impl Fn(&str) -> bool, description: String) -> Outcome {
    match value.as_str() {
        Some(s) if expected(s) => Outcome::Accepted,
        Some(s) => Outcome::Rejected(format!("expected {description}, actual {s:?}")),
        None => Outcome::Rejected(format!("expected {description}, actual a {}", value.kind())),
    }
}

// ------------------------------- Numbers --------------------------------- //

pub fn greater_than(from: Ast, min: f64) -> Ast {
    refine(from, annotations(TypeId::GreaterThan, json!({ "exclusiveMinimum": min })), move |v| {
        check_number(v, |n| n > min, format!("a number greater than {}", format_number(min)))
    })
}

pub fn greater_than_or_equal_to(from: Ast, min: f64) -> Ast {
    refine(from, annotations(TypeId::GreaterThanOrEqualTo, json!({ "minimum": min })), move |v| {
        check_number(v, |n| n >= min, format!("a number greater than or equal to {}", format_number(min)))
    })
}

pub fn less_than(from: Ast, max: f64) -> Ast {
    refine(from, annotations(TypeId::LessThan, json!({ "exclusiveMaximum": max })), move |v| {
        check_number(v, |n| n < max, format!("a number less than {}", format_number(max)))
    })
}

pub fn less_than_or_equal_to(from: Ast, max: f64) -> Ast {
    refine(from, annotations(TypeId::LessThanOrEqualTo, json!({ "maximum": max })), move |v| {
        check_number(v, |n| n <= max, format!("a number less than or equal to {}", format_number(max)))
    })
}

/// Inclusive on both ends.
pub fn between(from: Ast, min: f64, max: f64) -> Ast {
    less_than_or_equal_to(greater_than_or_equal_to(from, min), max)
}

pub fn positive(from: Ast) -> Ast { greater_than(from, 0.0) }

pub fn non_negative(from: Ast) -> Ast { greater_than_or_equal_to(from, 0.0) }

pub fn int(from: Ast) -> Ast {
    refine(from, annotations(TypeId::Int, json!({ "type": "integer" })), |v| {
        check_number(v, |n| n.is_finite() && n.fract() == 0.0, "an integer".to_string())
    })
}

// ------------------------------- Strings --------------------------------- //

pub fn min_length(from: Ast, min: usize) -> Ast {
    refine(from, annotations(TypeId::MinLength, json!({ "minLength": min })), move |v| {
        check_string(v, |s| s.chars().count() >= min, format!("a string at least {min} character(s) long"))
    })
}

pub fn max_length(from: Ast, max: usize) -> Ast {
    refine(from, annotations(TypeId::MaxLength, json!({ "maxLength": max })), move |v| {
        check_string(v, |s| s.chars().count() <= max, format!("a string at most {max} character(s) long"))
    })
}

pub fn non_empty(from: Ast) -> Ast { min_length(from, 1) }

pub fn pattern(from: Ast, regex: Regex) -> Ast {
    let annotations = annotations(TypeId::Pattern, json!({ "pattern": regex.as_str() }));
    refine(from, annotations, move |v| {
        check_string(v, |s| regex.is_match(s), format!("a string matching the pattern {}", regex.as_str()))
    })
}

/// Carries the [`UUID_IDENTIFIER`] so generation can go through a hook; a
/// random string practically never matches.
pub fn uuid(from: Ast) -> Ast {
    let annotations = annotations(TypeId::Pattern, json!({ "format": "uuid", "pattern": UUID_REGEX.as_str() }))
        .with_identifier(UUID_IDENTIFIER);
    refine(from, annotations, |v| check_string(v, |s| UUID_REGEX.is_match(s), "a UUID".to_string()))
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstKind;
    use crate::constraints::{Bounds, Constraint};

    fn check(ast: &Ast, value: Value) -> Outcome {
        let AstKind::Refinement(r) = ast.kind() else { panic!("expected refinement") };
        (r.predicate)(&value)
    }

    #[test]
    fn number_bounds_check_and_describe() {
        let gt = greater_than(Ast::number(), 0.0);
        assert!(check(&gt, Value::Number(0.5)).is_accepted());
        assert_eq!(
            check(&gt, Value::Number(0.0)),
            Outcome::Rejected("expected a number greater than 0, actual 0".into())
        );
        assert_eq!(
            check(&gt, Value::from("1")),
            Outcome::Rejected("expected a number greater than 0, actual a string".into())
        );
        assert!(check(&less_than_or_equal_to(Ast::number(), 2.0), Value::Number(2.0)).is_accepted());
    }

    #[test]
    fn annotations_feed_constraint_extraction() {
        let a = greater_than(Ast::number(), 1.0);
        assert_eq!(
            Constraint::from_annotations(a.annotations()),
            Some(Constraint::Number(Bounds { min: Some(1.0), max: None }))
        );
        let s = max_length(Ast::string(), 8);
        assert_eq!(
            Constraint::from_annotations(s.annotations()),
            Some(Constraint::String(Bounds { min: None, max: Some(8) }))
        );
        assert_eq!(Constraint::from_annotations(int(Ast::number()).annotations()), Some(Constraint::Integer(Bounds::default())));
    }

    #[test]
    fn int_rejects_fractions_and_infinities() {
        let i = int(Ast::number());
        assert!(check(&i, Value::Number(-4.0)).is_accepted());
        assert!(!check(&i, Value::Number(0.5)).is_accepted());
        assert!(!check(&i, Value::Number(f64::INFINITY)).is_accepted());
    }

    #[test]
    fn lengths_count_characters() {
        let m = min_length(Ast::string(), 2);
        assert!(check(&m, Value::from("éé")).is_accepted());
        assert!(!check(&m, Value::from("é")).is_accepted());
    }

    #[test]
    fn uuid_is_a_hookable_pattern() {
        let u = uuid(Ast::string());
        assert_eq!(u.annotations().identifier(), Some(UUID_IDENTIFIER));
        assert_eq!(u.annotations().type_id(), Some(TypeId::Pattern));
        assert!(check(&u, Value::from("123e4567-e89b-42d3-a456-426614174000")).is_accepted());
        assert!(!check(&u, Value::from("not-a-uuid")).is_accepted());
    }

    #[test]
    fn pattern_records_its_source() {
        let p = pattern(Ast::string(), Regex::new("^a+$").unwrap());
        assert_eq!(p.annotations().json_schema().unwrap()["pattern"], "^a+$");
        assert!(check(&p, Value::from("aaa")).is_accepted());
    }
}

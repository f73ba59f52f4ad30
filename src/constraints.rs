//! Range constraints accumulated along refinement chains.
//!
//! Combination is a meet: the tighter bound wins on each side. Integer is a
//! refinement of number, so mixing the two stays integer.
use crate::annotations::{Annotations, TypeId};
use crate::error::CompileError;

#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    Number(Bounds<f64>),
    Integer(Bounds<f64>),
    String(Bounds<usize>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub(crate) fn meet(a: &Self, b: &Self) -> Self {
        Self {
            min: pick(a.min, b.min, |x, y| if x >= y { x } else { y }),
            max: pick(a.max, b.max, |x, y| if x <= y { x } else { y }),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!((self.min, self.max), (Some(lo), Some(hi)) if lo > hi)
    }
}

fn pick<T: Copy>(a: Option<T>, b: Option<T>, choose: impl Fn(T, T) -> T) -> Option<T> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x),
        (Some(x), Some(y)) => Some(choose(x, y)),
    }
}

// ------------------------------ Extraction ------------------------------- //

impl Constraint {
    /// The constraint a refinement's annotations encode, if any.
    pub fn from_annotations(annotations: &Annotations) -> Option<Constraint> {
        let length = |key: &str| annotations.json_schema_number(&[key]).map(|n| n.max(0.0) as usize);
        match annotations.type_id()? {
            TypeId::GreaterThan | TypeId::GreaterThanOrEqualTo => Some(Constraint::Number(Bounds {
                min: annotations.json_schema_number(&["exclusiveMinimum", "minimum"]),
                max: None,
            })),
            TypeId::LessThan | TypeId::LessThanOrEqualTo => Some(Constraint::Number(Bounds {
                min: None,
                max: annotations.json_schema_number(&["exclusiveMaximum", "maximum"]),
            })),
            TypeId::Int => Some(Constraint::Integer(Bounds::default())),
            TypeId::MinLength => Some(Constraint::String(Bounds { min: length("minLength"), max: None })),
            TypeId::MaxLength => Some(Constraint::String(Bounds { min: None, max: length("maxLength") })),
            TypeId::Pattern => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Constraint::Number(b) | Constraint::Integer(b) => b.is_empty(),
            Constraint::String(b) => b.is_empty(),
        }
    }
}

// ------------------------------ Combination ------------------------------ //

/// Combine the constraint inherited from enclosing refinements with the one
/// contributed by the current refinement.
pub fn combine(
    outer: Option<&Constraint>,
    inner: Option<Constraint>,
) -> Result<Option<Constraint>, CompileError> {
    let (outer, inner) = match (outer, inner) {
        (None, inner) => return Ok(inner),
        (Some(outer), None) => return Ok(Some(outer.clone())),
        (Some(outer), Some(inner)) => (outer, inner),
    };
    use Constraint::*;
    let out = match (outer, &inner) {
        (Number(a), Number(b)) => Number(Bounds::meet(a, b)),
        (Number(a), Integer(b)) | (Integer(a), Number(b)) | (Integer(a), Integer(b)) => {
            Integer(Bounds::meet(a, b))
        }
        (String(a), String(b)) => String(Bounds::meet(a, b)),
        _ => {
            return Err(CompileError::IncompatibleConstraints { outer: outer.clone(), inner: inner.clone() });
        }
    };
    Ok(Some(out))
}

// ------------------------------- Tests ------------------------------------ //

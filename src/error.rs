//! Error taxonomy.
//!
//! Compile-time errors describe AST shapes a target cannot derive from and
//! are raised before any operation exists. The remaining enums are use-time
//! failures of operations that compiled fine but were handed bad input.
use thiserror::Error;

use crate::constraints::Constraint;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("cannot build {target} for `{kind}`")]
    UnsupportedNodeKind { target: &'static str, kind: &'static str },

    #[error("cannot build {target} for an empty enum")]
    EmptyEnumeration { target: &'static str },

    #[error("cannot build {target} for declaration `{identifier}`: no handler registered and no underlying type")]
    MissingHookHandler { target: &'static str, identifier: String },

    #[error("cannot build {target} for `never`")]
    Never { target: &'static str },

    #[error("cannot combine {outer:?} with {inner:?}")]
    IncompatibleConstraints { outer: Constraint, inner: Constraint },

    #[error("constraint {0:?} admits no value")]
    UnsatisfiableConstraint(Constraint),

    #[error("cannot build {target}: lazy schema refers to itself without a terminating branch")]
    UnguardedRecursion { target: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("no union member accepts the {actual} value")]
    NoMatchingUnionMember { actual: &'static str },

    #[error("cannot encode a value of type `never`")]
    Never,

    #[error("expected {expected}, actual {actual}")]
    UnexpectedShape { expected: &'static str, actual: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("no union member accepts the {actual} value")]
    NoMatchingUnionMember { actual: &'static str },

    #[error("cannot render a value of type `never`")]
    Never,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("generator gave up: {0}")]
pub struct SampleError(pub String);

#[derive(Error, Debug, Clone, PartialEq)]
#[error("value is not representable as JSON: {0}")]
pub struct WireError(pub String);

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("at JSON path {path} → {message}")]
    Parse { path: String, message: String },

    #[error("unknown definition `{0}`")]
    UnknownDefinition(String),

    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern { pattern: String, #[source] source: regex::Error },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

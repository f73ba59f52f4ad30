//! Runtime values the derived operations produce and consume.
//!
//! The domain is wider than JSON: it distinguishes `undefined` from `null`,
//! carries arbitrary-precision-ish integers (`BigInt`) and registry symbols.
//! Conversion *from* JSON is total; conversion *to* JSON (via `serde`) follows
//! `JSON.stringify` and fails on values an encoder should have removed.
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

pub type Object = IndexMap<PropertyKey, Value>;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Symbol(Symbol),
    Array(Vec<Value>),
    Object(Object),
}

/// A registry symbol: equal iff the keys are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(String),
    Symbol(Symbol),
}

// ------------------------------- Symbols --------------------------------- //

impl Symbol {
    pub fn for_key(key: impl AsRef<str>) -> Self { Self(Arc::from(key.as_ref())) }
    pub fn key(&self) -> &str { &self.0 }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

// ----------------------------- Property keys ----------------------------- //

impl PropertyKey {
    /// Coerce a generated value into an object key the way property access
    /// would: symbols stay symbols, everything else goes through its string
    /// form.
    pub fn coerce(value: &Value) -> Self {
        match value {
            Value::String(s) => PropertyKey::String(s.clone()),
            Value::Symbol(s) => PropertyKey::Symbol(s.clone()),
            Value::Number(n) => PropertyKey::String(format_number(*n)),
            Value::BigInt(n) => PropertyKey::String(n.to_string()),
            Value::Bool(b) => PropertyKey::String(b.to_string()),
            Value::Null => PropertyKey::String("null".into()),
            Value::Undefined => PropertyKey::String("undefined".into()),
            Value::Array(_) | Value::Object(_) => PropertyKey::String(String::from("[object]")),
        }
    }

    /// The key as a value, for acceptance checks against index signature
    /// parameters.
    pub fn to_value(&self) -> Value {
        match self {
            PropertyKey::String(s) => Value::String(s.clone()),
            PropertyKey::Symbol(s) => Value::Symbol(s.clone()),
        }
    }

    pub fn is_symbol(&self) -> bool { matches!(self, PropertyKey::Symbol(_)) }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self { PropertyKey::String(s.to_string()) }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self { PropertyKey::String(s) }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => f.write_str(s),
            PropertyKey::Symbol(s) => write!(f, "[{s}]"),
        }
    }
}

// -------------------------------- Values --------------------------------- //

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_undefined(&self) -> bool { matches!(self, Value::Undefined) }

    pub fn as_f64(&self) -> Option<f64> {
        match self { Value::Number(n) => Some(*n), _ => None }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self { Value::String(s) => Some(s), _ => None }
    }

    /// Sequence length or own key count; zero for everything else.
    pub fn structural_weight(&self) -> usize {
        match self {
            Value::Array(xs) => xs.len(),
            Value::Object(m) => m.len(),
            _ => 0,
        }
    }

    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<PropertyKey>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(xs) => Value::Array(xs.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(m) => Value::Object(
                m.into_iter().map(|(k, v)| (PropertyKey::String(k), Value::from(v))).collect()
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_string()) }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self { Value::Number(n) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}

// -------------------------------- Wire ----------------------------------- //

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if !n.is_finite() => serializer.serialize_unit(),
            Value::Number(n) if is_exact_i64(*n) => serializer.serialize_i64(*n as i64),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::BigInt(n) => Err(S::Error::custom(format!("cannot serialize bigint {n}n; encode it first"))),
            Value::Symbol(s) => Err(S::Error::custom(format!("cannot serialize {s}; encode it first"))),
            Value::Array(xs) => {
                let mut seq = serializer.serialize_seq(Some(xs.len()))?;
                for x in xs {
                    seq.serialize_element(x)?;
                }
                seq.end()
            }
            Value::Object(m) => {
                let mut map = serializer.serialize_map(None)?;
                for (k, v) in m {
                    match k {
                        PropertyKey::String(k) if !v.is_undefined() => map.serialize_entry(k, v)?,
                        // symbol keys and undefined members are dropped
                        _ => {}
                    }
                }
                map.end()
            }
        }
    }
}

impl Value {
    pub fn to_json(&self) -> Result<serde_json::Value, crate::error::WireError> {
        serde_json::to_value(self).map_err(|e| crate::error::WireError(e.to_string()))
    }
}

// ------------------------------- Utilities -------------------------------- //

fn is_exact_i64(n: f64) -> bool {
    n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64
}

/// Number formatting as a JavaScript engine prints it for the common cases:
/// integral values without a fraction, `NaN`, signed `Infinity`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n == 0.0 {
        "0".into()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{n}")
    }
}

// ------------------------------- Tests ------------------------------------ //

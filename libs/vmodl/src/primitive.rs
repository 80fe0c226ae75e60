//! Scalar values.

use chrono::{DateTime, Utc};

/// A scalar value from the object model.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// UTF-8 string.
    String(String),

    /// Integer of any wire width (byte, short, int, long).
    Int(i64),

    /// Floating point (float, double).
    Float(f64),

    /// Boolean.
    Bool(bool),

    /// Point in time.
    DateTime(DateTime<Utc>),

    /// Binary blob (base64 on the wire).
    Binary(Vec<u8>),

    /// A type used as a value (e.g. an event category class).
    TypeName(String),

    /// A method reference the client could not resolve to a declaring type.
    UnresolvedMethod(String),

    /// A method reference bound to its declaring type.
    Method {
        declaring_type: String,
        name: String,
    },

    /// An enumeration token (e.g. `poweredOn`).
    Enum(String),
}

impl Primitive {
    /// Returns the string payload for `String` and `Enum` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(s) | Primitive::Enum(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Primitive::String(value.to_string())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Primitive::String(value)
    }
}

impl From<i64> for Primitive {
    fn from(value: i64) -> Self {
        Primitive::Int(value)
    }
}

impl From<i32> for Primitive {
    fn from(value: i32) -> Self {
        Primitive::Int(i64::from(value))
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        Primitive::Float(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Primitive::Bool(value)
    }
}

impl From<DateTime<Utc>> for Primitive {
    fn from(value: DateTime<Utc>) -> Self {
        Primitive::DateTime(value)
    }
}

impl From<Vec<u8>> for Primitive {
    fn from(value: Vec<u8>) -> Self {
        Primitive::Binary(value)
    }
}

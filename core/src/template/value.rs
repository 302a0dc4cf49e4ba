//! Values flowing through template pipelines

use std::fmt;

/// A template value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Text
    Str(String),
    /// Integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// Sequence of strings
    List(Vec<String>),
}

/// Static type of a function parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// [`Value::Str`]
    Str,
    /// [`Value::Int`]
    Int,
    /// [`Value::Bool`]
    Bool,
    /// [`Value::List`]
    List,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Str => write!(f, "string"),
            Kind::Int => write!(f, "int"),
            Kind::Bool => write!(f, "bool"),
            Kind::List => write!(f, "[]string"),
        }
    }
}

impl Value {
    /// Type of this value
    pub fn kind(&self) -> Kind {
        match self {
            Value::Str(_) => Kind::Str,
            Value::Int(_) => Kind::Int,
            Value::Bool(_) => Kind::Bool,
            Value::List(_) => Kind::List,
        }
    }
}

/// Printed form: lists render as `[a b c]`
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(items) => write!(f, "[{}]", items.join(" ")),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

//! Runtime value representation
//!
//! Values are produced by the host evaluator. The collector stores them in
//! heap objects and hands them back, but never looks inside. Host types the
//! enum does not cover travel as [`Value::Host`].

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Type tag of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Nil,
    Bool,
    Int,
    Float,
    Str,
    Func,
    Host,
}

impl Tag {
    /// Name of the tag as the managed language spells it
    pub const fn name(self) -> &'static str {
        match self {
            Tag::Nil => "nil",
            Tag::Bool => "bool",
            Tag::Int => "int",
            Tag::Float => "float64",
            Tag::Str => "string",
            Tag::Func => "func",
            Tag::Host => "host",
        }
    }
}

/// A dynamically-typed value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Immutable string, shared between copies
    Str(Rc<str>),
    /// Function value, identified by its declared name
    Func(Rc<str>),
    /// Evaluator-defined data; compares by identity
    Host(Rc<dyn Any>),
}

impl Value {
    /// Create a nil value
    #[inline]
    pub const fn nil() -> Self {
        Value::Nil
    }

    /// Create an integer value
    #[inline]
    pub const fn int(val: i64) -> Self {
        Value::Int(val)
    }

    /// Create a boolean value
    #[inline]
    pub const fn bool(val: bool) -> Self {
        Value::Bool(val)
    }

    /// Create a float value
    #[inline]
    pub const fn float(val: f64) -> Self {
        Value::Float(val)
    }

    /// Create a string value
    pub fn str(val: &str) -> Self {
        Value::Str(Rc::from(val))
    }

    /// Create a function value
    pub fn func(name: &str) -> Self {
        Value::Func(Rc::from(name))
    }

    /// Wrap an evaluator-defined value
    pub fn host<T: Any>(val: T) -> Self {
        Value::Host(Rc::new(val))
    }

    /// Get the type tag
    pub fn tag(&self) -> Tag {
        match self {
            Value::Nil => Tag::Nil,
            Value::Bool(_) => Tag::Bool,
            Value::Int(_) => Tag::Int,
            Value::Float(_) => Tag::Float,
            Value::Str(_) => Tag::Str,
            Value::Func(_) => Tag::Func,
            Value::Host(_) => Tag::Host,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Get as integer if this is an int
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as boolean if this is a bool
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as string slice if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get host data of type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Host(data) => data.downcast_ref(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) | (Value::Func(a), Value::Func(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Func(name) => write!(f, "func {}", name),
            Value::Host(_) => write!(f, "<host>"),
        }
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

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

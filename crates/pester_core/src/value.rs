//! Values visible to pack scripts.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::scope::FrameId;

/// Shared, mutable table contents.
pub type Table = Rc<RefCell<BTreeMap<String, Value>>>;

/// A script value.
///
/// Functions and tables have reference identity: two values are equal only
/// when they point at the same allocation.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
    Function(Rc<Function>),
    Table(Table),
}

/// A function literal together with the frame it was defined in.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<String>,
    /// Frame the literal was evaluated in.
    pub env: FrameId,
    /// Outer names the body may resolve. `None` captures everything visible.
    pub captures: Option<BTreeSet<String>>,
}

impl Function {
    pub fn new(env: FrameId, params: Vec<String>) -> Self {
        Self {
            name: None,
            params,
            env,
            captures: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict the function to the given outer names.
    pub fn capturing<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.captures = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

impl Value {
    pub fn table() -> Self {
        Value::Table(Rc::new(RefCell::new(BTreeMap::new())))
    }

    pub fn function(function: Function) -> Self {
        Value::Function(Rc::new(function))
    }

    /// Lua type name of the value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Table(_) => "table",
        }
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Function(func) => match &func.name {
                Some(name) => write!(f, "function: {name}"),
                None => write!(f, "function: {:p}", Rc::as_ptr(func)),
            },
            Value::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
        }
    }
}

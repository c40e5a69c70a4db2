use std::fmt;
use std::rc::Rc;

use crate::ast::Expr;

pub type ReduceFn = Rc<dyn Fn(Vec<Value>) -> Value>;

/// A reduce function supplied by the grammar author, plus the arity it was
/// declared with (if any). A declared arity is checked against the operand
/// count of the sequence it is attached to when the grammar is lowered.
#[derive(Clone)]
pub struct Reducer {
  pub arity: Option<usize>,
  pub f: ReduceFn,
}

impl Reducer {
  pub fn new<F>(f: F) -> Reducer
    where F: Fn(Vec<Value>) -> Value + 'static
  {
    Reducer { arity: None, f: Rc::new(f) }
  }

  pub fn with_arity<F>(arity: usize, f: F) -> Reducer
    where F: Fn(Vec<Value>) -> Value + 'static
  {
    Reducer { arity: Some(arity), f: Rc::new(f) }
  }
}

impl PartialEq for Reducer {
  fn eq(&self, other: &Reducer) -> bool {
    self.arity == other.arity && Rc::ptr_eq(&self.f, &other.f)
  }
}

impl fmt::Debug for Reducer {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self.arity {
      Some(n) => write!(f, "Reducer({})", n),
      None => write!(f, "Reducer"),
    }
  }
}

/// A semantic value: everything an instance parse can produce, everything an
/// interpolation can splice into source text.
#[derive(Clone)]
pub enum Value {
  Null,
  Bool(bool),
  Num(f64),
  Str(String),
  List(Vec<Value>),
  Fn(Reducer),
  Grammar(Rc<Expr>),
}

impl Value {
  pub fn reducer<F>(f: F) -> Value
    where F: Fn(Vec<Value>) -> Value + 'static
  {
    Value::Fn(Reducer::new(f))
  }

  pub fn reducer_n<F>(arity: usize, f: F) -> Value
    where F: Fn(Vec<Value>) -> Value + 'static
  {
    Value::Fn(Reducer::with_arity(arity, f))
  }

  /// The string form used when a value is interpolated into a string literal.
  pub fn to_text(&self) -> String {
    match self {
      Value::Null => "null".to_owned(),
      Value::Bool(b) => b.to_string(),
      Value::Num(n) => {
        if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
          format!("{}", *n as i64)
        } else {
          n.to_string()
        }
      }
      Value::Str(s) => s.clone(),
      Value::List(items) => {
        items.iter().map(|v| v.to_text()).collect::<Vec<_>>().join(",")
      }
      Value::Fn(_) => "<function>".to_owned(),
      Value::Grammar(_) => "<grammar>".to_owned(),
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Num(a), Value::Num(b)) => a == b,
      (Value::Str(a), Value::Str(b)) => a == b,
      (Value::List(a), Value::List(b)) => a == b,
      (Value::Fn(a), Value::Fn(b)) => Rc::ptr_eq(&a.f, &b.f),
      (Value::Grammar(a), Value::Grammar(b)) => Rc::ptr_eq(a, b),
      _ => false,
    }
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Value::Null => write!(f, "Null"),
      Value::Bool(b) => write!(f, "Bool({})", b),
      Value::Num(n) => write!(f, "Num({})", n),
      Value::Str(s) => write!(f, "Str({:?})", s),
      Value::List(items) => f.debug_tuple("List").field(items).finish(),
      Value::Fn(r) => write!(f, "Fn({:?})", r),
      Value::Grammar(_) => write!(f, "Grammar(..)"),
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Value {
    Value::Str(s.to_owned())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Value {
    Value::Str(s)
  }
}

impl From<f64> for Value {
  fn from(n: f64) -> Value {
    Value::Num(n)
  }
}

impl From<i64> for Value {
  fn from(n: i64) -> Value {
    Value::Num(n as f64)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Value {
    Value::Bool(b)
  }
}

impl From<Vec<Value>> for Value {
  fn from(items: Vec<Value>) -> Value {
    Value::List(items)
  }
}

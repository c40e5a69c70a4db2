//! Grammar definitions written in their own notation, compiled on demand
//! to LL(1) parsers.
//!
//! ```
//! use llgram::{grammar, Value};
//!
//! let def = grammar(&["Main = \"return\" value;"], &[]).unwrap();
//! let out = def.parse(&["return 123"], &[]).unwrap();
//! assert_eq!(out, Value::Num(123.0));
//! ```

pub use grammar::{Expr, Reducer, Value};
pub use ll::{
  grammar, report, Error, GrammarDef, ParseError, ParseErrorKind, Parser,
};

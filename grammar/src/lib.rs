//! Grammar definition front end: tokenizing grammar notation, parsing it
//! into an expression tree, and lowering the tree into a flat rule table.

pub mod ast;
pub mod grammar_parser;
pub mod lex;
pub mod lower;
pub mod value;

use std::fmt;

pub use ast::{Expr, TerminalKind};
pub use lex::{
  LexError, LexErrorKind, Lexer, LexerConfig, Span, SpannedToken, Token,
};
pub use lower::{
  lower, Reduce, RuleId, RuleIdGen, RuleNode, RuleTable, TokenClass,
};
pub use value::{ReduceFn, Reducer, Value};

#[cfg(not(debug_assertions))]
pub type Map<K, V> = std::collections::HashMap<K, V>;

#[cfg(not(debug_assertions))]
pub type Set<T> = std::collections::HashSet<T>;

#[cfg(not(debug_assertions))]
pub type BiMap<L, R> = bimap::BiHashMap<L, R>;

#[cfg(debug_assertions)]
pub type Map<K, V> = indexmap::IndexMap<K, V>;

#[cfg(debug_assertions)]
pub type Set<T> = indexmap::IndexSet<T>;

#[cfg(debug_assertions)]
pub type BiMap<L, R> = bimap::BiBTreeMap<L, R>;

/// A defect in the grammar itself, reported while parsing or lowering the
/// notation.
#[derive(Clone, Debug, PartialEq)]
pub struct GrammarError {
  pub kind: GrammarErrorKind,
  pub message: String,
  pub span: Option<Span>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind {
  SyntaxError,
  UnknownIdent,
  InvalidLiteral,
  MalformedReducer,
  InvalidInclude,
}

impl GrammarError {
  pub fn new(kind: GrammarErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      span: None,
    }
  }

  pub fn with_span(
    kind: GrammarErrorKind,
    message: impl Into<String>,
    span: Span,
  ) -> Self {
    Self {
      kind,
      message: message.into(),
      span: Some(span),
    }
  }
}

impl fmt::Display for GrammarError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match &self.span {
      Some(span) => write!(f, "{} at {}", self.message, span),
      None => write!(f, "{}", self.message),
    }
  }
}

impl std::error::Error for GrammarError {}

/// Any failure while turning grammar notation into a rule table.
#[derive(Clone, Debug, PartialEq)]
pub enum BuildError {
  Lex(LexError),
  Grammar(GrammarError),
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      BuildError::Lex(err) => write!(f, "{}", err),
      BuildError::Grammar(err) => write!(f, "{}", err),
    }
  }
}

impl std::error::Error for BuildError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      BuildError::Lex(err) => Some(err),
      BuildError::Grammar(err) => Some(err),
    }
  }
}

impl From<LexError> for BuildError {
  fn from(err: LexError) -> Self {
    BuildError::Lex(err)
  }
}

impl From<GrammarError> for BuildError {
  fn from(err: GrammarError) -> Self {
    BuildError::Grammar(err)
  }
}

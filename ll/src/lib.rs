//! An LL(1) parser engine driven by grammars written in their own notation.
//!
//! A [`GrammarDef`] holds the parsed grammar tree; compiling it lowers the
//! tree to a rule table, removes direct left recursion, factors common
//! prefixes, and builds single-token dispatch tables. The compiled parser
//! is cached inside the definition and reused across parses.

pub mod compile;
pub mod first;
pub mod report;
pub mod resolve;
pub mod run;

use std::fmt;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use grammar::{
  grammar_parser, lower, BuildError, Expr, GrammarError, LexError, Value,
};

pub use crate::compile::Parser;
pub use crate::first::{FirstSet, FirstSets, Lookahead};
pub use crate::report::report;
pub use crate::run::{ParseError, ParseErrorKind};

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
  Lex(LexError),
  Grammar(GrammarError),
  LeftRecursion { rule: String },
  FirstFirstConflict { rule: String, lookahead: String },
  FirstFollowConflict { rule: String, lookahead: String },
  Parse(ParseError),
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Error::Lex(err) => write!(f, "{}", err),
      Error::Grammar(err) => write!(f, "{}", err),
      Error::LeftRecursion { rule } => {
        write!(f, "left recursion in rule `{}`", rule)
      }
      Error::FirstFirstConflict { rule, lookahead } => {
        write!(
          f,
          "ambiguous alternatives in rule `{}` on {}",
          rule, lookahead
        )
      }
      Error::FirstFollowConflict { rule, lookahead } => {
        write!(f, "nullable rule `{}` is ambiguous on {}", rule, lookahead)
      }
      Error::Parse(err) => write!(f, "{}", err),
    }
  }
}

impl std::error::Error for Error {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Error::Lex(err) => Some(err),
      Error::Grammar(err) => Some(err),
      Error::Parse(err) => Some(err),
      _ => None,
    }
  }
}

impl From<LexError> for Error {
  fn from(err: LexError) -> Self {
    Error::Lex(err)
  }
}

impl From<GrammarError> for Error {
  fn from(err: GrammarError) -> Self {
    Error::Grammar(err)
  }
}

impl From<BuildError> for Error {
  fn from(err: BuildError) -> Self {
    match err {
      BuildError::Lex(err) => Error::Lex(err),
      BuildError::Grammar(err) => Error::Grammar(err),
    }
  }
}

impl From<ParseError> for Error {
  fn from(err: ParseError) -> Self {
    Error::Parse(err)
  }
}

/// A grammar definition: the parsed tree plus a lazily built parser.
#[derive(Debug)]
pub struct GrammarDef {
  ast: Rc<Expr>,
  compiled: OnceCell<Parser>,
}

impl GrammarDef {
  pub fn new(
    fragments: &[&str],
    values: &[Value],
  ) -> Result<GrammarDef, Error> {
    let ast = grammar_parser::parse(fragments, values)?;
    Ok(GrammarDef::from_ast(ast))
  }

  pub fn from_ast(ast: Rc<Expr>) -> GrammarDef {
    GrammarDef {
      ast,
      compiled: OnceCell::new(),
    }
  }

  pub fn ast(&self) -> &Rc<Expr> {
    &self.ast
  }

  /// Compile on first use and cache the result. Compilation failures are
  /// reported each time until a compile succeeds.
  pub fn compile(&self) -> Result<&Parser, Error> {
    self.compiled.get_or_try_init(|| {
      let mut table = lower(&self.ast)?;
      resolve::fix_left_recursion(&mut table);
      resolve::factor_left(&mut table);
      let firsts = first::FirstSets::build(&table)?;
      compile::compile(table, &firsts)
    })
  }

  pub fn parse(
    &self,
    fragments: &[&str],
    values: &[Value],
  ) -> Result<Value, Error> {
    let parser = self.compile()?;
    run::run(parser, fragments, values)
  }
}

/// A definition can be spliced into another grammar as a value; the
/// receiving grammar embeds the tree, not the compiled parser.
impl From<&GrammarDef> for Value {
  fn from(def: &GrammarDef) -> Value {
    Value::Grammar(def.ast.clone())
  }
}

pub fn grammar(
  fragments: &[&str],
  values: &[Value],
) -> Result<GrammarDef, Error> {
  GrammarDef::new(fragments, values)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn compile_is_cached() {
    let def = GrammarDef::new(&["Main = value;"], &[]).unwrap();
    let first = def.compile().unwrap() as *const Parser;
    let second = def.compile().unwrap() as *const Parser;
    assert_eq!(first, second);
  }

  #[test]
  fn definition_becomes_a_grammar_value() {
    let def = GrammarDef::new(&["Main = value;"], &[]).unwrap();
    match Value::from(&def) {
      Value::Grammar(ast) => assert!(Rc::ptr_eq(&ast, def.ast())),
      other => panic!("expected grammar value, got {:?}", other),
    }
  }

  #[test]
  fn parse_after_failed_compile_reports_the_compile_error() {
    let def = GrammarDef::new(&["Main = Missing;"], &[]).unwrap();
    let err = def.parse(&["x"], &[]).unwrap_err();
    assert!(matches!(err, Error::Grammar(_)));
  }
}

use std::rc::Rc;

use crate::value::Reducer;
use crate::GrammarError;

/// The raw-token classes a grammar can match with a bare terminal keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminalKind {
  Ident,
  Value,
  Keyword,
  Operator,
}

/// One grammar expression. Shared subtrees are `Rc`ed; the tree is immutable
/// once built. `Error` is a deferred failure: the bootstrap parser records
/// bad input as ordinary tree data and lowering raises it.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
  Error(GrammarError),
  Nil,
  Literal(String),
  Terminal(TerminalKind),
  /// A rule reference, resolved against the enclosing ruleset scopes when
  /// the grammar is lowered.
  Ident(String),
  Structure {
    open: char,
    close: char,
    inner: Rc<Expr>,
  },
  Maybe(Rc<Expr>),
  Repeat0(Rc<Expr>),
  Repeat1(Rc<Expr>),
  SepBy0 {
    item: Rc<Expr>,
    sep: Rc<Expr>,
  },
  SepBy1 {
    item: Rc<Expr>,
    sep: Rc<Expr>,
  },
  Seq {
    exprs: Vec<Rc<Expr>>,
    action: Option<Reducer>,
  },
  Alt(Vec<Rc<Expr>>),
  /// A lexical scope. The first rule is the scope's entry point; names bound
  /// here shadow outer rulesets.
  Ruleset(Vec<(String, Rc<Expr>)>),
}

impl Expr {
  /// Whether a match of this expression leaves a value on the operand stack.
  /// Only `nil` matches without producing anything.
  pub fn produces(&self) -> bool {
    !matches!(self, Expr::Nil)
  }
}

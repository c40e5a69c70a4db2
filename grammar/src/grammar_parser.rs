//! Bootstrap parser for the grammar notation itself.
//!
//! The notation is small and fixed, so this is a plain recursive-descent walk
//! over the token stream; it only ever runs on grammar definitions, never on
//! instance input.

use std::rc::Rc;

use crate::ast::{Expr, TerminalKind};
use crate::lex::{
  is_identifier_text, is_operator_text, Lexer, LexerConfig, Span,
  SpannedToken, Token,
};
use crate::value::Value;
use crate::{BuildError, GrammarError, GrammarErrorKind};

/// Lexer parameters for the notation: its reserved words and operators.
pub fn core_config() -> LexerConfig {
  LexerConfig {
    keywords: ["identifier", "value", "operator", "keyword", "nil", "include"]
      .iter()
      .map(|s| s.to_string())
      .collect(),
    operators: ["=", ";", "|", ":", "**", "++", "*", "+", "?", "#"]
      .iter()
      .map(|s| s.to_string())
      .collect(),
    lines: false,
  }
}

/// Lex and parse a grammar definition.
pub fn parse(
  fragments: &[&str],
  values: &[Value],
) -> Result<Rc<Expr>, BuildError> {
  let tokens = Lexer::new(&core_config()).tokenize(fragments, values)?;
  parse_tokens(&tokens).map_err(BuildError::Grammar)
}

/// Parse an already-lexed grammar definition.
pub fn parse_tokens(tokens: &[SpannedToken]) -> Result<Rc<Expr>, GrammarError> {
  P::new(tokens).grammar()
}

struct P<'a> {
  tokens: &'a [SpannedToken],
  pos: usize,
  last_span: Span,
}

impl<'a> P<'a> {
  fn new(tokens: &'a [SpannedToken]) -> P<'a> {
    P {
      tokens,
      pos: 0,
      last_span: Span { fragment: 0, start: 0, end: 0 },
    }
  }

  fn peek(&self) -> Option<&'a SpannedToken> {
    self.tokens.get(self.pos)
  }

  fn peek_token(&self, n: usize) -> Option<&'a Token> {
    self.tokens.get(self.pos + n).map(|st| &st.token)
  }

  fn bump(&mut self) -> Option<&'a SpannedToken> {
    let st = self.tokens.get(self.pos)?;
    self.pos += 1;
    self.last_span = st.span;
    Some(st)
  }

  fn at_op(&self, text: &str) -> bool {
    matches!(self.peek_token(0), Some(Token::Operator(op)) if op == text)
  }

  fn eat_op(&mut self, text: &str) -> bool {
    if self.at_op(text) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn at_end(&self) -> bool {
    self.pos >= self.tokens.len()
  }

  fn err(&self, message: &str) -> GrammarError {
    let span = self.peek().map(|st| st.span).unwrap_or(self.last_span);
    GrammarError::with_span(GrammarErrorKind::SyntaxError, message, span)
  }

  fn err_at(&self, st: &SpannedToken, message: &str) -> GrammarError {
    GrammarError::with_span(GrammarErrorKind::SyntaxError, message, st.span)
  }

  fn expect_end(&self) -> Result<(), GrammarError> {
    match self.peek() {
      Some(st) => Err(self.err_at(st, "unexpected token")),
      None => Ok(()),
    }
  }

  /// `Grammar = Rule ++ ";" | AltExpr`, with a trailing `;` tolerated.
  fn grammar(&mut self) -> Result<Rc<Expr>, GrammarError> {
    let rule_start = matches!(
      (self.peek_token(0), self.peek_token(1)),
      (Some(Token::Ident(_)), Some(Token::Operator(op))) if op == "="
    );

    if !rule_start {
      let expr = self.alt_expr()?;
      self.expect_end()?;
      return Ok(expr);
    }

    let mut rules = vec![];
    loop {
      let name = match self.bump() {
        Some(st) => match &st.token {
          Token::Ident(name) => name.clone(),
          _ => return Err(self.err_at(st, "expected rule name")),
        },
        None => return Err(self.err("expected rule name")),
      };
      if !self.eat_op("=") {
        return Err(self.err("expected `=` after rule name"));
      }
      rules.push((name, self.alt_expr()?));

      if !self.eat_op(";") {
        break;
      }
      if self.at_end() {
        break;
      }
    }
    self.expect_end()?;
    Ok(Rc::new(Expr::Ruleset(rules)))
  }

  /// `AltExpr = SeqExpr ("|" SeqExpr)*`
  fn alt_expr(&mut self) -> Result<Rc<Expr>, GrammarError> {
    let mut branches = vec![self.seq_expr()?];
    while self.eat_op("|") {
      branches.push(self.seq_expr()?);
    }
    if branches.len() == 1 {
      Ok(branches.pop().unwrap())
    } else {
      Ok(Rc::new(Expr::Alt(branches)))
    }
  }

  /// `SeqExpr = SepExpr+ (":" value)?`
  fn seq_expr(&mut self) -> Result<Rc<Expr>, GrammarError> {
    let mut exprs = vec![self.sep_expr()?];
    while self.starts_base() {
      exprs.push(self.sep_expr()?);
    }

    let action = if self.eat_op(":") {
      let st = match self.bump() {
        Some(st) => st,
        None => return Err(self.err("expected reducer after `:`")),
      };
      match &st.token {
        Token::Value(Value::Fn(r)) => Some(r.clone()),
        Token::Value(_) => {
          // not a callable: record the failure in the tree and move on
          return Ok(Rc::new(Expr::Error(GrammarError::with_span(
            GrammarErrorKind::MalformedReducer,
            "seq needs a function",
            st.span,
          ))));
        }
        _ => return Err(self.err_at(st, "expected reducer value after `:`")),
      }
    } else {
      None
    };

    if action.is_none() && exprs.len() == 1 {
      return Ok(exprs.pop().unwrap());
    }
    Ok(Rc::new(Expr::Seq { exprs, action }))
  }

  /// `SepExpr = RepExpr (("**" | "++") RepExpr)?`
  fn sep_expr(&mut self) -> Result<Rc<Expr>, GrammarError> {
    let item = self.rep_expr()?;
    if self.eat_op("**") {
      let sep = self.rep_expr()?;
      Ok(Rc::new(Expr::SepBy0 { item, sep }))
    } else if self.eat_op("++") {
      let sep = self.rep_expr()?;
      Ok(Rc::new(Expr::SepBy1 { item, sep }))
    } else {
      Ok(item)
    }
  }

  /// `RepExpr = BaseExpr ("*" | "+" | "?")?`
  fn rep_expr(&mut self) -> Result<Rc<Expr>, GrammarError> {
    let base = self.base_expr()?;
    if self.eat_op("*") {
      Ok(Rc::new(Expr::Repeat0(base)))
    } else if self.eat_op("+") {
      Ok(Rc::new(Expr::Repeat1(base)))
    } else if self.eat_op("?") {
      Ok(Rc::new(Expr::Maybe(base)))
    } else {
      Ok(base)
    }
  }

  fn starts_base(&self) -> bool {
    match self.peek_token(0) {
      Some(Token::Ident(_)) | Some(Token::Value(_)) | Some(Token::Literal(_)) => {
        true
      }
      Some(Token::Structure { open: '(', .. }) => true,
      Some(Token::Operator(op)) => op == "#",
      _ => false,
    }
  }

  fn base_expr(&mut self) -> Result<Rc<Expr>, GrammarError> {
    let st = match self.bump() {
      Some(st) => st,
      None => return Err(self.err("expected expression")),
    };

    match &st.token {
      // parenthesized group; `()` is epsilon
      Token::Structure { open: '(', tokens, .. } => sub_alt(tokens),
      Token::Structure { .. } => {
        Err(self.err_at(st, "bracket group needs a preceding `#`"))
      }
      Token::Operator(op) if op == "#" => {
        let st2 = match self.bump() {
          Some(st2) => st2,
          None => return Err(self.err("expected bracket group after `#`")),
        };
        match &st2.token {
          Token::Structure { open, close, tokens } => {
            let inner = sub_alt(tokens)?;
            Ok(Rc::new(Expr::Structure { open: *open, close: *close, inner }))
          }
          _ => Err(self.err_at(st2, "expected bracket group after `#`")),
        }
      }
      Token::Literal(kw) => match kw.as_str() {
        "identifier" => Ok(Rc::new(Expr::Terminal(TerminalKind::Ident))),
        "value" => Ok(Rc::new(Expr::Terminal(TerminalKind::Value))),
        "operator" => Ok(Rc::new(Expr::Terminal(TerminalKind::Operator))),
        "keyword" => Ok(Rc::new(Expr::Terminal(TerminalKind::Keyword))),
        "nil" => Ok(Rc::new(Expr::Nil)),
        "include" => {
          let st2 = match self.bump() {
            Some(st2) => st2,
            None => return Err(self.err("expected value after `include`")),
          };
          match &st2.token {
            Token::Value(Value::Grammar(ast)) => Ok(ast.clone()),
            Token::Value(_) => Ok(Rc::new(Expr::Error(GrammarError::with_span(
              GrammarErrorKind::InvalidInclude,
              "invalid include target",
              st2.span,
            )))),
            _ => Err(self.err_at(st2, "expected value after `include`")),
          }
        }
        _ => Err(self.err_at(st, "unexpected keyword")),
      },
      Token::Ident(name) => Ok(Rc::new(Expr::Ident(name.clone()))),
      Token::Value(Value::Str(s)) => {
        if is_identifier_text(s) || is_operator_text(s) {
          Ok(Rc::new(Expr::Literal(s.clone())))
        } else {
          Ok(Rc::new(Expr::Error(GrammarError::with_span(
            GrammarErrorKind::InvalidLiteral,
            format!("invalid literal {:?}", s),
            st.span,
          ))))
        }
      }
      Token::Value(_) => Ok(Rc::new(Expr::Error(GrammarError::with_span(
        GrammarErrorKind::InvalidLiteral,
        "literal must be quoted text",
        st.span,
      )))),
      _ => Err(self.err_at(st, "expected expression")),
    }
  }
}

/// Parse the contents of a bracket group as a full alternation.
fn sub_alt(tokens: &[SpannedToken]) -> Result<Rc<Expr>, GrammarError> {
  if tokens.is_empty() {
    return Ok(Rc::new(Expr::Nil));
  }
  let mut p = P::new(tokens);
  let expr = p.alt_expr()?;
  p.expect_end()?;
  Ok(expr)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn parse_str(src: &str) -> Rc<Expr> {
    parse(&[src], &[]).unwrap()
  }

  #[test]
  fn bare_expression() {
    assert_eq!(parse_str("value"), Rc::new(Expr::Terminal(TerminalKind::Value)));
  }

  #[test]
  fn rules_with_trailing_semicolon() {
    let ast = parse_str("A = value; B = A;");
    match &*ast {
      Expr::Ruleset(rules) => {
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].0, "A");
        assert_eq!(rules[1].1, Rc::new(Expr::Ident("A".to_owned())));
      }
      other => panic!("expected ruleset, got {:?}", other),
    }
  }

  #[test]
  fn precedence_shape() {
    // alternation binds loosest, postfix repetition tightest
    let ast = parse_str("\"a\" \"b\"* | nil");
    match &*ast {
      Expr::Alt(branches) => {
        assert_eq!(branches.len(), 2);
        match &*branches[0] {
          Expr::Seq { exprs, action } => {
            assert!(action.is_none());
            assert_eq!(exprs.len(), 2);
            assert_eq!(exprs[0], Rc::new(Expr::Literal("a".to_owned())));
            assert!(matches!(&*exprs[1], Expr::Repeat0(_)));
          }
          other => panic!("expected seq, got {:?}", other),
        }
        assert_eq!(branches[1], Rc::new(Expr::Nil));
      }
      other => panic!("expected alt, got {:?}", other),
    }
  }

  #[test]
  fn separated_lists() {
    assert!(matches!(&*parse_str("identifier ++ \",\""), Expr::SepBy1 { .. }));
    assert!(matches!(&*parse_str("identifier ** \",\""), Expr::SepBy0 { .. }));
  }

  #[test]
  fn structure_wrappers() {
    let ast = parse_str("#[ value* ]");
    match &*ast {
      Expr::Structure { open: '[', close: ']', inner } => {
        assert!(matches!(&**inner, Expr::Repeat0(_)));
      }
      other => panic!("expected structure, got {:?}", other),
    }
  }

  #[test]
  fn empty_group_is_nil() {
    assert_eq!(parse_str("()"), Rc::new(Expr::Nil));
  }

  #[test]
  fn bracket_literal_is_error_node() {
    let ast = parse_str("\"(\"");
    match &*ast {
      Expr::Error(err) => assert_eq!(err.kind, GrammarErrorKind::InvalidLiteral),
      other => panic!("expected error node, got {:?}", other),
    }
  }

  #[test]
  fn non_function_reducer_is_error_node() {
    let ast = parse(&["value value : ", ""], &[Value::Num(1.0)]).unwrap();
    match &*ast {
      Expr::Error(err) => {
        assert_eq!(err.kind, GrammarErrorKind::MalformedReducer);
        assert_eq!(err.message, "seq needs a function");
      }
      other => panic!("expected error node, got {:?}", other),
    }
  }

  #[test]
  fn include_splices_ast() {
    let inner = parse_str("value*");
    let ast = parse(
      &["\"go\" include ", ""],
      &[Value::Grammar(inner.clone())],
    )
    .unwrap();
    match &*ast {
      Expr::Seq { exprs, .. } => {
        assert!(Rc::ptr_eq(&exprs[1], &inner));
      }
      other => panic!("expected seq, got {:?}", other),
    }
  }

  #[test]
  fn include_of_non_grammar_is_error_node() {
    let ast = parse(&["include ", ""], &[Value::Num(3.0)]).unwrap();
    match &*ast {
      Expr::Error(err) => assert_eq!(err.kind, GrammarErrorKind::InvalidInclude),
      other => panic!("expected error node, got {:?}", other),
    }
  }

  #[test]
  fn syntax_error_has_span() {
    let err = parse(&["A = | x"], &[]).unwrap_err();
    match err {
      BuildError::Grammar(err) => {
        assert_eq!(err.kind, GrammarErrorKind::SyntaxError);
        assert!(err.span.is_some());
      }
      other => panic!("expected grammar error, got {:?}", other),
    }
  }
}

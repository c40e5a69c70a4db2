//! Execute a compiled parser over tokenized input.

use std::fmt;

use itertools::Itertools;

use grammar::{
  Lexer, RuleId, RuleNode, Span, SpannedToken, Token, TokenClass, Value,
};

use crate::compile::{Dispatch, Parser};
use crate::first::Lookahead;
use crate::Error;

#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
  pub kind: ParseErrorKind,
  pub span: Option<Span>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParseErrorKind {
  Mismatch { expected: String, found: String },
  NoAlt { rule: String, found: String },
  UnexpectedEof { expected: String },
  TrailingTokens { found: String },
}

impl fmt::Display for ParseErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      ParseErrorKind::Mismatch { expected, found } => {
        write!(f, "expected {}, found {}", expected, found)
      }
      ParseErrorKind::NoAlt { rule, found } => {
        write!(f, "no alternative of {} matches {}", rule, found)
      }
      ParseErrorKind::UnexpectedEof { expected } => {
        write!(f, "unexpected end of input, expected {}", expected)
      }
      ParseErrorKind::TrailingTokens { found } => {
        write!(f, "input continues after a complete parse, at {}", found)
      }
    }
  }
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.kind)?;
    if let Some(span) = &self.span {
      write!(f, " ({})", span)?;
    }
    Ok(())
  }
}

impl std::error::Error for ParseError {}

pub fn run(
  parser: &Parser,
  fragments: &[&str],
  values: &[Value],
) -> Result<Value, Error> {
  let lexer = Lexer::new(&parser.config);
  let tokens = flatten(lexer.tokenize(fragments, values)?);

  let mut state = State {
    tokens: &tokens,
    pos: 0,
    stack: vec![],
  };
  exec_rule(parser, parser.start, &mut state).map_err(Error::Parse)?;

  if state.pos < state.tokens.len() {
    let st = &state.tokens[state.pos];
    return Err(Error::Parse(ParseError {
      kind: ParseErrorKind::TrailingTokens {
        found: describe(&st.token),
      },
      span: Some(st.span),
    }));
  }

  Ok(state.stack.pop().unwrap_or(Value::Null))
}

/// Bracket groups come out of the lexer as nested structure tokens; the
/// parser dispatches on flat bracket operators instead.
fn flatten(tokens: Vec<SpannedToken>) -> Vec<SpannedToken> {
  let mut out = vec![];
  for st in tokens {
    flatten_into(st, &mut out);
  }
  out
}

fn flatten_into(st: SpannedToken, out: &mut Vec<SpannedToken>) {
  match st.token {
    Token::Structure { open, close, tokens } => {
      out.push(SpannedToken {
        token: Token::Operator(open.to_string()),
        span: st.span,
      });
      for inner in tokens {
        flatten_into(inner, out);
      }
      out.push(SpannedToken {
        token: Token::Operator(close.to_string()),
        span: st.span,
      });
    }
    _ => out.push(st),
  }
}

struct State<'a> {
  tokens: &'a [SpannedToken],
  pos: usize,
  /// operand stack, shared across rule invocations
  stack: Vec<Value>,
}

impl<'a> State<'a> {
  fn peek(&self) -> Option<&'a SpannedToken> {
    self.tokens.get(self.pos)
  }
}

fn lookahead_of(token: &Token) -> Lookahead {
  match token {
    Token::Ident(_) => Lookahead::Term(TokenClass::Ident),
    Token::Value(_) => Lookahead::Term(TokenClass::Value),
    Token::Literal(text) => Lookahead::Lit(text.clone()),
    Token::Operator(text) => Lookahead::Lit(text.clone()),
    Token::Line => Lookahead::Lit("\n".to_owned()),
    Token::Structure { open, .. } => Lookahead::Lit(open.to_string()),
  }
}

fn describe(token: &Token) -> String {
  match token {
    Token::Ident(name) => format!("identifier `{}`", name),
    Token::Value(_) => "value".to_owned(),
    Token::Literal(text) => format!("`{}`", text),
    Token::Operator(text) => format!("`{}`", text),
    Token::Line => "line break".to_owned(),
    Token::Structure { open, .. } => format!("`{}`", open),
  }
}

fn expected_of(dispatch: &Dispatch) -> String {
  let mut keys: Vec<String> =
    dispatch.table.keys().map(|la| la.to_string()).collect();
  keys.sort();
  keys.iter().join(", ")
}

fn mismatch(expected: String, found: &Token, span: Span) -> ParseError {
  ParseError {
    kind: ParseErrorKind::Mismatch {
      expected,
      found: describe(found),
    },
    span: Some(span),
  }
}

fn exec_rule(
  parser: &Parser,
  id: RuleId,
  state: &mut State,
) -> Result<(), ParseError> {
  let dispatch = &parser.rules[&id];

  let branch = match state.peek() {
    Some(st) => match dispatch.table.get(&lookahead_of(&st.token)) {
      Some(&i) => i,
      None => match dispatch.fallback {
        Some(i) => i,
        None => {
          return Err(ParseError {
            kind: ParseErrorKind::NoAlt {
              rule: parser.name(id).to_owned(),
              found: describe(&st.token),
            },
            span: Some(st.span),
          })
        }
      },
    },
    None => match dispatch.fallback {
      Some(i) => i,
      None => {
        return Err(ParseError {
          kind: ParseErrorKind::UnexpectedEof {
            expected: expected_of(dispatch),
          },
          span: None,
        })
      }
    },
  };

  for node in &dispatch.branches[branch] {
    match node {
      RuleNode::Literal(text) => match state.peek() {
        Some(st) => match &st.token {
          Token::Literal(t) | Token::Operator(t) if t == text => {
            state.pos += 1;
            state.stack.push(Value::Str(text.clone()));
          }
          other => {
            return Err(mismatch(format!("`{}`", text), other, st.span))
          }
        },
        None => {
          return Err(ParseError {
            kind: ParseErrorKind::UnexpectedEof {
              expected: format!("`{}`", text),
            },
            span: None,
          })
        }
      },

      RuleNode::Terminal(TokenClass::Ident) => match state.peek() {
        Some(st) => match &st.token {
          Token::Ident(name) => {
            state.pos += 1;
            state.stack.push(Value::Str(name.clone()));
          }
          other => {
            return Err(mismatch("identifier".to_owned(), other, st.span))
          }
        },
        None => {
          return Err(ParseError {
            kind: ParseErrorKind::UnexpectedEof {
              expected: "identifier".to_owned(),
            },
            span: None,
          })
        }
      },

      RuleNode::Terminal(TokenClass::Value) => match state.peek() {
        Some(st) => match &st.token {
          Token::Value(v) => {
            state.pos += 1;
            state.stack.push(v.clone());
          }
          other => return Err(mismatch("value".to_owned(), other, st.span)),
        },
        None => {
          return Err(ParseError {
            kind: ParseErrorKind::UnexpectedEof {
              expected: "value".to_owned(),
            },
            span: None,
          })
        }
      },

      RuleNode::Rule(r) => exec_rule(parser, *r, state)?,

      RuleNode::Reduce(red) => {
        let n = red.arity.min(state.stack.len());
        let mut args = state.stack.split_off(state.stack.len() - n);
        while args.len() < red.arity {
          args.insert(0, Value::Null);
        }
        state.stack.push((red.f)(args));
      }
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compile::compile;
  use crate::first::FirstSets;
  use crate::resolve;
  use grammar::{grammar_parser, lower};
  use pretty_assertions::assert_eq;

  fn parser_of(src: &str) -> Parser {
    let mut table =
      lower(&grammar_parser::parse(&[src], &[]).unwrap()).unwrap();
    resolve::fix_left_recursion(&mut table);
    resolve::factor_left(&mut table);
    let firsts = FirstSets::build(&table).unwrap();
    compile(table, &firsts).unwrap()
  }

  #[test]
  fn keyword_then_value() {
    let parser = parser_of("Main = \"return\" value;");
    let out = run(&parser, &["return 123"], &[]).unwrap();
    assert_eq!(out, Value::Num(123.0));
  }

  #[test]
  fn interpolated_value_token() {
    let parser = parser_of("Main = \"return\" value;");
    let out =
      run(&parser, &["return ", ""], &[Value::Str("ok".to_owned())])
        .unwrap();
    assert_eq!(out, Value::Str("ok".to_owned()));
  }

  #[test]
  fn literal_refuses_value_token() {
    let parser = parser_of("Main = \"return\" \"now\";");
    let err = run(&parser, &["return ", ""], &[Value::Num(1.0)]).unwrap_err();
    match err {
      Error::Parse(err) => {
        assert!(matches!(err.kind, ParseErrorKind::Mismatch { .. }));
      }
      other => panic!("expected parse error, got {:?}", other),
    }
  }

  #[test]
  fn trailing_input_rejected() {
    let parser = parser_of("Main = value;");
    let err = run(&parser, &["1 2"], &[]).unwrap_err();
    match err {
      Error::Parse(err) => {
        assert!(matches!(err.kind, ParseErrorKind::TrailingTokens { .. }));
        assert_eq!(
          err.to_string(),
          "input continues after a complete parse, at value (fragment 0, 2..3)"
        );
      }
      other => panic!("expected parse error, got {:?}", other),
    }
  }

  #[test]
  fn empty_input_on_nullable_grammar() {
    let parser = parser_of("Main = value*;");
    let out = run(&parser, &[""], &[]).unwrap();
    assert_eq!(out, Value::List(vec![]));
  }

  #[test]
  fn brackets_flatten_to_operators() {
    let parser = parser_of("Main = #( value );");
    let out = run(&parser, &["(7)"], &[]).unwrap();
    assert_eq!(out, Value::Num(7.0));
  }

  #[test]
  fn repetition_collects_left_to_right() {
    let parser = parser_of("Main = identifier*;");
    let out = run(&parser, &["a b c"], &[]).unwrap();
    assert_eq!(
      out,
      Value::List(vec![
        Value::Str("a".to_owned()),
        Value::Str("b".to_owned()),
        Value::Str("c".to_owned()),
      ])
    );
  }

  #[test]
  fn unexpected_eof_names_the_expected_token() {
    let parser = parser_of("Main = \"return\" value;");
    let err = run(&parser, &["return"], &[]).unwrap_err();
    match err {
      Error::Parse(err) => {
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedEof { .. }));
      }
      other => panic!("expected parse error, got {:?}", other),
    }
  }
}

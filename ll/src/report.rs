//! Human-readable rendering of grammar and parse failures.

use std::fmt::Write;

use grammar::Span;

use crate::Error;

/// Render an error against the source fragments it came from. Spanned
/// errors get a line and column; compile-time conflicts get a hint.
pub fn report(fragments: &[&str], err: &Error) -> String {
  match err {
    Error::Lex(err) => spanned(fragments, err.message(), Some(err.span)),
    Error::Grammar(err) => spanned(fragments, &err.message, err.span),
    Error::Parse(err) => {
      spanned(fragments, &err.kind.to_string(), err.span)
    }
    Error::LeftRecursion { rule } => {
      let mut buf = String::new();
      writeln!(&mut buf, "left recursion in rule `{}`", rule).unwrap();
      writeln!(
        &mut buf,
        "rewrite the rule to consume a token before referring to itself"
      )
      .unwrap();
      buf
    }
    Error::FirstFirstConflict { rule, lookahead } => {
      let mut buf = String::new();
      writeln!(&mut buf, "ambiguous alternatives in rule `{}`", rule)
        .unwrap();
      writeln!(
        &mut buf,
        "more than one alternative can start with {}",
        lookahead
      )
      .unwrap();
      buf
    }
    Error::FirstFollowConflict { rule, lookahead } => {
      let mut buf = String::new();
      writeln!(&mut buf, "ambiguous repetition of rule `{}`", rule).unwrap();
      writeln!(
        &mut buf,
        "the rule may match nothing, but {} can both start it and follow it",
        lookahead
      )
      .unwrap();
      buf
    }
  }
}

fn spanned(fragments: &[&str], message: &str, span: Option<Span>) -> String {
  let mut buf = String::new();
  if let Some(span) = span {
    if let Some((line, col)) = line_col(fragments, span) {
      writeln!(
        &mut buf,
        "error at fragment {}, line {}, column {}",
        span.fragment, line, col
      )
      .unwrap();
    }
  }
  writeln!(&mut buf, "message: {}", message).unwrap();
  buf
}

fn line_col(fragments: &[&str], span: Span) -> Option<(usize, usize)> {
  let text = fragments.get(span.fragment)?;
  let upto = text.get(..span.start)?;
  let lines: Vec<&str> = upto.split('\n').collect();
  let line = lines.len();
  let col = lines.last().map(|l| l.chars().count()).unwrap_or(0) + 1;
  Some((line, col))
}

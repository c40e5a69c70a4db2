use unicode_ident::{is_xid_continue, is_xid_start};

use crate::value::Value;
use crate::Set;

/// Byte range within one source fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
  pub fragment: usize,
  pub start: usize,
  pub end: usize,
}

impl std::fmt::Display for Span {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "fragment {}, {}..{}", self.fragment, self.start, self.end)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
  Ident(String),
  /// A literal or interpolated scalar: quoted string, number, or a value
  /// spliced in between fragments.
  Value(Value),
  /// An identifier that is a declared keyword of the target grammar.
  Literal(String),
  Operator(String),
  /// A bracket-delimited region, lexed as a nested group.
  Structure {
    open: char,
    close: char,
    tokens: Vec<SpannedToken>,
  },
  /// Logical line break, emitted only when the config asks for it.
  Line,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpannedToken {
  pub token: Token,
  pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LexErrorKind {
  NoTokenMatch,
  StringNewline,
  StringIncomplete,
  UnbalancedBracket,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexError {
  pub kind: LexErrorKind,
  pub span: Span,
}

impl LexError {
  pub fn message(&self) -> &'static str {
    match self.kind {
      LexErrorKind::NoTokenMatch => "unrecognized character",
      LexErrorKind::StringNewline => "newline in string literal",
      LexErrorKind::StringIncomplete => "unterminated string literal",
      LexErrorKind::UnbalancedBracket => "unbalanced bracket",
    }
  }
}

impl std::fmt::Display for LexError {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "{} at {}", self.message(), self.span)
  }
}

impl std::error::Error for LexError {}

/// Per-grammar lexer parameters: which identifier spellings are reserved
/// words, which operator spellings exist at all, and whether line breaks
/// are significant.
#[derive(Clone, Debug, Default)]
pub struct LexerConfig {
  pub keywords: Set<String>,
  pub operators: Set<String>,
  pub lines: bool,
}

pub struct Lexer {
  keywords: Set<String>,
  /// Sorted longest first so multi-character operators win.
  operators: Vec<String>,
  lines: bool,
}

fn close_of(open: char) -> char {
  match open {
    '(' => ')',
    '[' => ']',
    '{' => '}',
    _ => open,
  }
}

fn is_ident_start(c: char) -> bool {
  is_xid_start(c) || c == '$' || c == '_'
}

fn is_ident_continue(c: char) -> bool {
  is_xid_continue(c) || c == '$' || c == '_'
}

/// Whether `s` is lexically a single identifier token.
pub fn is_identifier_text(s: &str) -> bool {
  let mut chars = s.chars();
  match chars.next() {
    Some(c) if is_ident_start(c) => chars.all(is_ident_continue),
    _ => false,
  }
}

/// Whether `s` could be declared as an operator: a nonempty run of
/// punctuation the lexer would never claim for another token class.
pub fn is_operator_text(s: &str) -> bool {
  !s.is_empty()
    && s.chars().all(|c| {
      !c.is_alphanumeric()
        && !c.is_whitespace()
        && !is_ident_start(c)
        && !"()[]{}\"'`".contains(c)
    })
}

enum Mode {
  Normal,
  LineComment,
  BlockComment,
  Str { quote: char, buf: String, span: Span },
}

impl Lexer {
  pub fn new(config: &LexerConfig) -> Lexer {
    let mut operators: Vec<String> = config.operators.iter().cloned().collect();
    operators.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    Lexer {
      keywords: config.keywords.clone(),
      operators,
      lines: config.lines,
    }
  }

  /// Tokenize interleaved source fragments and already-evaluated values.
  /// `values` slots in between consecutive fragments, so
  /// `values.len() == fragments.len() - 1` for well-formed input.
  pub fn tokenize(
    &self,
    fragments: &[&str],
    values: &[Value],
  ) -> Result<Vec<SpannedToken>, LexError> {
    let mut sinks: Vec<Vec<SpannedToken>> = vec![vec![]];
    let mut groups: Vec<(char, Span)> = vec![];
    let mut mode = Mode::Normal;

    for (fi, fragment) in fragments.iter().enumerate() {
      self.scan_fragment(fi, fragment, &mut mode, &mut sinks, &mut groups)?;

      // splice the interpolated value that follows this fragment
      if fi + 1 < fragments.len() {
        let value = values.get(fi).cloned().unwrap_or(Value::Null);
        let here = Span {
          fragment: fi,
          start: fragment.len(),
          end: fragment.len(),
        };
        match &mut mode {
          Mode::Normal => {
            sinks.last_mut().unwrap().push(SpannedToken {
              token: Token::Value(value),
              span: here,
            });
          }
          // a value interpolated mid-comment is silently dropped
          Mode::LineComment | Mode::BlockComment => {}
          Mode::Str { buf, .. } => buf.push_str(&value.to_text()),
        }
      }
    }

    if let Mode::Str { span, .. } = mode {
      return Err(LexError { kind: LexErrorKind::StringIncomplete, span });
    }
    if let Some(&(_, span)) = groups.last() {
      return Err(LexError { kind: LexErrorKind::UnbalancedBracket, span });
    }

    Ok(sinks.pop().unwrap())
  }

  fn scan_fragment(
    &self,
    fi: usize,
    text: &str,
    mode: &mut Mode,
    sinks: &mut Vec<Vec<SpannedToken>>,
    groups: &mut Vec<(char, Span)>,
  ) -> Result<(), LexError> {
    let mut pos = 0usize;

    while pos < text.len() {
      match mode {
        Mode::LineComment => match text[pos..].find('\n') {
          Some(i) => {
            pos += i;
            *mode = Mode::Normal;
          }
          None => pos = text.len(),
        },
        Mode::BlockComment => match text[pos..].find("*/") {
          Some(i) => {
            pos += i + 2;
            *mode = Mode::Normal;
          }
          None => pos = text.len(),
        },
        Mode::Str { quote, buf, span } => {
          let quote = *quote;
          let start_span = *span;
          let mut chars = text[pos..].char_indices();
          loop {
            let (i, c) = match chars.next() {
              Some(x) => x,
              None => {
                pos = text.len();
                break;
              }
            };
            if c == quote {
              let token = Token::Value(Value::Str(std::mem::take(buf)));
              let span = Span { end: pos + i + 1, ..start_span };
              pos += i + 1;
              *mode = Mode::Normal;
              sinks.last_mut().unwrap().push(SpannedToken { token, span });
              break;
            }
            match c {
              '\n' => {
                return Err(LexError {
                  kind: LexErrorKind::StringNewline,
                  span: Span { fragment: fi, start: pos + i, end: pos + i + 1 },
                });
              }
              '\\' => match chars.next() {
                Some((_, 'n')) => buf.push('\n'),
                Some((_, 'r')) => buf.push('\r'),
                Some((_, 't')) => buf.push('\t'),
                Some((_, '0')) => buf.push('\0'),
                Some((_, 'x')) => {
                  let hex: String =
                    chars.by_ref().take(2).map(|(_, c)| c).collect();
                  match u8::from_str_radix(&hex, 16) {
                    Ok(b) => buf.push(b as char),
                    Err(_) => {
                      buf.push('x');
                      buf.push_str(&hex);
                    }
                  }
                }
                Some((_, e)) => buf.push(e),
                // backslash at a fragment boundary stays literal
                None => {
                  buf.push('\\');
                  pos = text.len();
                  break;
                }
              },
              _ => buf.push(c),
            }
          }
        }
        Mode::Normal => {
          let rest = &text[pos..];
          let c = rest.chars().next().unwrap();

          if c == ' ' || c == '\t' || c == '\r' {
            pos += 1;
          } else if c == '\n' {
            if self.lines {
              let sink = sinks.last_mut().unwrap();
              let collapse = matches!(
                sink.last(),
                Some(SpannedToken { token: Token::Line, .. })
              );
              if !collapse && !sink.is_empty() {
                sink.push(SpannedToken {
                  token: Token::Line,
                  span: Span { fragment: fi, start: pos, end: pos + 1 },
                });
              }
            }
            pos += 1;
          } else if rest.starts_with("//") {
            *mode = Mode::LineComment;
            pos += 2;
          } else if rest.starts_with("/*") {
            *mode = Mode::BlockComment;
            pos += 2;
          } else if c == '"' || c == '\'' {
            *mode = Mode::Str {
              quote: c,
              buf: String::new(),
              span: Span { fragment: fi, start: pos, end: pos },
            };
            pos += 1;
          } else if c == '(' || c == '[' || c == '{' {
            groups.push((c, Span { fragment: fi, start: pos, end: pos + 1 }));
            sinks.push(vec![]);
            pos += 1;
          } else if c == ')' || c == ']' || c == '}' {
            let here = Span { fragment: fi, start: pos, end: pos + 1 };
            match groups.pop() {
              Some((open, ospan)) if close_of(open) == c => {
                let tokens = sinks.pop().unwrap();
                let span = if ospan.fragment == fi {
                  Span { end: pos + 1, ..ospan }
                } else {
                  ospan
                };
                sinks.last_mut().unwrap().push(SpannedToken {
                  token: Token::Structure { open, close: c, tokens },
                  span,
                });
              }
              _ => {
                return Err(LexError {
                  kind: LexErrorKind::UnbalancedBracket,
                  span: here,
                });
              }
            }
            pos += 1;
          } else if c.is_ascii_digit() {
            let (value, len) = scan_number(rest).ok_or(LexError {
              kind: LexErrorKind::NoTokenMatch,
              span: Span { fragment: fi, start: pos, end: pos + 1 },
            })?;
            sinks.last_mut().unwrap().push(SpannedToken {
              token: Token::Value(Value::Num(value)),
              span: Span { fragment: fi, start: pos, end: pos + len },
            });
            pos += len;
          } else if is_ident_start(c) {
            let mut len = c.len_utf8();
            for c in rest[len..].chars() {
              if !is_ident_continue(c) {
                break;
              }
              len += c.len_utf8();
            }
            let text = &rest[..len];
            let token = if self.keywords.contains(text) {
              Token::Literal(text.to_owned())
            } else {
              Token::Ident(text.to_owned())
            };
            sinks.last_mut().unwrap().push(SpannedToken {
              token,
              span: Span { fragment: fi, start: pos, end: pos + len },
            });
            pos += len;
          } else {
            let op =
              self.operators.iter().find(|op| rest.starts_with(op.as_str()));
            match op {
              Some(op) => {
                sinks.last_mut().unwrap().push(SpannedToken {
                  token: Token::Operator(op.clone()),
                  span: Span { fragment: fi, start: pos, end: pos + op.len() },
                });
                pos += op.len();
              }
              None => {
                return Err(LexError {
                  kind: LexErrorKind::NoTokenMatch,
                  span: Span {
                    fragment: fi,
                    start: pos,
                    end: pos + c.len_utf8(),
                  },
                });
              }
            }
          }
        }
      }
    }

    Ok(())
  }
}

/// Hex, octal, binary, or decimal with optional fraction and exponent.
/// Returns the value and the number of bytes consumed.
fn scan_number(rest: &str) -> Option<(f64, usize)> {
  let bytes = rest.as_bytes();

  if bytes.len() >= 2 && bytes[0] == b'0' {
    let radix = match bytes[1] {
      b'x' | b'X' => Some(16),
      b'o' | b'O' => Some(8),
      b'b' | b'B' => Some(2),
      _ => None,
    };
    if let Some(radix) = radix {
      let digits: usize =
        rest[2..].chars().take_while(|c| c.is_digit(radix)).count();
      if digits == 0 {
        return None;
      }
      let value = i64::from_str_radix(&rest[2..2 + digits], radix).ok()?;
      return Some((value as f64, 2 + digits));
    }
  }

  let mut len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
  let after_int = &rest[len..];
  if after_int.starts_with('.')
    && after_int[1..].chars().next().map_or(false, |c| c.is_ascii_digit())
  {
    len += 1;
    len += rest[len..].chars().take_while(|c| c.is_ascii_digit()).count();
  }
  let after_frac = &rest[len..];
  if after_frac.starts_with('e') || after_frac.starts_with('E') {
    let mut elen = 1;
    let exp = &after_frac[1..];
    let exp = if exp.starts_with('+') || exp.starts_with('-') {
      elen += 1;
      &exp[1..]
    } else {
      exp
    };
    let digits = exp.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
      len += elen + digits;
    }
  }

  rest[..len].parse::<f64>().ok().map(|v| (v, len))
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn config(keywords: &[&str], operators: &[&str]) -> LexerConfig {
    LexerConfig {
      keywords: keywords.iter().map(|s| s.to_string()).collect(),
      operators: operators.iter().map(|s| s.to_string()).collect(),
      lines: false,
    }
  }

  fn kinds(tokens: &[SpannedToken]) -> Vec<Token> {
    tokens.iter().map(|t| t.token.clone()).collect()
  }

  #[test]
  fn identifiers_and_keywords() {
    let lexer = Lexer::new(&config(&["return"], &["="]));
    let tokens = lexer.tokenize(&["return foo_1 = $x"], &[]).unwrap();
    assert_eq!(
      kinds(&tokens),
      vec![
        Token::Literal("return".to_owned()),
        Token::Ident("foo_1".to_owned()),
        Token::Operator("=".to_owned()),
        Token::Ident("$x".to_owned()),
      ]
    );
  }

  #[test]
  fn longest_operator_wins() {
    let lexer = Lexer::new(&config(&[], &["*", "**", "+", "++"]));
    let tokens = lexer.tokenize(&["** * ++ +"], &[]).unwrap();
    assert_eq!(
      kinds(&tokens),
      vec![
        Token::Operator("**".to_owned()),
        Token::Operator("*".to_owned()),
        Token::Operator("++".to_owned()),
        Token::Operator("+".to_owned()),
      ]
    );
  }

  #[test]
  fn numbers() {
    let lexer = Lexer::new(&config(&[], &[]));
    let tokens = lexer
      .tokenize(&["0x1f 0o17 0b101 12 3.5 2e3 1.5e-2"], &[])
      .unwrap();
    let nums: Vec<f64> = tokens
      .iter()
      .map(|t| match &t.token {
        Token::Value(Value::Num(n)) => *n,
        other => panic!("not a number: {:?}", other),
      })
      .collect();
    assert_eq!(nums, vec![31.0, 15.0, 5.0, 12.0, 3.5, 2000.0, 0.015]);
  }

  #[test]
  fn strings_and_escapes() {
    let lexer = Lexer::new(&config(&[], &[]));
    let tokens = lexer.tokenize(&[r#" "a\tb" 'c\'d' "#], &[]).unwrap();
    assert_eq!(
      kinds(&tokens),
      vec![
        Token::Value(Value::Str("a\tb".to_owned())),
        Token::Value(Value::Str("c'd".to_owned())),
      ]
    );
  }

  #[test]
  fn string_errors() {
    let lexer = Lexer::new(&config(&[], &[]));
    let err = lexer.tokenize(&["\"abc\ndef\""], &[]).unwrap_err();
    assert_eq!(err.kind, LexErrorKind::StringNewline);

    let err = lexer.tokenize(&["\"abc"], &[]).unwrap_err();
    assert_eq!(err.kind, LexErrorKind::StringIncomplete);
  }

  #[test]
  fn interpolation_in_string_body() {
    let lexer = Lexer::new(&config(&[], &[]));
    let tokens = lexer
      .tokenize(&["\"n = ", "!\""], &[Value::Num(7.0)])
      .unwrap();
    assert_eq!(
      kinds(&tokens),
      vec![Token::Value(Value::Str("n = 7!".to_owned()))]
    );
  }

  #[test]
  fn interpolation_in_comment_is_dropped() {
    let lexer = Lexer::new(&config(&[], &[]));
    let tokens = lexer
      .tokenize(&["a // c ", "\n b /* ", " */ c"], &[Value::Null, Value::Null])
      .unwrap();
    assert_eq!(
      kinds(&tokens),
      vec![
        Token::Ident("a".to_owned()),
        Token::Ident("b".to_owned()),
        Token::Ident("c".to_owned()),
      ]
    );
  }

  #[test]
  fn interpolated_value_token() {
    let lexer = Lexer::new(&config(&[], &[]));
    let tokens = lexer.tokenize(&["a ", " b"], &[Value::Bool(true)]).unwrap();
    assert_eq!(
      kinds(&tokens),
      vec![
        Token::Ident("a".to_owned()),
        Token::Value(Value::Bool(true)),
        Token::Ident("b".to_owned()),
      ]
    );
  }

  #[test]
  fn structures_nest() {
    let lexer = Lexer::new(&config(&[], &[]));
    let tokens = lexer.tokenize(&["(a [b] c)"], &[]).unwrap();
    assert_eq!(tokens.len(), 1);
    match &tokens[0].token {
      Token::Structure { open: '(', close: ')', tokens } => {
        assert_eq!(tokens.len(), 3);
        assert!(matches!(
          tokens[1].token,
          Token::Structure { open: '[', close: ']', .. }
        ));
      }
      other => panic!("expected structure, got {:?}", other),
    }
  }

  #[test]
  fn unbalanced_brackets() {
    let lexer = Lexer::new(&config(&[], &[]));
    let err = lexer.tokenize(&["(a b"], &[]).unwrap_err();
    assert_eq!(err.kind, LexErrorKind::UnbalancedBracket);

    let err = lexer.tokenize(&["a) b"], &[]).unwrap_err();
    assert_eq!(err.kind, LexErrorKind::UnbalancedBracket);

    let err = lexer.tokenize(&["(a]"], &[]).unwrap_err();
    assert_eq!(err.kind, LexErrorKind::UnbalancedBracket);
  }

  #[test]
  fn no_token_match() {
    let lexer = Lexer::new(&config(&[], &["+"]));
    let err = lexer.tokenize(&["a ^ b"], &[]).unwrap_err();
    assert_eq!(err.kind, LexErrorKind::NoTokenMatch);
  }

  #[test]
  fn line_tokens_collapse() {
    let mut config = config(&[], &[]);
    config.lines = true;
    let lexer = Lexer::new(&config);
    let tokens = lexer.tokenize(&["a\n\n\nb\nc"], &[]).unwrap();
    assert_eq!(
      kinds(&tokens),
      vec![
        Token::Ident("a".to_owned()),
        Token::Line,
        Token::Ident("b".to_owned()),
        Token::Line,
        Token::Ident("c".to_owned()),
      ]
    );
  }
}

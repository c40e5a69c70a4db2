//! Lower a grammar AST into a flat rule table.
//!
//! After lowering, every rule is an alternation of sequences built only from
//! literals, raw-token terminals, rule references, and reduce steps; maybe,
//! repetition, separated lists, structures, and nested rulesets are all gone.

use std::fmt;
use std::rc::Rc;

use fnv::FnvHashMap;

use crate::ast::{Expr, TerminalKind};
use crate::lex::{is_identifier_text, LexerConfig};
use crate::value::{ReduceFn, Value};
use crate::{BiMap, GrammarError, GrammarErrorKind, Map, Set};

/// Identity of one lowered rule. Ids are arena-style: allocating them from a
/// single generator keeps identically-named rules from different scopes apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(u32);

impl RuleId {
  pub fn id(self) -> u32 {
    self.0
  }
}

#[derive(Debug, Default)]
pub struct RuleIdGen(u32);

impl RuleIdGen {
  pub fn gen(&mut self) -> RuleId {
    let i = self.0;
    self.0 += 1;
    RuleId(i)
  }

  pub fn from(start: u32) -> Self {
    Self(start + 1)
  }
}

/// The two raw-token classes that survive lowering; keyword and operator
/// terminals become synthetic rules over the collected literal sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenClass {
  Ident,
  Value,
}

impl fmt::Display for TokenClass {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      TokenClass::Ident => write!(f, "identifier"),
      TokenClass::Value => write!(f, "value"),
    }
  }
}

/// A reduction step: pop `arity` operands, push the function's result.
#[derive(Clone)]
pub struct Reduce {
  pub arity: usize,
  pub f: ReduceFn,
}

impl fmt::Debug for Reduce {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "Reduce({})", self.arity)
  }
}

#[derive(Clone, Debug)]
pub enum RuleNode {
  Literal(String),
  Terminal(TokenClass),
  Rule(RuleId),
  Reduce(Reduce),
}

pub type RuleAlts = Vec<Vec<RuleNode>>;

#[derive(Debug)]
pub struct RuleTable {
  pub rules: Map<RuleId, RuleAlts>,
  pub names: BiMap<RuleId, String>,
  pub start: RuleId,
  pub keywords: Set<String>,
  pub operators: Set<String>,
  pub id_gen: RuleIdGen,
}

impl RuleTable {
  pub fn name(&self, id: RuleId) -> &str {
    self.names.get_by_left(&id).map(|s| s.as_str()).unwrap_or("?")
  }

  /// Allocate a rule id and bind a diagnostic name to it; the caller inserts
  /// the alternatives.
  pub fn fresh_rule(&mut self, base: &str) -> RuleId {
    let id = self.id_gen.gen();
    let name = unique_name(&self.names, base);
    self.names.insert(id, name);
    id
  }

  /// Lexer parameters for tokenizing instances of this grammar.
  pub fn lexer_config(&self) -> LexerConfig {
    LexerConfig {
      keywords: self.keywords.clone(),
      operators: self.operators.clone(),
      lines: false,
    }
  }
}

fn unique_name(names: &BiMap<RuleId, String>, base: &str) -> String {
  let mut candidate = base.to_owned();
  let mut n = 2;
  while names.contains_right(&candidate) {
    candidate = format!("{}#{}", base, n);
    n += 1;
  }
  candidate
}

pub fn lower(ast: &Rc<Expr>) -> Result<RuleTable, GrammarError> {
  let mut cx = LowerCx {
    rules: Map::new(),
    names: BiMap::new(),
    id_gen: RuleIdGen::default(),
    scopes: vec![],
    keywords: Set::new(),
    operators: Set::new(),
    keyword_rule: None,
    operator_rule: None,
    memo: FnvHashMap::default(),
    sep_memo: FnvHashMap::default(),
  };

  let start = match &**ast {
    Expr::Ruleset(rules) => cx.ruleset(rules)?,
    _ => {
      let id = cx.fresh_rule("start");
      let alts = cx.alts_of(ast)?;
      cx.rules.insert(id, alts);
      id
    }
  };
  cx.finish_terminals();

  Ok(RuleTable {
    rules: cx.rules,
    names: cx.names,
    start,
    keywords: cx.keywords,
    operators: cx.operators,
    id_gen: cx.id_gen,
  })
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum MemoKind {
  Maybe,
  Repeat,
  Sep0,
  Alt,
}

struct LowerCx {
  rules: Map<RuleId, RuleAlts>,
  names: BiMap<RuleId, String>,
  id_gen: RuleIdGen,
  scopes: Vec<Map<String, RuleId>>,
  keywords: Set<String>,
  operators: Set<String>,
  keyword_rule: Option<RuleId>,
  operator_rule: Option<RuleId>,
  /// fresh-rule memo, keyed by subtree address so shared subtrees lower once
  memo: FnvHashMap<(usize, MemoKind), RuleId>,
  sep_memo: FnvHashMap<(usize, usize), RuleId>,
}

impl LowerCx {
  fn fresh_rule(&mut self, base: &str) -> RuleId {
    let id = self.id_gen.gen();
    let name = unique_name(&self.names, base);
    self.names.insert(id, name);
    id
  }

  /// Open a scope, bind every rule name before lowering any body (forward
  /// and mutual references resolve), lower the bodies, pop the scope.
  fn ruleset(
    &mut self,
    rules: &[(String, Rc<Expr>)],
  ) -> Result<RuleId, GrammarError> {
    if rules.is_empty() {
      return Err(GrammarError::new(
        GrammarErrorKind::SyntaxError,
        "empty ruleset",
      ));
    }

    let mut scope = Map::new();
    let mut bound = vec![];
    for (name, expr) in rules {
      let id = self.fresh_rule(name);
      scope.insert(name.clone(), id);
      bound.push((id, expr));
    }
    let entry = bound[0].0;

    self.scopes.push(scope);
    for (id, expr) in bound {
      let alts = self.alts_of(expr)?;
      self.rules.insert(id, alts);
    }
    self.scopes.pop();

    Ok(entry)
  }

  fn alts_of(&mut self, expr: &Rc<Expr>) -> Result<RuleAlts, GrammarError> {
    match &**expr {
      Expr::Alt(branches) => {
        branches.iter().map(|b| self.seq_of(b)).collect()
      }
      _ => Ok(vec![self.seq_of(expr)?]),
    }
  }

  /// Lower an expression into a fragment of a sequence. The fragment leaves
  /// exactly one value on the operand stack, except for `nil` which leaves
  /// none.
  fn seq_of(&mut self, expr: &Rc<Expr>) -> Result<Vec<RuleNode>, GrammarError> {
    match &**expr {
      Expr::Error(err) => Err(err.clone()),

      Expr::Nil => Ok(vec![]),

      Expr::Literal(text) => {
        self.classify(text);
        Ok(vec![RuleNode::Literal(text.clone())])
      }

      Expr::Terminal(TerminalKind::Ident) => {
        Ok(vec![RuleNode::Terminal(TokenClass::Ident)])
      }
      Expr::Terminal(TerminalKind::Value) => {
        Ok(vec![RuleNode::Terminal(TokenClass::Value)])
      }
      Expr::Terminal(TerminalKind::Keyword) => {
        let id = match self.keyword_rule {
          Some(id) => id,
          None => {
            let id = self.fresh_rule("keyword");
            self.keyword_rule = Some(id);
            id
          }
        };
        Ok(vec![RuleNode::Rule(id)])
      }
      Expr::Terminal(TerminalKind::Operator) => {
        let id = match self.operator_rule {
          Some(id) => id,
          None => {
            let id = self.fresh_rule("operator");
            self.operator_rule = Some(id);
            id
          }
        };
        Ok(vec![RuleNode::Rule(id)])
      }

      Expr::Ident(name) => {
        for scope in self.scopes.iter().rev() {
          if let Some(&id) = scope.get(name) {
            return Ok(vec![RuleNode::Rule(id)]);
          }
        }
        Err(GrammarError::new(
          GrammarErrorKind::UnknownIdent,
          format!("unknown identifier `{}`", name),
        ))
      }

      Expr::Structure { open, close, inner } => {
        self.operators.insert(open.to_string());
        self.operators.insert(close.to_string());

        let mut nodes = vec![RuleNode::Literal(open.to_string())];
        nodes.extend(self.seq_of(inner)?);
        nodes.push(RuleNode::Literal(close.to_string()));

        let arity = 2 + inner.produces() as usize;
        let f: ReduceFn = if arity == 3 {
          Rc::new(|mut args| args.swap_remove(1))
        } else {
          Rc::new(|_| Value::Null)
        };
        nodes.push(RuleNode::Reduce(Reduce { arity, f }));
        Ok(nodes)
      }

      Expr::Maybe(inner) => {
        let key = (Rc::as_ptr(inner) as usize, MemoKind::Maybe);
        let id = match self.memo.get(&key) {
          Some(&id) => id,
          None => {
            let id = self.fresh_rule(&format!("({})?", label(inner)));
            self.memo.insert(key, id);
            let alts = vec![
              self.seq_of(inner)?,
              vec![RuleNode::Reduce(Reduce {
                arity: 0,
                f: Rc::new(|_| Value::Null),
              })],
            ];
            self.rules.insert(id, alts);
            id
          }
        };
        Ok(vec![RuleNode::Rule(id)])
      }

      Expr::Repeat0(inner) => {
        let id = self.repeat_rule(inner)?;
        Ok(vec![RuleNode::Rule(id)])
      }

      Expr::Repeat1(inner) => {
        let rep = self.repeat_rule(inner)?;
        let mut nodes = self.seq_of(inner)?;
        nodes.push(RuleNode::Rule(rep));
        nodes.push(RuleNode::Reduce(Reduce { arity: 2, f: cons() }));
        Ok(nodes)
      }

      Expr::SepBy1 { item, sep } => {
        let id = self.sep1_rule(item, sep)?;
        Ok(vec![RuleNode::Rule(id)])
      }

      Expr::SepBy0 { item, sep } => {
        let key = (Rc::as_ptr(expr) as usize, MemoKind::Sep0);
        let id = match self.memo.get(&key) {
          Some(&id) => id,
          None => {
            let one = self.sep1_rule(item, sep)?;
            let id = self
              .fresh_rule(&format!("({} ** {})", label(item), label(sep)));
            self.memo.insert(key, id);
            self.rules.insert(
              id,
              vec![
                vec![RuleNode::Rule(one)],
                vec![RuleNode::Reduce(Reduce {
                  arity: 0,
                  f: empty_list(),
                })],
              ],
            );
            id
          }
        };
        Ok(vec![RuleNode::Rule(id)])
      }

      Expr::Seq { exprs, action } => {
        let mut nodes = vec![];
        for e in exprs {
          nodes.extend(self.seq_of(e)?);
        }
        let arity = exprs.iter().filter(|e| e.produces()).count();

        let f = match action {
          Some(r) => {
            if let Some(declared) = r.arity {
              if declared != arity {
                return Err(GrammarError::new(
                  GrammarErrorKind::MalformedReducer,
                  format!(
                    "reducer declares {} operands but the sequence produces {}",
                    declared, arity
                  ),
                ));
              }
            }
            r.f.clone()
          }
          None => {
            if exprs.len() == 1 {
              return Ok(nodes);
            }
            default_reducer(exprs)
          }
        };
        nodes.push(RuleNode::Reduce(Reduce { arity, f }));
        Ok(nodes)
      }

      Expr::Alt(_) => {
        let key = (Rc::as_ptr(expr) as usize, MemoKind::Alt);
        let id = match self.memo.get(&key) {
          Some(&id) => id,
          None => {
            let id = self.fresh_rule(&format!("({})", label(expr)));
            self.memo.insert(key, id);
            let alts = self.alts_of(expr)?;
            self.rules.insert(id, alts);
            id
          }
        };
        Ok(vec![RuleNode::Rule(id)])
      }

      Expr::Ruleset(rules) => {
        let id = self.ruleset(rules)?;
        Ok(vec![RuleNode::Rule(id)])
      }
    }
  }

  /// `E*` as a fresh right-recursive rule: `R = E R : cons | : empty`.
  /// Elements are consed on the unwind, so they come out left to right.
  fn repeat_rule(&mut self, inner: &Rc<Expr>) -> Result<RuleId, GrammarError> {
    let key = (Rc::as_ptr(inner) as usize, MemoKind::Repeat);
    if let Some(&id) = self.memo.get(&key) {
      return Ok(id);
    }
    let id = self.fresh_rule(&format!("({})*", label(inner)));
    self.memo.insert(key, id);

    let mut first = self.seq_of(inner)?;
    first.push(RuleNode::Rule(id));
    first.push(RuleNode::Reduce(Reduce { arity: 2, f: cons() }));

    let alts = vec![
      first,
      vec![RuleNode::Reduce(Reduce { arity: 0, f: empty_list() })],
    ];
    self.rules.insert(id, alts);
    Ok(id)
  }

  /// `E ++ Sep` via three mutually referencing rules:
  /// `head = E rest : cons`, `rest = pair rest : cons | : empty`,
  /// `pair = Sep E : keep E`.
  fn sep1_rule(
    &mut self,
    item: &Rc<Expr>,
    sep: &Rc<Expr>,
  ) -> Result<RuleId, GrammarError> {
    let key = (Rc::as_ptr(item) as usize, Rc::as_ptr(sep) as usize);
    if let Some(&id) = self.sep_memo.get(&key) {
      return Ok(id);
    }

    let head = self.fresh_rule(&format!("({} ++ {})", label(item), label(sep)));
    self.sep_memo.insert(key, head);
    let rest = self.fresh_rule(&format!("({} {})*", label(sep), label(item)));
    let pair = self.fresh_rule(&format!("({} {})", label(sep), label(item)));

    let mut head_nodes = self.seq_of(item)?;
    head_nodes.push(RuleNode::Rule(rest));
    head_nodes.push(RuleNode::Reduce(Reduce { arity: 2, f: cons() }));
    self.rules.insert(head, vec![head_nodes]);

    let mut pair_nodes = self.seq_of(sep)?;
    pair_nodes.extend(self.seq_of(item)?);
    let arity = sep.produces() as usize + item.produces() as usize;
    pair_nodes.push(RuleNode::Reduce(Reduce {
      arity,
      f: Rc::new(|mut args| args.pop().unwrap_or(Value::Null)),
    }));
    self.rules.insert(pair, vec![pair_nodes]);

    self.rules.insert(
      rest,
      vec![
        vec![
          RuleNode::Rule(pair),
          RuleNode::Rule(rest),
          RuleNode::Reduce(Reduce { arity: 2, f: cons() }),
        ],
        vec![RuleNode::Reduce(Reduce { arity: 0, f: empty_list() })],
      ],
    );

    Ok(head)
  }

  fn classify(&mut self, text: &str) {
    if is_identifier_text(text) {
      self.keywords.insert(text.to_owned());
    } else {
      self.operators.insert(text.to_owned());
    }
  }

  /// Backfill the keyword/operator placeholder rules now that every literal
  /// in the grammar has been classified.
  fn finish_terminals(&mut self) {
    if let Some(id) = self.keyword_rule {
      let alts = self
        .keywords
        .iter()
        .map(|k| vec![RuleNode::Literal(k.clone())])
        .collect();
      self.rules.insert(id, alts);
    }
    if let Some(id) = self.operator_rule {
      let alts = self
        .operators
        .iter()
        .map(|op| vec![RuleNode::Literal(op.clone())])
        .collect();
      self.rules.insert(id, alts);
    }
  }
}

/// Prepend the head element onto the already-collected tail list.
fn cons() -> ReduceFn {
  Rc::new(|mut args| {
    let tail = args.pop().unwrap_or(Value::Null);
    let head = args.pop().unwrap_or(Value::Null);
    match tail {
      Value::List(mut items) => {
        items.insert(0, head);
        Value::List(items)
      }
      other => Value::List(vec![head, other]),
    }
  })
}

fn empty_list() -> ReduceFn {
  Rc::new(|_| Value::List(vec![]))
}

/// Reducer for a sequence written without one: keep the values that are not
/// fixed literal text; one survivor passes through, several become a list.
fn default_reducer(exprs: &[Rc<Expr>]) -> ReduceFn {
  let keep: Vec<bool> = exprs
    .iter()
    .filter(|e| e.produces())
    .map(|e| !matches!(&**e, Expr::Literal(_)))
    .collect();
  Rc::new(move |args| {
    let mut kept: Vec<Value> = args
      .into_iter()
      .zip(keep.iter())
      .filter(|(_, k)| **k)
      .map(|(v, _)| v)
      .collect();
    match kept.len() {
      0 => Value::Null,
      1 => kept.pop().unwrap(),
      _ => Value::List(kept),
    }
  })
}

/// Short description of an expression, for generated rule names.
fn label(expr: &Expr) -> String {
  match expr {
    Expr::Error(_) => "error".to_owned(),
    Expr::Nil => "nil".to_owned(),
    Expr::Literal(text) => format!("{:?}", text),
    Expr::Terminal(TerminalKind::Ident) => "identifier".to_owned(),
    Expr::Terminal(TerminalKind::Value) => "value".to_owned(),
    Expr::Terminal(TerminalKind::Keyword) => "keyword".to_owned(),
    Expr::Terminal(TerminalKind::Operator) => "operator".to_owned(),
    Expr::Ident(name) => name.clone(),
    Expr::Structure { open, close, .. } => format!("#{}..{}", open, close),
    Expr::Maybe(e) => format!("{}?", label(e)),
    Expr::Repeat0(e) => format!("{}*", label(e)),
    Expr::Repeat1(e) => format!("{}+", label(e)),
    Expr::SepBy0 { item, sep } => {
      format!("{} ** {}", label(item), label(sep))
    }
    Expr::SepBy1 { item, sep } => {
      format!("{} ++ {}", label(item), label(sep))
    }
    Expr::Seq { exprs, .. } => {
      let mut s = exprs
        .iter()
        .take(3)
        .map(|e| label(e))
        .collect::<Vec<_>>()
        .join(" ");
      if exprs.len() > 3 {
        s.push_str(" ..");
      }
      s
    }
    Expr::Alt(branches) => {
      let mut s = branches
        .iter()
        .take(3)
        .map(|b| label(b))
        .collect::<Vec<_>>()
        .join(" | ");
      if branches.len() > 3 {
        s.push_str(" | ..");
      }
      s
    }
    Expr::Ruleset(rules) => rules
      .first()
      .map(|(name, _)| name.clone())
      .unwrap_or_else(|| "rules".to_owned()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar_parser;
  use pretty_assertions::assert_eq;

  fn lower_str(src: &str) -> RuleTable {
    lower(&grammar_parser::parse(&[src], &[]).unwrap()).unwrap()
  }

  fn sorted(set: &Set<String>) -> Vec<String> {
    let mut v: Vec<String> = set.iter().cloned().collect();
    v.sort();
    v
  }

  #[test]
  fn literal_classification() {
    let table = lower_str("Main = \"return\" \"->\" \"if\" \"+\";");
    assert_eq!(sorted(&table.keywords), vec!["if", "return"]);
    assert_eq!(sorted(&table.operators), vec!["+", "->"]);
  }

  #[test]
  fn structure_brackets_become_operators() {
    let table = lower_str("Main = #[ value ];");
    assert_eq!(sorted(&table.operators), vec!["[", "]"]);
  }

  #[test]
  fn repeat_becomes_recursive_rule() {
    let table = lower_str("Main = value*;");
    // the synthetic repetition rule is self-recursive with an empty branch
    let rep = table
      .rules
      .iter()
      .find(|(id, _)| table.name(**id) == "(value)*")
      .map(|(id, _)| *id)
      .unwrap();
    let alts = &table.rules[&rep];
    assert_eq!(alts.len(), 2);
    assert!(matches!(alts[0][0], RuleNode::Terminal(TokenClass::Value)));
    assert!(matches!(alts[0][1], RuleNode::Rule(id) if id == rep));
    assert!(matches!(alts[0][2], RuleNode::Reduce(Reduce { arity: 2, .. })));
    assert!(
      matches!(alts[1][0], RuleNode::Reduce(Reduce { arity: 0, .. }))
    );
  }

  #[test]
  fn shared_subtree_lowers_once() {
    // both uses of the starred ident go through one synthetic rule
    let ast = grammar_parser::parse(&["A = B B; B = value*;"], &[]).unwrap();
    let table = lower(&ast).unwrap();
    let rep_rules = table
      .rules
      .keys()
      .filter(|id| table.name(**id).ends_with(")*"))
      .count();
    assert_eq!(rep_rules, 1);
  }

  #[test]
  fn unknown_identifier() {
    let ast = grammar_parser::parse(&["Main = Missing;"], &[]).unwrap();
    let err = lower(&ast).unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::UnknownIdent);
    assert_eq!(err.message, "unknown identifier `Missing`");
  }

  #[test]
  fn forward_and_mutual_references_resolve() {
    let table = lower_str("A = B; B = \"x\" A | \"y\";");
    assert_eq!(table.rules.len(), 2);
  }

  #[test]
  fn keyword_terminal_backpatched() {
    let table = lower_str("Main = \"if\" \"else\" keyword;");
    let kw = table
      .rules
      .iter()
      .find(|(id, _)| table.name(**id) == "keyword")
      .map(|(id, _)| *id)
      .unwrap();
    let alts = &table.rules[&kw];
    assert_eq!(alts.len(), 2);
    for alt in alts {
      assert!(matches!(&alt[0], RuleNode::Literal(t) if t == "if" || t == "else"));
    }
  }

  #[test]
  fn declared_reducer_arity_checked() {
    let ast = grammar_parser::parse(
      &["Main = value value : ", ";"],
      &[Value::reducer_n(3, |args| Value::List(args))],
    )
    .unwrap();
    let err = lower(&ast).unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::MalformedReducer);
  }

  #[test]
  fn error_node_surfaces_at_lowering() {
    let ast = grammar_parser::parse(&["Main = \"(\";"], &[]).unwrap();
    let err = lower(&ast).unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::InvalidLiteral);
  }

  #[test]
  fn scoped_names_never_collide() {
    // an included grammar may reuse rule names; ids keep them apart
    let inner = grammar_parser::parse(&["A = value;"], &[]).unwrap();
    let ast = grammar_parser::parse(
      &["A = include ", " | identifier;"],
      &[Value::Grammar(inner)],
    )
    .unwrap();
    let table = lower(&ast).unwrap();
    // outer A, inner A
    assert_eq!(
      table.names.len(),
      table.rules.len(),
      "every rule has a distinct name entry"
    );
    assert!(table.names.contains_right(&"A".to_owned()));
    assert!(table.names.contains_right(&"A#2".to_owned()));
  }
}

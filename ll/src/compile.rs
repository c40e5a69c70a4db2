//! Build a dispatching parser from a resolved rule table, rejecting
//! grammars that need more than one token of lookahead.

use grammar::{BiMap, LexerConfig, Map, RuleId, RuleNode, RuleTable};

use crate::first::{FirstSets, Lookahead};
use crate::Error;

/// A compiled grammar: per-rule branch tables plus the lexer parameters
/// collected from the grammar's literals.
#[derive(Debug)]
pub struct Parser {
  pub(crate) rules: Map<RuleId, Dispatch>,
  pub(crate) start: RuleId,
  pub(crate) names: BiMap<RuleId, String>,
  pub(crate) config: LexerConfig,
}

impl Parser {
  pub(crate) fn name(&self, id: RuleId) -> &str {
    self.names.get_by_left(&id).map(|s| s.as_str()).unwrap_or("?")
  }
}

/// Branch selection for one rule: which alternative each lookahead picks,
/// and the alternative that matches the empty input, if any.
#[derive(Debug)]
pub(crate) struct Dispatch {
  pub table: Map<Lookahead, usize>,
  pub fallback: Option<usize>,
  pub branches: Vec<Vec<RuleNode>>,
}

pub fn compile(table: RuleTable, firsts: &FirstSets) -> Result<Parser, Error> {
  let config = table.lexer_config();
  let mut rules = Map::new();

  for (&id, alts) in &table.rules {
    let mut dispatch = Dispatch {
      table: Map::new(),
      fallback: None,
      branches: vec![],
    };

    for (i, alt) in alts.iter().enumerate() {
      let fs = firsts.seq(alt);
      for la in fs.tokens {
        if dispatch.table.insert(la.clone(), i).is_some() {
          return Err(Error::FirstFirstConflict {
            rule: table.name(id).to_owned(),
            lookahead: la.to_string(),
          });
        }
      }
      if fs.nullable {
        if dispatch.fallback.is_some() {
          return Err(Error::FirstFirstConflict {
            rule: table.name(id).to_owned(),
            lookahead: Lookahead::End.to_string(),
          });
        }
        dispatch.fallback = Some(i);
      }
    }

    check_follow(&table, firsts, alts)?;

    dispatch.branches = alts.clone();
    rules.insert(id, dispatch);
  }

  Ok(Parser {
    rules,
    start: table.start,
    names: table.names,
    config,
  })
}

/// A nullable rule invocation is resolved greedily at run time, so a token
/// that can both start the rule and follow it within the same sequence is
/// ambiguous and rejected here.
fn check_follow(
  table: &RuleTable,
  firsts: &FirstSets,
  alts: &[Vec<RuleNode>],
) -> Result<(), Error> {
  for alt in alts {
    for (i, node) in alt.iter().enumerate() {
      if let RuleNode::Rule(r) = node {
        let sub = firsts.rule(*r);
        if !sub.nullable {
          continue;
        }
        let rest = firsts.seq(&alt[i + 1..]);
        if let Some(la) = sub.tokens.iter().find(|la| rest.tokens.contains(*la))
        {
          return Err(Error::FirstFollowConflict {
            rule: table.name(*r).to_owned(),
            lookahead: la.to_string(),
          });
        }
      }
    }
  }
  Ok(())
}

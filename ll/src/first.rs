//! Compute FIRST and NULLABLE information for a lowered rule table.

use std::fmt;

use bittyset::BitSet;

use grammar::{Map, RuleId, RuleNode, RuleTable, Set, TokenClass};

use crate::Error;

/// One token of lookahead: a concrete keyword or operator spelling, a raw
/// token class, or the end of input.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lookahead {
  Lit(String),
  Term(TokenClass),
  End,
}

impl fmt::Display for Lookahead {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Lookahead::Lit(text) => write!(f, "`{}`", text),
      Lookahead::Term(class) => write!(f, "{}", class),
      Lookahead::End => write!(f, "end of input"),
    }
  }
}

#[derive(Clone, Debug, Default)]
pub struct FirstSet {
  pub tokens: Set<Lookahead>,
  pub nullable: bool,
}

#[derive(Debug)]
pub struct FirstSets {
  table: Map<RuleId, FirstSet>,
}

impl FirstSets {
  /// Compute FIRST for every rule. A cycle through leftmost positions is
  /// left recursion the resolver could not remove, and is reported as such.
  pub fn build(table: &RuleTable) -> Result<FirstSets, Error> {
    let mut done = Map::new();
    let mut visiting = BitSet::new();
    for &id in table.rules.keys() {
      rule_first(table, &mut done, &mut visiting, id)?;
    }
    Ok(FirstSets { table: done })
  }

  pub fn rule(&self, id: RuleId) -> &FirstSet {
    &self.table[&id]
  }

  /// FIRST of a node sequence, from the precomputed rule sets.
  pub fn seq(&self, nodes: &[RuleNode]) -> FirstSet {
    let mut out = FirstSet::default();
    for node in nodes {
      match node {
        RuleNode::Literal(text) => {
          out.tokens.insert(Lookahead::Lit(text.clone()));
          return out;
        }
        RuleNode::Terminal(class) => {
          out.tokens.insert(Lookahead::Term(*class));
          return out;
        }
        RuleNode::Rule(r) => {
          let sub = &self.table[r];
          out.tokens.extend(sub.tokens.iter().cloned());
          if !sub.nullable {
            return out;
          }
        }
        RuleNode::Reduce(_) => {}
      }
    }
    out.nullable = true;
    out
  }
}

fn rule_first(
  table: &RuleTable,
  done: &mut Map<RuleId, FirstSet>,
  visiting: &mut BitSet,
  id: RuleId,
) -> Result<(), Error> {
  if done.contains_key(&id) {
    return Ok(());
  }
  if visiting.contains(id.id() as usize) {
    return Err(Error::LeftRecursion {
      rule: table.name(id).to_owned(),
    });
  }
  visiting.insert(id.id() as usize);

  let mut fs = FirstSet::default();
  for alt in &table.rules[&id] {
    let mut alt_nullable = true;
    for node in alt {
      match node {
        RuleNode::Literal(text) => {
          fs.tokens.insert(Lookahead::Lit(text.clone()));
          alt_nullable = false;
          break;
        }
        RuleNode::Terminal(class) => {
          fs.tokens.insert(Lookahead::Term(*class));
          alt_nullable = false;
          break;
        }
        RuleNode::Rule(r) => {
          rule_first(table, done, visiting, *r)?;
          let sub = &done[r];
          fs.tokens.extend(sub.tokens.iter().cloned());
          if !sub.nullable {
            alt_nullable = false;
            break;
          }
        }
        RuleNode::Reduce(_) => {}
      }
    }
    if alt_nullable {
      fs.nullable = true;
    }
  }

  visiting.remove(id.id() as usize);
  done.insert(id, fs);
  Ok(())
}

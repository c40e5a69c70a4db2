//! Rule table rewrites that make a grammar LL(1)-friendly: direct left
//! recursion elimination and iterated left factoring.

use grammar::{Map, RuleId, RuleNode, RuleTable, TokenClass};

/// Rewrite every directly left-recursive rule
/// `A = A x | y` into `A = y A'` and `A' = x A' | `.
///
/// Reductions travel with the branch they came from, and the operand stack
/// is shared across rules at run time, so a reduction in `A'` still sees the
/// value produced by `y` beneath the values of `x`. That keeps
/// left-associative grammars left-associative after the rewrite.
pub fn fix_left_recursion(table: &mut RuleTable) {
  let ids: Vec<RuleId> = table.rules.keys().copied().collect();
  for id in ids {
    let alts = &table.rules[&id];
    let recursive = alts
      .iter()
      .any(|alt| matches!(alt.first(), Some(RuleNode::Rule(r)) if *r == id));
    if !recursive {
      continue;
    }
    // a rule with no non-recursive branch cannot terminate; leave it for the
    // FIRST pass to report as left recursion
    let grounded = alts
      .iter()
      .any(|alt| !matches!(alt.first(), Some(RuleNode::Rule(r)) if *r == id));
    if !grounded {
      continue;
    }

    let alts = match table.rules.remove(&id) {
      Some(alts) => alts,
      None => continue,
    };
    let base = table.name(id).to_owned();
    let tail = table.fresh_rule(&format!("{}'", base));

    let mut head_alts = vec![];
    let mut tail_alts = vec![];
    for mut alt in alts {
      if matches!(alt.first(), Some(RuleNode::Rule(r)) if *r == id) {
        alt.remove(0);
        alt.push(RuleNode::Rule(tail));
        tail_alts.push(alt);
      } else {
        alt.push(RuleNode::Rule(tail));
        head_alts.push(alt);
      }
    }
    tail_alts.push(vec![]);

    table.rules.insert(id, head_alts);
    table.rules.insert(tail, tail_alts);
  }
}

/// First node of an alternative, as a factoring key.
#[derive(Clone, PartialEq, Eq, Hash)]
enum Head {
  Lit(String),
  Term(TokenClass),
  Rule(RuleId),
}

impl Head {
  fn of(alt: &[RuleNode]) -> Option<Head> {
    match alt.first()? {
      RuleNode::Literal(t) => Some(Head::Lit(t.clone())),
      RuleNode::Terminal(c) => Some(Head::Term(*c)),
      RuleNode::Rule(r) => Some(Head::Rule(*r)),
      RuleNode::Reduce(_) => None,
    }
  }
}

/// Pull common single-node prefixes out of alternatives until none remain:
/// `A = x y | x z` becomes `A = x A'` with `A' = y | z`. Iterating to a
/// fixpoint factors prefixes of any length, one node per round.
pub fn factor_left(table: &mut RuleTable) {
  loop {
    let mut changed = false;
    let ids: Vec<RuleId> = table.rules.keys().copied().collect();
    for id in ids {
      let shared = {
        let alts = &table.rules[&id];
        let mut groups: Map<Head, Vec<usize>> = Map::new();
        for (i, alt) in alts.iter().enumerate() {
          if let Some(head) = Head::of(alt) {
            groups.entry(head).or_insert_with(Vec::new).push(i);
          }
        }
        groups.into_iter().map(|(_, v)| v).find(|v| v.len() > 1)
      };
      let idxs = match shared {
        Some(idxs) => idxs,
        None => continue,
      };
      changed = true;

      let mut alts = match table.rules.remove(&id) {
        Some(alts) => alts,
        None => continue,
      };
      let tails: Vec<Vec<RuleNode>> =
        idxs.iter().map(|&i| alts[i][1..].to_vec()).collect();
      let head_node = alts[idxs[0]][0].clone();

      let base = table.name(id).to_owned();
      let cont = table.fresh_rule(&format!("{}'", base));
      table.rules.insert(cont, tails);

      alts[idxs[0]] = vec![head_node, RuleNode::Rule(cont)];
      for &i in idxs[1..].iter().rev() {
        alts.remove(i);
      }
      table.rules.insert(id, alts);
    }
    if !changed {
      break;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use grammar::{grammar_parser, lower};
  use pretty_assertions::assert_eq;

  fn table_of(src: &str) -> RuleTable {
    lower(&grammar_parser::parse(&[src], &[]).unwrap()).unwrap()
  }

  fn find(table: &RuleTable, name: &str) -> RuleId {
    *table
      .rules
      .keys()
      .find(|id| table.name(**id) == name)
      .unwrap()
  }

  #[test]
  fn direct_left_recursion_rewritten() {
    let mut table = table_of("Sum = Sum \"+\" value | value;");
    fix_left_recursion(&mut table);

    let sum = find(&table, "Sum");
    let tail = find(&table, "Sum'");

    let sum_alts = &table.rules[&sum];
    assert_eq!(sum_alts.len(), 1);
    assert!(matches!(sum_alts[0][0], RuleNode::Terminal(TokenClass::Value)));
    assert!(matches!(sum_alts[0].last(), Some(RuleNode::Rule(r)) if *r == tail));

    let tail_alts = &table.rules[&tail];
    assert_eq!(tail_alts.len(), 2);
    assert!(matches!(&tail_alts[0][0], RuleNode::Literal(t) if t == "+"));
    assert!(matches!(tail_alts[0].last(), Some(RuleNode::Rule(r)) if *r == tail));
    assert!(tail_alts[1].is_empty());
  }

  #[test]
  fn ungrounded_recursion_left_alone() {
    let mut table = table_of("Loop = Loop \"x\";");
    fix_left_recursion(&mut table);
    let id = find(&table, "Loop");
    assert!(
      matches!(table.rules[&id][0][0], RuleNode::Rule(r) if r == id),
      "rule with no base case is not rewritten"
    );
  }

  #[test]
  fn common_prefix_factored_out() {
    let mut table =
      table_of("Main = \"let\" identifier | \"let\" \"mut\" identifier;");
    factor_left(&mut table);

    let main = find(&table, "Main");
    let alts = &table.rules[&main];
    assert_eq!(alts.len(), 1, "shared head collapses into one branch");
    assert!(matches!(&alts[0][0], RuleNode::Literal(t) if t == "let"));

    let cont = match alts[0][1] {
      RuleNode::Rule(r) => r,
      ref other => panic!("expected continuation rule, got {:?}", other),
    };
    assert_eq!(table.rules[&cont].len(), 2);
  }

  #[test]
  fn factoring_reaches_fixpoint_on_long_prefixes() {
    let mut table = table_of(
      "Main = \"a\" \"b\" \"c\" | \"a\" \"b\" \"d\" | \"a\" \"e\";",
    );
    factor_left(&mut table);

    // no rule keeps two alternatives with the same first node
    for alts in table.rules.values() {
      let heads: Vec<Head> =
        alts.iter().filter_map(|alt| Head::of(alt)).collect();
      for (i, head) in heads.iter().enumerate() {
        assert!(!heads[..i].contains(head));
      }
    }
  }
}
